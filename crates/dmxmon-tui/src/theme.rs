//! Palette and semantic styling for the monitor.

use ratatui::style::{Color, Modifier, Style};

pub const NEON_CYAN: Color = Color::Rgb(128, 255, 234); // #80ffea
pub const ELECTRIC_PURPLE: Color = Color::Rgb(225, 53, 255); // #e135ff
pub const DIM_WHITE: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const BORDER_GRAY: Color = Color::Rgb(98, 114, 164); // #6272a4
pub const CORAL: Color = Color::Rgb(255, 106, 193); // #ff6ac1
pub const SUCCESS_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const ELECTRIC_YELLOW: Color = Color::Rgb(241, 250, 140); // #f1fa8c
pub const ERROR_RED: Color = Color::Rgb(255, 99, 99); // #ff6363

/// Title text for the main block.
pub fn title_style() -> Style {
    Style::default().fg(NEON_CYAN).add_modifier(Modifier::BOLD)
}

pub fn border_style(live: bool) -> Style {
    if live {
        Style::default().fg(ELECTRIC_PURPLE)
    } else {
        Style::default().fg(BORDER_GRAY)
    }
}

pub fn body_style() -> Style {
    Style::default().fg(DIM_WHITE)
}

/// Key hint in the footer.
pub fn key_hint() -> Style {
    Style::default().fg(CORAL).add_modifier(Modifier::BOLD)
}
