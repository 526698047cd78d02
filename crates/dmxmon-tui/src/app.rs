//! Application core: terminal event loop hosting the monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use dmxmon_core::sim::VirtualRig;
use dmxmon_core::{
    ConnectionManager, Discovery, Event, Executor, Monitor, MonitorSettings, Observer, Phase,
    UiRequest, UserInput, screen_text,
};

use crate::event::{EventReader, TermEvent};
use crate::theme;
use crate::tui::Tui;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Forward to the monitor.
    Monitor(UserInput),
    /// Plug or unplug the virtual device.
    TogglePlug,
}

/// Map a key event to an action. Unbound keys yield `None`.
pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (KeyModifiers::NONE, KeyCode::Char('q')) => {
            Some(KeyAction::Monitor(UserInput::Quit))
        }
        (KeyModifiers::NONE, KeyCode::Char(' ' | 'p')) => {
            Some(KeyAction::Monitor(UserInput::TogglePause))
        }
        (KeyModifiers::NONE, KeyCode::Char('u')) => Some(KeyAction::TogglePlug),
        _ => None,
    }
}

/// Block title naming where the monitored device comes from.
pub fn title(device_path: &str) -> String {
    format!(" dmxmon · virtual DMX USB Pro {device_path} ")
}

/// Top-level application state and event loop.
pub struct App {
    settings: MonitorSettings,
    rig: Arc<VirtualRig>,
    monitor: Monitor,
    running: bool,
}

impl App {
    pub fn new(settings: MonitorSettings, rig: Arc<VirtualRig>) -> Self {
        Self {
            monitor: Monitor::new(settings.clone()),
            settings,
            rig,
            running: true,
        }
    }

    /// Run until the monitor terminates or the terminal event stream ends.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;

        let (event_tx, mut monitor_events) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(self.rig.clone(), self.settings.clone());
        let executor = Executor::new(manager, self.rig.clone(), event_tx.clone());

        let observer_tx = event_tx.clone();
        let observer = Observer::spawn(
            Discovery::new(self.rig.clone()),
            self.settings.discovery_period,
            move |catalog| {
                let _ = observer_tx.send(Event::Discovery(catalog));
            },
        );
        drop(event_tx);

        // ~30 FPS render
        let mut terminal_events = EventReader::new(Duration::from_millis(33));

        info!("TUI event loop started");

        while self.running {
            tokio::select! {
                Some(event) = terminal_events.next() => match event {
                    TermEvent::Key(key) => {
                        if let Some(event) = self.handle_key_event(key) {
                            self.dispatch(&executor, &mut tui, event).await?;
                        }
                    }
                    TermEvent::Resize => tui.clear()?,
                    TermEvent::Render => tui.draw(|frame| self.render(frame))?,
                },
                Some(event) = monitor_events.recv() => {
                    self.dispatch(&executor, &mut tui, event).await?;
                }
                else => break,
            }
        }

        terminal_events.stop();
        observer.shutdown().await;
        if !self.monitor.is_terminated() {
            // Event stream ended without a quit; still release the device.
            self.dispatch(&executor, &mut tui, Event::Quit).await?;
        }
        info!("TUI event loop ended");
        Ok(())
    }

    fn handle_key_event(&self, key: KeyEvent) -> Option<Event> {
        match key_action(key)? {
            KeyAction::Monitor(input) => Some(Event::Input(input)),
            KeyAction::TogglePlug => {
                self.rig.toggle_plug();
                debug!(plugged = self.rig.is_plugged(), "virtual plug toggled");
                None
            }
        }
    }

    async fn dispatch(&mut self, executor: &Executor, tui: &mut Tui, event: Event) -> Result<()> {
        for request in executor.dispatch(&mut self.monitor, event).await {
            match request {
                UiRequest::ClearScreen => tui.clear()?,
                UiRequest::Quit => self.running = false,
            }
        }
        Ok(())
    }

    fn render(&self, frame: &mut Frame) {
        let [content_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

        let live = self.monitor.phase() == Phase::Monitoring;
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(theme::border_style(live))
            .title(Span::styled(title(&self.rig.descriptor().path), theme::title_style()));

        let text = screen_text(&self.monitor, &Local::now());
        frame.render_widget(
            Paragraph::new(text).style(theme::body_style()).block(block),
            content_area,
        );

        self.render_status_bar(frame, status_area);
    }

    /// Bottom line: monitor phase and key hints.
    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let indicator = match self.monitor.phase() {
            Phase::Monitoring => Span::styled("● monitoring", Style::default().fg(theme::SUCCESS_GREEN)),
            Phase::Paused => Span::styled("◐ paused", Style::default().fg(theme::ELECTRIC_YELLOW)),
            Phase::Connecting => {
                Span::styled("◐ connecting", Style::default().fg(theme::ELECTRIC_YELLOW))
            }
            Phase::Connected => {
                Span::styled("◐ connected", Style::default().fg(theme::ELECTRIC_YELLOW))
            }
            Phase::DevicesFound => {
                Span::styled("○ device found", Style::default().fg(theme::ELECTRIC_YELLOW))
            }
            Phase::Idle | Phase::Terminated => {
                Span::styled("○ no device", Style::default().fg(theme::ERROR_RED))
            }
        };

        let hints = Span::styled(
            " │ space pause  u plug/unplug  q quit",
            theme::key_hint(),
        );

        let line = Line::from(vec![Span::raw(" "), indicator, hints]);
        frame.render_widget(Paragraph::new(line), area);
    }
}
