// ── Text view ──
//
// Pure formatting of the channel grid and the full screen text.

use std::fmt::Write;

use chrono::{DateTime, TimeZone};

use crate::channels::CHANNEL_COUNT;
use crate::monitor::Monitor;

/// Values per grid row.
pub const COLUMNS: usize = 16;

/// Lay out `total_channels` values in rows of [`COLUMNS`].
///
/// Each row reads `Ch 001 - 016 >>> ` followed by the values, each right
/// aligned in three characters. A trailing partial row is not shown, and
/// `total_channels` is clamped to the length of `channels`.
pub fn render_channels(channels: &[u8], total_channels: usize) -> String {
    let total = total_channels.min(channels.len());
    let mut view = String::new();

    for (row, values) in channels[..total].chunks_exact(COLUMNS).enumerate() {
        let start = row * COLUMNS + 1;
        let _ = write!(view, "Ch {start:03} - {:03} >>> ", start + COLUMNS - 1);
        for (col, value) in values.iter().enumerate() {
            let sep = if col + 1 == COLUMNS { "" } else { " " };
            let _ = write!(view, "{value:3}{sep}");
        }
        view.push('\n');
    }
    view
}

/// Complete screen text for the monitor's current state.
pub fn screen_text<Tz>(monitor: &Monitor, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(connection) = monitor.connection() else {
        return format!(
            "*** DMX Monitor *** {}\nNo DMX USB Pro connected...\n",
            now.format("%H:%M:%S")
        );
    };

    if !monitor.show_monitor() {
        return format!("Found the following devices\n{}", monitor.devices());
    }

    format!(
        "*** DMX Monitor for {} *** {}\n{}",
        connection.device().path,
        now.format("%H:%M:%S%.6f"),
        render_channels(monitor.channels().as_slice(), CHANNEL_COUNT)
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::MonitorSettings;

    #[test]
    fn two_full_rows() {
        let channels: Vec<u8> = (0..32).collect();
        let view = render_channels(&channels, 32);
        let lines: Vec<_> = view.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Ch 001 - 016 >>> "));
        assert!(lines[1].starts_with("Ch 017 - 032 >>> "));
        assert_eq!(
            lines[0],
            "Ch 001 - 016 >>>   0   1   2   3   4   5   6   7   8   9  10  11  12  13  14  15"
        );
    }

    #[test]
    fn partial_row_is_dropped() {
        let channels = [7u8; 17];
        let view = render_channels(&channels, 17);
        assert_eq!(view.lines().count(), 1);
        assert!(!view.contains("Ch 017"));
    }

    #[test]
    fn values_are_right_aligned() {
        let mut channels = [0u8; 16];
        channels[0] = 255;
        channels[1] = 9;
        let view = render_channels(&channels, 16);
        assert!(view.starts_with("Ch 001 - 016 >>> 255   9   0"));
        assert!(view.ends_with("  0\n"));
    }

    #[test]
    fn full_universe_has_32_rows() {
        let view = render_channels(&[0; CHANNEL_COUNT], CHANNEL_COUNT);
        assert_eq!(view.lines().count(), 32);
        assert!(view.lines().last().unwrap_or_default().starts_with("Ch 497 - 512"));
    }

    #[test]
    fn total_larger_than_buffer_is_clamped() {
        let view = render_channels(&[1; 16], 512);
        assert_eq!(view.lines().count(), 1);
        assert_eq!(render_channels(&[], 16), "");
    }

    #[test]
    fn disconnected_screen() {
        let monitor = Monitor::new(MonitorSettings::default());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 21, 4, 5).single();
        let Some(now) = now else {
            panic!("valid timestamp");
        };
        assert_eq!(
            screen_text(&monitor, &now),
            "*** DMX Monitor *** 21:04:05\nNo DMX USB Pro connected...\n"
        );
    }
}
