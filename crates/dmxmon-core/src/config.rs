// ── Runtime tuning ──
//
// Timing and transport constants for one monitor instance. Built by the
// binary (usually through dmxmon-config) and handed in; core never
// reads config files.

use std::time::Duration;

use crate::channels::CHANNEL_COUNT;
use crate::capability::TransportConfig;

/// Baud rate of the DMX USB Pro's virtual COM port.
pub const BAUD_RATE: u32 = 57_600;
/// Read-mode parameter asking the widget to report changes only.
pub const READ_MODE_CHANGES: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Delay between two discovery scans.
    pub discovery_period: Duration,
    /// Delay between two view refresh ticks.
    pub refresh_period: Duration,
    /// How long a refresh tick waits for a pending change set.
    pub wait_window: Duration,
    /// Debounce interval requested from the change subscription.
    pub change_interval: Duration,
    pub baud_rate: u32,
    /// Opaque read-mode value passed to the controller.
    pub read_mode: u8,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            discovery_period: Duration::from_millis(1000),
            refresh_period: Duration::from_millis(40),
            wait_window: Duration::from_millis(20),
            change_interval: Duration::from_millis(40),
            baud_rate: BAUD_RATE,
            read_mode: READ_MODE_CHANGES,
        }
    }
}

impl MonitorSettings {
    /// Transport configuration for the device at `path`.
    pub fn transport(&self, path: &str, write: bool) -> TransportConfig {
        TransportConfig {
            path: path.to_owned(),
            baud_rate: self.baud_rate,
            channel_count: CHANNEL_COUNT,
            write,
        }
    }
}
