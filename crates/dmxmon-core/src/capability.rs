// ── Controller capability seams ──
//
// The DMX USB Pro wire protocol, the serial transport and the change-set
// codec live behind these traits. The core only ever talks to them.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::channels::ChangeSet;
use crate::error::{ControllerError, DecodeError};

/// How to open a session with a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Serial port path.
    pub path: String,
    pub baud_rate: u32,
    /// Size of the universe the controller should track.
    pub channel_count: usize,
    /// Whether the session may send DMX (write) or only receive it.
    pub write: bool,
}

/// One undecoded application message from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub label: u8,
    pub data: Vec<u8>,
}

/// Stream of raw change notifications. `None` from `recv` means the
/// underlying device is gone.
pub type RawStream = mpsc::Receiver<RawMessage>;

/// Factory for device sessions.
pub trait DmxController: Send + Sync {
    fn connect(&self, config: &TransportConfig) -> Result<Box<dyn DmxSession>, ControllerError>;
}

/// A live session with one device.
pub trait DmxSession: Send {
    /// Ask the device to report received DMX. `mode` is passed through
    /// untouched; its meaning belongs to the device protocol.
    fn switch_read_mode(&mut self, mode: u8) -> Result<(), ControllerError>;

    /// Subscribe to change notifications, debounced to `interval`.
    fn subscribe_changes(&mut self, interval: Duration) -> Result<RawStream, ControllerError>;

    /// Close the session. Must tolerate repeated calls.
    fn disconnect(&mut self);
}

/// Decoder from raw messages into change sets.
pub trait ChangeSetCodec: Send + Sync {
    fn decode(&self, message: &RawMessage) -> Result<ChangeSet, DecodeError>;
}
