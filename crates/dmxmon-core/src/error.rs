// ── Core error types ──
//
// Every failure at an I/O boundary lands in one of these enums. None of
// them is fatal: the monitor turns each into a state transition or an
// empty result.

use thiserror::Error;

/// The port enumeration collaborator failed.
#[derive(Debug, Clone, Error)]
#[error("port enumeration failed: {reason}")]
pub struct EnumerationError {
    pub reason: String,
}

impl EnumerationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Discovery and lookup failures.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The OS-level enumeration itself faulted.
    #[error(transparent)]
    EnumerationFailed(#[from] EnumerationError),

    /// Enumeration worked but no DMX USB Pro is attached.
    #[error("no DMX USB Pro device found")]
    NoDeviceFound,

    /// Lookup by path (or first-available) came up empty.
    #[error("device not found: {identifier}")]
    NotFound { identifier: String },
}

/// Failure reported by the controller capability.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("device rejected read mode {mode}: {reason}")]
    ReadMode { mode: u8, reason: String },

    #[error("change subscription failed: {reason}")]
    Subscribe { reason: String },

    #[error("session already closed")]
    Closed,
}

/// Establishing or configuring a session failed.
#[derive(Debug, Clone, Error)]
#[error("failed to connect DMX controller on {path}: {source}")]
pub struct ConnectError {
    pub path: String,
    #[source]
    pub source: ControllerError,
}

/// A raw application message could not be decoded into a change set.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("unexpected message label {label}")]
    UnexpectedLabel { label: u8 },

    #[error("malformed payload: {reason}")]
    Malformed { reason: String },
}
