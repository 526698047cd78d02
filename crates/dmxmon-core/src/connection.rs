// ── Connection lifecycle ──
//
// Opens and closes sessions through the controller capability. A
// `Connection` is the one live handle to a device; dropping it closes
// the session and stops its drain loop. The drain loop is only started
// once the monitor holds the handle, so its teardown event can never
// overtake the handle itself.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{ChangeSetCodec, DmxController, DmxSession, RawStream};
use crate::channels::ChangeSet;
use crate::config::MonitorSettings;
use crate::discovery::DeviceDescriptor;
use crate::drain;
use crate::error::{ConnectError, ControllerError};
use crate::monitor::Event;

/// Queue depth between a drain loop and the monitor.
const CHANGE_QUEUE_SIZE: usize = 64;

/// Session direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Receive-only; the device is switched to read mode after connecting.
    Read,
    /// May send DMX.
    Write,
}

/// Exclusive handle to a live device session.
pub struct Connection {
    device: DeviceDescriptor,
    mode: ConnectMode,
    generation: u64,
    session: Option<Box<dyn DmxSession>>,
    cancel: CancellationToken,
    /// Subscribed but not yet drained.
    pending: Option<RawStream>,
    changes: Option<mpsc::Receiver<ChangeSet>>,
}

impl Connection {
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn mode(&self) -> ConnectMode {
        self.mode
    }

    /// Monotonic id distinguishing this connection from earlier ones.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Change sets forwarded by this connection's drain loop, if any.
    pub fn changes_mut(&mut self) -> Option<&mut mpsc::Receiver<ChangeSet>> {
        self.changes.as_mut()
    }

    /// Token cancelled when this connection closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the drain loop for the subscribed change stream.
    ///
    /// Returns `false` when there is nothing to drain: no subscription,
    /// a loop already running, or a closed connection. Must be called
    /// within a tokio runtime.
    pub fn start_drain(
        &mut self,
        codec: Arc<dyn ChangeSetCodec>,
        events: mpsc::UnboundedSender<Event>,
    ) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(stream) = self.pending.take() else {
            return false;
        };

        let (changes_tx, changes_rx) = mpsc::channel(CHANGE_QUEUE_SIZE);
        self.changes = Some(changes_rx);
        drain::spawn(
            stream,
            codec,
            changes_tx,
            events,
            self.cancel.clone(),
            self.generation,
        );
        debug!(path = %self.device.path, generation = self.generation, "drain loop started");
        true
    }

    /// Close the session and stop the drain loop. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.pending = None;
        self.changes = None;
        if let Some(mut session) = self.session.take() {
            session.disconnect();
            info!(path = %self.device.path, generation = self.generation, "disconnected");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device.path)
            .field("mode", &self.mode)
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Opens sessions with the configured controller capability.
///
/// Cheaply cloneable; clones share the generation counter.
#[derive(Clone)]
pub struct ConnectionManager {
    controller: Arc<dyn DmxController>,
    settings: MonitorSettings,
    generation: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(controller: Arc<dyn DmxController>, settings: MonitorSettings) -> Self {
        Self {
            controller,
            settings,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Open a session with `device`.
    ///
    /// Read-mode sessions are additionally switched into read mode; if
    /// that fails the half-open session is disconnected before the error
    /// is returned.
    pub fn connect(
        &self,
        device: &DeviceDescriptor,
        mode: ConnectMode,
    ) -> Result<Connection, ConnectError> {
        let config = self
            .settings
            .transport(&device.path, mode == ConnectMode::Write);
        let wrap = |source: ControllerError| ConnectError {
            path: device.path.clone(),
            source,
        };

        let mut session = self.controller.connect(&config).map_err(wrap)?;

        if mode == ConnectMode::Read {
            if let Err(e) = session.switch_read_mode(self.settings.read_mode) {
                warn!(path = %device.path, error = %e, "read mode switch failed");
                session.disconnect();
                return Err(wrap(e));
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(path = %device.path, ?mode, generation, "connected");

        Ok(Connection {
            device: device.clone(),
            mode,
            generation,
            session: Some(session),
            cancel: CancellationToken::new(),
            pending: None,
            changes: None,
        })
    }

    /// Open a read session subscribed to change notifications.
    ///
    /// The stream is held on the returned connection until
    /// [`Connection::start_drain`] is called.
    pub fn open_monitor(&self, device: &DeviceDescriptor) -> Result<Connection, ConnectError> {
        let mut connection = self.connect(device, ConnectMode::Read)?;

        let stream = match connection.session.as_mut() {
            Some(session) => session.subscribe_changes(self.settings.change_interval),
            None => Err(ControllerError::Closed),
        }
        .map_err(|source| ConnectError {
            path: device.path.clone(),
            source,
        })?;
        connection.pending = Some(stream);

        Ok(connection)
    }

    /// Close whatever `slot` holds and clear it. A no-op on `None` or on
    /// an already-closed connection.
    pub fn disconnect(slot: &mut Option<Connection>) {
        if let Some(mut connection) = slot.take() {
            connection.close();
        }
    }
}
