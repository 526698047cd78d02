// ── Monitor state machine ──
//
// Single consumer of every discovery, connection and tick event. `update`
// is a plain transition function: it mutates the monitor and returns the
// commands an executor must carry out, but performs no I/O itself.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::channels::ChannelBuffer;
use crate::config::MonitorSettings;
use crate::connection::Connection;
use crate::discovery::{DeviceCatalog, DeviceDescriptor};

/// Pause/resume signal for the refresh loop. The raw values are the ones
/// the tick message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorSignal {
    Pause = 0,
    Resume = 1,
}

impl MonitorSignal {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Pause),
            1 => Some(Self::Resume),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Pause => 0,
            Self::Resume => 1,
        }
    }
}

/// Input already translated from the UI runtime's key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    Quit,
    TogglePause,
}

/// Everything the monitor reacts to.
#[derive(Debug)]
pub enum Event {
    /// Fresh scan result from the observer. Empty means nothing attached.
    Discovery(DeviceCatalog),
    /// Refresh timer fired for the given tick epoch.
    Tick(u64),
    Monitor(MonitorSignal),
    /// Outcome of a [`Command::Connect`].
    Connected(Connection),
    ConnectFailed {
        device: DeviceDescriptor,
        reason: String,
    },
    /// The drain loop of connection `generation` has ended.
    ConnectionFault { generation: u64, reason: String },
    Input(UserInput),
    Quit,
}

/// Side effects requested by [`Monitor::update`].
pub enum Command {
    /// Open a read session with the device.
    Connect(DeviceDescriptor),
    /// Start the drain loop of the accepted connection `generation`.
    StartDrain(u64),
    /// Release this connection.
    Disconnect(Connection),
    /// Deliver `Event::Tick(epoch)` after `delay`.
    ScheduleTick { delay: Duration, epoch: u64 },
    /// Wait up to the given window for pending change sets and apply them.
    AwaitChanges(Duration),
    ClearScreen,
    Quit,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(device) => f.debug_tuple("Connect").field(&device.path).finish(),
            Self::StartDrain(generation) => f.debug_tuple("StartDrain").field(generation).finish(),
            Self::Disconnect(conn) => f.debug_tuple("Disconnect").field(conn).finish(),
            Self::ScheduleTick { delay, epoch } => f
                .debug_struct("ScheduleTick")
                .field("delay", delay)
                .field("epoch", epoch)
                .finish(),
            Self::AwaitChanges(window) => f.debug_tuple("AwaitChanges").field(window).finish(),
            Self::ClearScreen => f.write_str("ClearScreen"),
            Self::Quit => f.write_str("Quit"),
        }
    }
}

/// Connection slot. At most one live handle, by construction.
#[derive(Debug, Default)]
pub enum Link {
    #[default]
    Disconnected,
    /// A connect attempt for this device is in flight.
    Connecting(DeviceDescriptor),
    Connected(Connection),
}

/// Coarse state, derived from the monitor's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    DevicesFound,
    Connecting,
    /// Connected; the device list stays up until the first refresh.
    Connected,
    Monitoring,
    Paused,
    Terminated,
}

/// UI-facing monitor state.
#[derive(Debug)]
pub struct Monitor {
    settings: MonitorSettings,
    devices: DeviceCatalog,
    link: Link,
    show_monitor: bool,
    paused: bool,
    channels: ChannelBuffer,
    tick_epoch: u64,
    terminated: bool,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            devices: DeviceCatalog::new(),
            link: Link::Disconnected,
            show_monitor: false,
            paused: false,
            channels: ChannelBuffer::new(),
            tick_epoch: 0,
            terminated: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn devices(&self) -> &DeviceCatalog {
        &self.devices
    }

    pub fn channels(&self) -> &ChannelBuffer {
        &self.channels
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn connection(&self) -> Option<&Connection> {
        match &self.link {
            Link::Connected(conn) => Some(conn),
            _ => None,
        }
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut Connection> {
        match &mut self.link {
            Link::Connected(conn) => Some(conn),
            _ => None,
        }
    }

    pub fn show_monitor(&self) -> bool {
        self.show_monitor
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn phase(&self) -> Phase {
        if self.terminated {
            return Phase::Terminated;
        }
        match (&self.link, self.paused) {
            (Link::Connected(_), true) => Phase::Paused,
            (Link::Connected(_), false) if self.show_monitor => Phase::Monitoring,
            (Link::Connected(_), false) => Phase::Connected,
            (Link::Connecting(_), _) => Phase::Connecting,
            (Link::Disconnected, _) if self.devices.is_empty() => Phase::Idle,
            (Link::Disconnected, _) => Phase::DevicesFound,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Apply one event and return the commands it requires.
    pub fn update(&mut self, event: Event) -> Vec<Command> {
        if self.terminated {
            // Late results must still release their handles.
            return match event {
                Event::Connected(conn) => vec![Command::Disconnect(conn)],
                _ => Vec::new(),
            };
        }

        match event {
            Event::Discovery(catalog) => self.on_discovery(catalog),
            Event::Connected(conn) => self.on_connected(conn),
            Event::ConnectFailed { device, reason } => {
                warn!(path = %device.path, %reason, "connect failed");
                if matches!(&self.link, Link::Connecting(d) if d.path == device.path) {
                    self.link = Link::Disconnected;
                }
                vec![Command::ClearScreen]
            }
            Event::ConnectionFault { generation, reason } => {
                self.on_connection_fault(generation, &reason)
            }
            Event::Tick(epoch) => self.on_tick(epoch),
            Event::Monitor(signal) => self.on_signal(signal),
            Event::Input(UserInput::TogglePause) => {
                let signal = if self.paused {
                    MonitorSignal::Resume
                } else {
                    MonitorSignal::Pause
                };
                self.on_signal(signal)
            }
            Event::Input(UserInput::Quit) | Event::Quit => self.on_quit(),
        }
    }

    fn on_discovery(&mut self, catalog: DeviceCatalog) -> Vec<Command> {
        self.devices = catalog;

        if let Some(first) = self.devices.first() {
            if !matches!(self.link, Link::Disconnected) {
                return Vec::new();
            }
            debug!(path = %first.path, "device found, connecting");
            let first = first.clone();
            self.link = Link::Connecting(first.clone());
            return vec![Command::Connect(first)];
        }

        match std::mem::take(&mut self.link) {
            Link::Connected(conn) => {
                info!(path = %conn.device().path, "device gone, tearing down");
                self.stop_monitoring();
                vec![Command::Disconnect(conn), Command::ClearScreen]
            }
            // The pending result will be rejected when it arrives.
            Link::Connecting(_) | Link::Disconnected => Vec::new(),
        }
    }

    fn on_connected(&mut self, conn: Connection) -> Vec<Command> {
        let expected = matches!(&self.link, Link::Connecting(d) if d.path == conn.device().path);
        if !expected {
            debug!(path = %conn.device().path, "rejecting unexpected connection");
            return vec![Command::Disconnect(conn)];
        }

        self.channels.reset();
        self.paused = false;
        self.show_monitor = false;
        let generation = conn.generation();
        self.link = Link::Connected(conn);
        self.tick_epoch += 1;
        vec![
            Command::StartDrain(generation),
            Command::ScheduleTick {
                delay: self.settings.refresh_period,
                epoch: self.tick_epoch,
            },
        ]
    }

    fn on_connection_fault(&mut self, generation: u64, reason: &str) -> Vec<Command> {
        let current = matches!(&self.link, Link::Connected(c) if c.generation() == generation);
        if !current {
            return Vec::new();
        }
        let Link::Connected(conn) = std::mem::take(&mut self.link) else {
            return Vec::new();
        };
        warn!(path = %conn.device().path, generation, reason, "connection lost");
        self.stop_monitoring();
        vec![Command::Disconnect(conn), Command::ClearScreen]
    }

    fn on_tick(&mut self, epoch: u64) -> Vec<Command> {
        if epoch != self.tick_epoch || self.paused || self.connection().is_none() {
            return Vec::new();
        }
        self.show_monitor = true;
        vec![
            Command::AwaitChanges(self.settings.wait_window),
            Command::ScheduleTick {
                delay: self.settings.refresh_period,
                epoch,
            },
        ]
    }

    fn on_signal(&mut self, signal: MonitorSignal) -> Vec<Command> {
        if self.connection().is_none() {
            return Vec::new();
        }
        match signal {
            MonitorSignal::Pause if !self.paused => {
                self.paused = true;
                self.show_monitor = false;
                self.tick_epoch += 1;
                vec![Command::ClearScreen]
            }
            MonitorSignal::Resume if self.paused => {
                self.paused = false;
                self.tick_epoch += 1;
                vec![Command::ScheduleTick {
                    delay: Duration::ZERO,
                    epoch: self.tick_epoch,
                }]
            }
            MonitorSignal::Pause | MonitorSignal::Resume => Vec::new(),
        }
    }

    fn on_quit(&mut self) -> Vec<Command> {
        self.terminated = true;
        self.stop_monitoring();
        match std::mem::take(&mut self.link) {
            Link::Connected(conn) => vec![Command::Disconnect(conn), Command::Quit],
            Link::Connecting(_) | Link::Disconnected => vec![Command::Quit],
        }
    }

    fn stop_monitoring(&mut self) {
        self.show_monitor = false;
        self.paused = false;
        self.tick_epoch += 1;
    }

    // ── Change application ───────────────────────────────────────

    /// Wait up to `window` for a change set from the active connection,
    /// then apply it together with anything else already queued.
    ///
    /// Returns the number of change sets applied.
    pub async fn await_changes(&mut self, window: Duration) -> usize {
        let Link::Connected(conn) = &mut self.link else {
            return 0;
        };
        let Some(rx) = conn.changes_mut() else {
            return 0;
        };

        let Ok(Some(first)) = timeout(window, rx.recv()).await else {
            return 0;
        };
        self.channels.apply(&first);
        let mut applied = 1;

        loop {
            match rx.try_recv() {
                Ok(update) => {
                    self.channels.apply(&update);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        applied
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connection::{ConnectMode, ConnectionManager};
    use crate::port::PortInfo;
    use crate::sim::VirtualRig;

    fn catalog(paths: &[&str]) -> DeviceCatalog {
        DeviceCatalog::from_ports(paths.iter().map(|p| PortInfo {
            path: (*p).into(),
            vendor_id: "0403".into(),
            product_id: "6001".into(),
            product: "DMX USB PRO".into(),
            serial_number: "EN0001".into(),
        }))
    }

    fn manager(rig: &Arc<VirtualRig>) -> ConnectionManager {
        ConnectionManager::new(rig.clone(), MonitorSettings::default())
    }

    fn connection(manager: &ConnectionManager, path: &str) -> Connection {
        let device = DeviceDescriptor {
            path: path.into(),
            name: String::new(),
            serial_number: String::new(),
        };
        manager.connect(&device, ConnectMode::Read).unwrap()
    }

    fn connected_monitor(manager: &ConnectionManager) -> Monitor {
        let mut m = Monitor::new(MonitorSettings::default());
        m.update(Event::Discovery(catalog(&[VirtualRig::PATH])));
        m.update(Event::Connected(connection(manager, VirtualRig::PATH)));
        m
    }

    #[test]
    fn starts_idle() {
        let m = Monitor::new(MonitorSettings::default());
        assert_eq!(m.phase(), Phase::Idle);
        assert!(m.connection().is_none());
        assert!(!m.show_monitor());
    }

    #[test]
    fn discovery_requests_connect_to_first_device() {
        let mut m = Monitor::new(MonitorSettings::default());
        let cmds = m.update(Event::Discovery(catalog(&["/dev/a", "/dev/b"])));

        assert!(matches!(cmds.as_slice(), [Command::Connect(d)] if d.path == "/dev/a"));
        assert_eq!(m.phase(), Phase::Connecting);

        // Repeated scans while connecting do not start a second attempt.
        assert!(m.update(Event::Discovery(catalog(&["/dev/a"]))).is_empty());
    }

    #[test]
    fn connected_resets_buffer_and_starts_ticking() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = Monitor::new(MonitorSettings::default());
        m.channels.apply(&[(3, 9), (100, 1)].into_iter().collect());
        m.update(Event::Discovery(catalog(&[VirtualRig::PATH])));

        let conn = connection(&manager(&rig), VirtualRig::PATH);
        let generation = conn.generation();
        let cmds = m.update(Event::Connected(conn));

        assert!(m.channels().as_slice().iter().all(|&v| v == 0));
        assert!(matches!(
            cmds.as_slice(),
            [Command::StartDrain(g), Command::ScheduleTick { delay, .. }]
                if *g == generation && *delay == Duration::from_millis(40)
        ));
        assert_eq!(m.phase(), Phase::Connected);
        assert!(!m.show_monitor());
    }

    #[test]
    fn monitoring_phase_starts_with_first_tick() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        assert_eq!(m.phase(), Phase::Connected);

        m.update(Event::Tick(m.tick_epoch));

        assert_eq!(m.phase(), Phase::Monitoring);
        assert!(m.show_monitor());
    }

    #[test]
    fn connect_failure_clears_and_allows_retry() {
        let mut m = Monitor::new(MonitorSettings::default());
        let Some(Command::Connect(device)) =
            m.update(Event::Discovery(catalog(&["/dev/a"]))).pop()
        else {
            panic!("expected connect");
        };

        let cmds = m.update(Event::ConnectFailed {
            device,
            reason: "busy".into(),
        });
        assert!(matches!(cmds.as_slice(), [Command::ClearScreen]));
        assert_eq!(m.phase(), Phase::DevicesFound);

        let cmds = m.update(Event::Discovery(catalog(&["/dev/a"])));
        assert!(matches!(cmds.as_slice(), [Command::Connect(_)]));
    }

    #[test]
    fn tick_refreshes_and_reschedules() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        let epoch = m.tick_epoch;

        let cmds = m.update(Event::Tick(epoch));

        assert!(m.show_monitor());
        assert!(matches!(
            cmds.as_slice(),
            [Command::AwaitChanges(w), Command::ScheduleTick { epoch: e, .. }]
                if *w == Duration::from_millis(20) && *e == epoch
        ));
    }

    #[test]
    fn stale_tick_is_ignored() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        let old = m.tick_epoch;
        m.update(Event::Monitor(MonitorSignal::Pause));
        m.update(Event::Monitor(MonitorSignal::Resume));

        assert!(m.update(Event::Tick(old)).is_empty());
    }

    #[test]
    fn pause_and_resume() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        m.update(Event::Tick(m.tick_epoch));

        let cmds = m.update(Event::Input(UserInput::TogglePause));
        assert!(matches!(cmds.as_slice(), [Command::ClearScreen]));
        assert_eq!(m.phase(), Phase::Paused);
        assert!(!m.show_monitor());
        assert!(m.connection().unwrap().is_open());
        assert!(m.update(Event::Tick(m.tick_epoch)).is_empty());

        let cmds = m.update(Event::Monitor(MonitorSignal::from_raw(1).unwrap()));
        assert!(matches!(
            cmds.as_slice(),
            [Command::ScheduleTick { delay, epoch }] if delay.is_zero() && *epoch == m.tick_epoch
        ));
        assert_eq!(m.phase(), Phase::Connected);
        m.update(Event::Tick(m.tick_epoch));
        assert_eq!(m.phase(), Phase::Monitoring);
    }

    #[test]
    fn signals_without_connection_are_ignored() {
        let mut m = Monitor::new(MonitorSettings::default());
        assert!(m.update(Event::Monitor(MonitorSignal::Pause)).is_empty());
        assert!(m.update(Event::Input(UserInput::TogglePause)).is_empty());
        assert_eq!(MonitorSignal::from_raw(2), None);
        assert_eq!(MonitorSignal::Pause.raw(), 0);
    }

    #[test]
    fn empty_catalog_tears_connection_down() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        m.update(Event::Tick(m.tick_epoch));

        let cmds = m.update(Event::Discovery(DeviceCatalog::new()));

        assert!(matches!(
            cmds.as_slice(),
            [Command::Disconnect(_), Command::ClearScreen]
        ));
        assert_eq!(m.phase(), Phase::Idle);
        assert!(!m.show_monitor());
        drop(cmds);
        assert_eq!(rig.open_sessions(), 0);
    }

    #[test]
    fn second_connection_is_rejected() {
        let rig = Arc::new(VirtualRig::new());
        let manager = manager(&rig);
        let mut m = connected_monitor(&manager);
        let first = m.connection().unwrap().generation();

        let cmds = m.update(Event::Connected(connection(&manager, VirtualRig::PATH)));

        assert!(matches!(cmds.as_slice(), [Command::Disconnect(c)] if c.generation() != first));
        assert_eq!(m.connection().unwrap().generation(), first);
    }

    #[test]
    fn late_connection_after_unplug_is_rejected() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = Monitor::new(MonitorSettings::default());
        m.update(Event::Discovery(catalog(&[VirtualRig::PATH])));
        m.update(Event::Discovery(DeviceCatalog::new()));

        let cmds = m.update(Event::Connected(connection(&manager(&rig), VirtualRig::PATH)));

        assert!(matches!(cmds.as_slice(), [Command::Disconnect(_)]));
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn fault_from_current_connection_tears_down() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));
        let generation = m.connection().unwrap().generation();

        let stale = m.update(Event::ConnectionFault {
            generation: generation + 100,
            reason: "old".into(),
        });
        assert!(stale.is_empty());

        let cmds = m.update(Event::ConnectionFault {
            generation,
            reason: "stream ended".into(),
        });
        assert!(matches!(
            cmds.as_slice(),
            [Command::Disconnect(_), Command::ClearScreen]
        ));
        assert_eq!(m.phase(), Phase::DevicesFound);
    }

    #[test]
    fn quit_releases_connection() {
        let rig = Arc::new(VirtualRig::new());
        let mut m = connected_monitor(&manager(&rig));

        let cmds = m.update(Event::Input(UserInput::Quit));

        assert!(matches!(cmds.as_slice(), [Command::Disconnect(_), Command::Quit]));
        assert_eq!(m.phase(), Phase::Terminated);
        assert!(m.update(Event::Discovery(catalog(&["/dev/a"]))).is_empty());
    }

    #[test]
    fn quit_without_connection() {
        let mut m = Monitor::new(MonitorSettings::default());
        assert!(matches!(m.update(Event::Quit).as_slice(), [Command::Quit]));
    }
}
