// ── Virtual rig ──
//
// A software stand-in for a DMX USB Pro on a serial port. It implements
// the enumeration, controller and codec seams at once so the monitor can
// run, and be tested, without hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capability::{
    ChangeSetCodec, DmxController, DmxSession, RawMessage, RawStream, TransportConfig,
};
use crate::channels::{CHANNEL_COUNT, ChangeSet};
use crate::discovery::DeviceDescriptor;
use crate::error::{ControllerError, DecodeError, EnumerationError};
use crate::port::{DMX_USB_PRO_PRODUCT_ID, DMX_USB_PRO_VENDOR_ID, PortEnumerator, PortInfo};

/// Label of the rig's change notification messages.
pub const CHANGE_LABEL: u8 = 9;

const FEED_QUEUE_SIZE: usize = 32;

#[derive(Default)]
struct RigState {
    plugged: bool,
    chase: bool,
    fail_enumeration: bool,
    fail_next_connect: bool,
    fail_next_read_mode: bool,
    end_next_stream: bool,
    next_session: u64,
    open_sessions: usize,
    connects: usize,
    disconnects: usize,
    last_read_mode: Option<u8>,
    last_transport: Option<TransportConfig>,
    feeds: Vec<Feed>,
}

struct Feed {
    session: u64,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
}

/// One virtual DMX USB Pro that can be plugged in and pulled out.
#[derive(Clone)]
pub struct VirtualRig {
    state: Arc<Mutex<RigState>>,
}

impl Default for VirtualRig {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRig {
    pub const PATH: &'static str = "/dev/ttyVIRT0";
    pub const SERIAL_NUMBER: &'static str = "EN000001";

    /// A plugged-in rig that only emits what tests inject.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState {
                plugged: true,
                ..RigState::default()
            })),
        }
    }

    /// A plugged-in rig whose sessions play a moving chase pattern.
    pub fn with_chase() -> Self {
        let rig = Self::new();
        rig.lock().chase = true;
        rig
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            path: Self::PATH.into(),
            name: "DMX USB PRO".into(),
            serial_number: Self::SERIAL_NUMBER.into(),
        }
    }

    // ── Plug state ───────────────────────────────────────────────

    pub fn is_plugged(&self) -> bool {
        self.lock().plugged
    }

    pub fn plug(&self) {
        self.lock().plugged = true;
        debug!("virtual rig plugged in");
    }

    /// Pull the device: it disappears from enumeration and every open
    /// change stream ends.
    pub fn unplug(&self) {
        let mut state = self.lock();
        state.plugged = false;
        for feed in state.feeds.drain(..) {
            feed.cancel.cancel();
        }
        debug!("virtual rig unplugged");
    }

    pub fn toggle_plug(&self) {
        if self.is_plugged() {
            self.unplug();
        } else {
            self.plug();
        }
    }

    // ── Failure injection ────────────────────────────────────────

    pub fn fail_enumeration(&self, fail: bool) {
        self.lock().fail_enumeration = fail;
    }

    /// The next `connect` fails.
    pub fn fail_next_connect(&self) {
        self.lock().fail_next_connect = true;
    }

    /// The next read-mode switch fails.
    pub fn fail_read_mode(&self) {
        self.lock().fail_next_read_mode = true;
    }

    /// The next subscription hands out a stream that has already ended.
    pub fn end_next_stream(&self) {
        self.lock().end_next_stream = true;
    }

    // ── Injection ────────────────────────────────────────────────

    /// Deliver `changes` to every subscribed session. Returns how many
    /// streams accepted the message.
    pub fn send_changes(&self, changes: &[(u16, u8)]) -> usize {
        self.send_raw(&encode(changes))
    }

    /// Deliver an arbitrary raw message to every subscribed session.
    pub fn send_raw(&self, message: &RawMessage) -> usize {
        self.lock()
            .feeds
            .iter()
            .filter(|feed| feed.tx.try_send(message.clone()).is_ok())
            .count()
    }

    // ── Counters ─────────────────────────────────────────────────

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn last_read_mode(&self) -> Option<u8> {
        self.lock().last_read_mode
    }

    pub fn last_transport(&self) -> Option<TransportConfig> {
        self.lock().last_transport.clone()
    }
}

/// Encode channel/value pairs as a rig change message.
pub fn encode(changes: &[(u16, u8)]) -> RawMessage {
    let mut data = Vec::with_capacity(changes.len() * 3);
    for &(channel, value) in changes {
        data.extend_from_slice(&channel.to_be_bytes());
        data.push(value);
    }
    RawMessage {
        label: CHANGE_LABEL,
        data,
    }
}

impl PortEnumerator for VirtualRig {
    fn list_ports(&self) -> Result<Vec<PortInfo>, EnumerationError> {
        let state = self.lock();
        if state.fail_enumeration {
            return Err(EnumerationError::new("virtual enumeration failure"));
        }

        let mut ports = Vec::with_capacity(2);
        if state.plugged {
            ports.push(PortInfo {
                path: Self::PATH.into(),
                vendor_id: DMX_USB_PRO_VENDOR_ID.into(),
                product_id: DMX_USB_PRO_PRODUCT_ID.into(),
                product: "DMX USB PRO".into(),
                serial_number: Self::SERIAL_NUMBER.into(),
            });
        }
        ports.push(PortInfo {
            path: "/dev/ttyVIRT1".into(),
            vendor_id: "2341".into(),
            product_id: "0043".into(),
            product: "Not a DMX interface".into(),
            serial_number: "X1".into(),
        });
        Ok(ports)
    }
}

impl DmxController for VirtualRig {
    fn connect(&self, config: &TransportConfig) -> Result<Box<dyn DmxSession>, ControllerError> {
        let mut state = self.lock();
        let refuse = |reason: &str| ControllerError::Open {
            path: config.path.clone(),
            reason: reason.into(),
        };

        if std::mem::take(&mut state.fail_next_connect) {
            return Err(refuse("injected connect failure"));
        }
        if !state.plugged || config.path != Self::PATH {
            return Err(refuse("no such device"));
        }

        state.next_session += 1;
        state.connects += 1;
        state.open_sessions += 1;
        state.last_transport = Some(config.clone());

        Ok(Box::new(VirtualSession {
            id: state.next_session,
            rig: self.clone(),
            open: true,
        }))
    }
}

impl ChangeSetCodec for VirtualRig {
    fn decode(&self, message: &RawMessage) -> Result<ChangeSet, DecodeError> {
        if message.label != CHANGE_LABEL {
            return Err(DecodeError::UnexpectedLabel {
                label: message.label,
            });
        }
        if message.data.len() % 3 != 0 {
            return Err(DecodeError::Malformed {
                reason: format!("{} bytes is not a whole number of pairs", message.data.len()),
            });
        }
        Ok(message
            .data
            .chunks_exact(3)
            .map(|c| (usize::from(u16::from_be_bytes([c[0], c[1]])), c[2]))
            .collect())
    }
}

struct VirtualSession {
    id: u64,
    rig: VirtualRig,
    open: bool,
}

impl DmxSession for VirtualSession {
    fn switch_read_mode(&mut self, mode: u8) -> Result<(), ControllerError> {
        if !self.open {
            return Err(ControllerError::Closed);
        }
        let mut state = self.rig.lock();
        if std::mem::take(&mut state.fail_next_read_mode) {
            return Err(ControllerError::ReadMode {
                mode,
                reason: "injected read mode failure".into(),
            });
        }
        state.last_read_mode = Some(mode);
        Ok(())
    }

    fn subscribe_changes(&mut self, interval: Duration) -> Result<RawStream, ControllerError> {
        if !self.open {
            return Err(ControllerError::Closed);
        }
        let mut state = self.rig.lock();
        if !state.plugged {
            return Err(ControllerError::Subscribe {
                reason: "device unplugged".into(),
            });
        }

        let (tx, rx) = mpsc::channel(FEED_QUEUE_SIZE);
        if std::mem::take(&mut state.end_next_stream) {
            return Ok(rx);
        }
        let cancel = CancellationToken::new();
        if state.chase {
            tokio::spawn(chase(tx.clone(), interval, cancel.clone()));
        }
        state.feeds.push(Feed {
            session: self.id,
            tx,
            cancel,
        });
        Ok(rx)
    }

    fn disconnect(&mut self) {
        if !std::mem::replace(&mut self.open, false) {
            return;
        }
        let mut state = self.rig.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        state.disconnects += 1;
        let id = self.id;
        state.feeds.retain(|feed| {
            let keep = feed.session != id;
            if !keep {
                feed.cancel.cancel();
            }
            keep
        });
    }
}

impl Drop for VirtualSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Sweep a bar of light across the universe, one 16-channel row per frame.
async fn chase(tx: mpsc::Sender<RawMessage>, interval: Duration, cancel: CancellationToken) {
    const ROW: usize = 16;
    let rows = CHANNEL_COUNT / ROW;
    let mut ticker = tokio::time::interval(interval);
    let mut frame: usize = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let row = frame % rows;
        let previous = (frame + rows - 1) % rows;
        let mut changes = Vec::with_capacity(ROW * 2);
        for i in 0..ROW {
            let on = u16::try_from(row * ROW + i).unwrap_or_default();
            let off = u16::try_from(previous * ROW + i).unwrap_or_default();
            let level = u8::try_from(255 - i * 15).unwrap_or(u8::MAX);
            changes.push((off, 0));
            changes.push((on, level));
        }

        if tx.send(encode(&changes)).await.is_err() {
            break;
        }
        frame = frame.wrapping_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::discovery::Discovery;

    #[test]
    fn enumerates_one_matching_port_while_plugged() {
        let rig = Arc::new(VirtualRig::new());
        let discovery = Discovery::new(rig.clone());

        let catalog = discovery.list_devices().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.first().unwrap(), &rig.descriptor());

        rig.unplug();
        assert!(discovery.list_devices().is_err());
        assert_eq!(rig.list_ports().unwrap().len(), 1);
    }

    #[test]
    fn codec_decodes_encoded_pairs() {
        let rig = VirtualRig::new();
        let decoded = rig.decode(&encode(&[(3, 200), (511, 1)])).unwrap();
        assert_eq!(decoded.iter().collect::<Vec<_>>(), vec![(3, 200), (511, 1)]);
    }

    #[test]
    fn codec_rejects_foreign_and_truncated_messages() {
        let rig = VirtualRig::new();
        assert!(matches!(
            rig.decode(&RawMessage { label: 5, data: vec![] }),
            Err(DecodeError::UnexpectedLabel { label: 5 })
        ));
        assert!(matches!(
            rig.decode(&RawMessage {
                label: CHANGE_LABEL,
                data: vec![0, 1]
            }),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn connect_refused_when_unplugged_or_wrong_path() {
        let rig = VirtualRig::new();
        let mut config = TransportConfig {
            path: "/dev/elsewhere".into(),
            baud_rate: 57_600,
            channel_count: CHANNEL_COUNT,
            write: false,
        };
        assert!(rig.connect(&config).is_err());

        config.path = VirtualRig::PATH.into();
        rig.unplug();
        assert!(rig.connect(&config).is_err());
        assert_eq!(rig.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unplug_ends_change_streams() {
        let rig = VirtualRig::new();
        let config = TransportConfig {
            path: VirtualRig::PATH.into(),
            baud_rate: 57_600,
            channel_count: CHANNEL_COUNT,
            write: false,
        };
        let mut session = rig.connect(&config).unwrap();
        let mut stream = session.subscribe_changes(Duration::from_millis(5)).unwrap();

        assert_eq!(rig.send_changes(&[(1, 2)]), 1);
        assert_eq!(stream.recv().await.unwrap(), encode(&[(1, 2)]));

        rig.unplug();
        assert!(stream.recv().await.is_none());
        session.disconnect();
        assert_eq!(rig.open_sessions(), 0);
    }

    #[tokio::test]
    async fn ended_stream_is_one_shot() {
        let rig = VirtualRig::new();
        rig.end_next_stream();
        let config = TransportConfig {
            path: VirtualRig::PATH.into(),
            baud_rate: 57_600,
            channel_count: CHANNEL_COUNT,
            write: false,
        };
        let mut session = rig.connect(&config).unwrap();

        let mut ended = session.subscribe_changes(Duration::from_millis(5)).unwrap();
        assert!(ended.recv().await.is_none());

        let mut live = session.subscribe_changes(Duration::from_millis(5)).unwrap();
        assert_eq!(rig.send_changes(&[(1, 2)]), 1);
        assert!(live.recv().await.is_some());
    }

    #[tokio::test]
    async fn chase_emits_frames() {
        let rig = VirtualRig::with_chase();
        let config = TransportConfig {
            path: VirtualRig::PATH.into(),
            baud_rate: 57_600,
            channel_count: CHANNEL_COUNT,
            write: false,
        };
        let mut session = rig.connect(&config).unwrap();
        let mut stream = session.subscribe_changes(Duration::from_millis(1)).unwrap();

        let frame = rig.decode(&stream.recv().await.unwrap()).unwrap();
        assert_eq!(frame.len(), 32);
        assert!(frame.iter().all(|(channel, _)| channel < CHANNEL_COUNT));

        session.disconnect();
        while stream.recv().await.is_some() {}
    }
}
