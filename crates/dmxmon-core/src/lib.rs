// dmxmon-core: discovery, connection lifecycle and channel state for DMX USB Pro monitors.

pub mod capability;
pub mod channels;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod drain;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod observer;
pub mod port;
pub mod sim;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{
    ChangeSetCodec, DmxController, DmxSession, RawMessage, RawStream, TransportConfig,
};
pub use channels::{CHANNEL_COUNT, ChangeSet, ChannelBuffer};
pub use config::MonitorSettings;
pub use connection::{ConnectMode, Connection, ConnectionManager};
pub use discovery::{DeviceCatalog, DeviceDescriptor, Discovery};
pub use error::{ConnectError, ControllerError, DecodeError, DiscoveryError, EnumerationError};
pub use executor::{Executor, UiRequest};
pub use monitor::{Command, Event, Link, Monitor, MonitorSignal, Phase, UserInput};
pub use observer::Observer;
pub use port::{PortEnumerator, PortInfo, SerialPortEnumerator};
pub use view::{render_channels, screen_text};
