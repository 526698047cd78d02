// ── Command executor ──
//
// Carries out the commands returned by `Monitor::update`. Connect runs
// on the blocking pool and reports back through the event channel;
// ticks are plain tokio timers feeding the same channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::capability::ChangeSetCodec;
use crate::connection::ConnectionManager;
use crate::discovery::DeviceDescriptor;
use crate::monitor::{Command, Event, Monitor};

/// Requests only the UI runtime can fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiRequest {
    ClearScreen,
    Quit,
}

#[derive(Clone)]
pub struct Executor {
    manager: ConnectionManager,
    codec: Arc<dyn ChangeSetCodec>,
    events: mpsc::UnboundedSender<Event>,
}

impl Executor {
    /// `events` must feed the same monitor the commands come from.
    pub fn new(
        manager: ConnectionManager,
        codec: Arc<dyn ChangeSetCodec>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            manager,
            codec,
            events,
        }
    }

    /// Feed `event` to `monitor` and run every resulting command.
    pub async fn dispatch(&self, monitor: &mut Monitor, event: Event) -> Vec<UiRequest> {
        let mut requests = Vec::new();
        for command in monitor.update(event) {
            if let Some(request) = self.execute(monitor, command).await {
                requests.push(request);
            }
        }
        requests
    }

    pub async fn execute(&self, monitor: &mut Monitor, command: Command) -> Option<UiRequest> {
        match command {
            Command::Connect(device) => {
                self.spawn_connect(device);
                None
            }
            Command::StartDrain(generation) => {
                match monitor.connection_mut() {
                    Some(conn) if conn.generation() == generation => {
                        conn.start_drain(self.codec.clone(), self.events.clone());
                    }
                    _ => debug!(generation, "no accepted connection to drain"),
                }
                None
            }
            Command::Disconnect(connection) => {
                ConnectionManager::disconnect(&mut Some(connection));
                None
            }
            Command::ScheduleTick { delay, epoch } => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::Tick(epoch));
                });
                None
            }
            Command::AwaitChanges(window) => {
                let applied = monitor.await_changes(window).await;
                if applied > 0 {
                    debug!(applied, "applied change sets");
                }
                None
            }
            Command::ClearScreen => Some(UiRequest::ClearScreen),
            Command::Quit => Some(UiRequest::Quit),
        }
    }

    fn spawn_connect(&self, device: DeviceDescriptor) {
        let manager = self.manager.clone();
        let events = self.events.clone();
        let runtime = tokio::runtime::Handle::current();

        tokio::task::spawn_blocking(move || {
            // Sessions may spawn their own feed tasks while subscribing.
            let _entered = runtime.enter();
            let event = match manager.open_monitor(&device) {
                Ok(connection) => Event::Connected(connection),
                Err(e) => {
                    warn!(error = %e, "connect attempt failed");
                    Event::ConnectFailed {
                        device,
                        reason: e.to_string(),
                    }
                }
            };
            // A closed channel means the monitor is gone; dropping the
            // connection here closes it.
            let _ = events.send(event);
        });
    }
}
