// ── Change drain loop ──
//
// Background task bound to one connection: pulls raw change
// notifications, decodes them and forwards the in-range updates to the
// monitor. However the loop ends, a `ConnectionFault` for its generation
// is delivered so the monitor can tear the connection down.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::capability::{ChangeSetCodec, RawMessage, RawStream};
use crate::channels::{CHANNEL_COUNT, ChangeSet};
use crate::monitor::Event;

/// Sends the teardown event when dropped, including during unwinding.
struct TeardownGuard {
    events: mpsc::UnboundedSender<Event>,
    generation: u64,
    reason: &'static str,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        debug!(generation = self.generation, reason = self.reason, "drain loop stopped");
        let _ = self.events.send(Event::ConnectionFault {
            generation: self.generation,
            reason: self.reason.to_owned(),
        });
    }
}

/// Spawn the drain loop for the connection identified by `generation`.
pub fn spawn(
    stream: RawStream,
    codec: Arc<dyn ChangeSetCodec>,
    changes: mpsc::Sender<ChangeSet>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(run(stream, codec, changes, events, cancel, generation))
}

async fn run(
    mut stream: RawStream,
    codec: Arc<dyn ChangeSetCodec>,
    changes: mpsc::Sender<ChangeSet>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut guard = TeardownGuard {
        events,
        generation,
        reason: "drain loop aborted",
    };

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                guard.reason = "connection closed";
                break;
            }
            message = stream.recv() => message,
        };

        let Some(message) = message else {
            guard.reason = "change stream ended";
            break;
        };

        let Some(update) = decode_in_range(codec.as_ref(), &message) else {
            continue;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                guard.reason = "connection closed";
                break;
            }
            sent = changes.send(update) => {
                if sent.is_err() {
                    guard.reason = "monitor dropped change queue";
                    break;
                }
            }
        }
    }
}

/// Decode `message` and drop indices outside the universe. Malformed
/// messages and change sets with nothing left yield `None`.
fn decode_in_range(codec: &dyn ChangeSetCodec, message: &RawMessage) -> Option<ChangeSet> {
    match codec.decode(message) {
        Ok(decoded) => {
            let update: ChangeSet = decoded
                .iter()
                .filter(|&(channel, _)| channel < CHANNEL_COUNT)
                .collect();
            (!update.is_empty()).then_some(update)
        }
        Err(e) => {
            trace!(error = %e, label = message.label, "discarding undecodable message");
            None
        }
    }
}
