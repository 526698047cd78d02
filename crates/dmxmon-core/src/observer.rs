// ── Device observer ──
//
// Periodic discovery scan on its own task. Every scan publishes a
// catalog; discovery errors degrade to an empty one.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::discovery::{DeviceCatalog, Discovery};

pub struct Observer {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Observer {
    /// Start scanning every `period`, the first scan immediately.
    ///
    /// `publish` is called from the observer task and must not block;
    /// sending on an unbounded channel is the intended use.
    pub fn spawn<F>(discovery: Discovery, period: Duration, publish: F) -> Self
    where
        F: Fn(DeviceCatalog) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(discovery, period, publish, cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop scanning and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn scan_loop<F>(discovery: Discovery, period: Duration, publish: F, cancel: CancellationToken)
where
    F: Fn(DeviceCatalog) + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let scanner = discovery.clone();
        let catalog = match tokio::task::spawn_blocking(move || scanner.list_devices()).await {
            Ok(Ok(catalog)) => catalog,
            Ok(Err(e)) => {
                trace!(error = %e, "scan found nothing");
                DeviceCatalog::new()
            }
            Err(e) => {
                debug!(error = %e, "scan task failed");
                DeviceCatalog::new()
            }
        };

        if cancel.is_cancelled() {
            break;
        }
        publish(catalog);
    }

    debug!("device observer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::sim::VirtualRig;

    #[tokio::test]
    async fn publishes_catalog_then_empty_after_unplug() {
        let rig = Arc::new(VirtualRig::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = Observer::spawn(
            Discovery::new(rig.clone()),
            Duration::from_millis(10),
            move |catalog| {
                let _ = tx.send(catalog);
            },
        );

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.first().unwrap().path, VirtualRig::PATH);

        rig.unplug();
        let emptied = timeout(Duration::from_secs(1), async {
            loop {
                if rx.recv().await.unwrap().is_empty() {
                    break;
                }
            }
        })
        .await;
        assert!(emptied.is_ok());

        observer.shutdown().await;
    }

    #[tokio::test]
    async fn enumeration_failure_publishes_empty_catalog() {
        let rig = Arc::new(VirtualRig::new());
        rig.fail_enumeration(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = Observer::spawn(
            Discovery::new(rig.clone()),
            Duration::from_millis(10),
            move |catalog| {
                let _ = tx.send(catalog);
            },
        );

        let catalog = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(catalog.is_empty());
        observer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_publishing() {
        let rig = Arc::new(VirtualRig::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = Observer::spawn(
            Discovery::new(rig.clone()),
            Duration::from_millis(10),
            move |catalog| {
                let _ = tx.send(catalog);
            },
        );
        rx.recv().await.unwrap();

        observer.shutdown().await;
        while rx.try_recv().is_ok() {}
        // The publisher was dropped with the task, so the channel closes.
        assert!(rx.recv().await.is_none());
    }
}
