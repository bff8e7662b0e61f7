/// Change relay
///
/// Owns the single change-stream registration on the notifications
/// collection and forwards every snapshot to the broadcaster. Connection
/// churn never touches the registration; a failed or ended stream is
/// re-registered with exponential backoff and jitter.

use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::metrics;
use crate::services::FanoutBroadcaster;
use crate::store::SnapshotSource;

pub struct ChangeRelay {
    source: Arc<dyn SnapshotSource>,
    broadcaster: Arc<FanoutBroadcaster>,
    collection: String,
    config: RelayConfig,
}

/// Handle to a running relay task
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to release the registration
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Change relay task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum StreamOutcome {
    Shutdown,
    Interrupted { forwarded: usize },
}

impl ChangeRelay {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        broadcaster: Arc<FanoutBroadcaster>,
        collection: impl Into<String>,
        config: RelayConfig,
    ) -> Self {
        Self {
            source,
            broadcaster,
            collection: collection.into(),
            config,
        }
    }

    pub fn spawn(self) -> RelayHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        RelayHandle { shutdown, task }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(collection = %self.collection, "Change relay started");
        let mut backoff = self.config.initial_backoff;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscribed = tokio::select! {
                result = self.source.subscribe(&self.collection) => result,
                _ = shutdown.changed() => break,
            };

            match subscribed {
                Ok(stream) => {
                    tracing::info!(collection = %self.collection, "Change stream registered");
                    match self.forward(stream, &mut shutdown).await {
                        StreamOutcome::Shutdown => break,
                        StreamOutcome::Interrupted { forwarded } => {
                            if forwarded > 0 {
                                backoff = self.config.initial_backoff;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(collection = %self.collection, error = %e, "Change stream registration failed");
                }
            }

            metrics::record_relay_restart();
            let delay = jittered(backoff);
            tracing::warn!("Re-registering change stream in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }

            backoff = Duration::from_millis(
                ((backoff.as_millis() as f64 * 2.0).min(self.config.max_backoff.as_millis() as f64))
                    as u64,
            );
        }

        tracing::info!(collection = %self.collection, "Change relay stopped");
    }

    async fn forward(
        &self,
        mut stream: crate::store::SnapshotStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamOutcome {
        let mut forwarded = 0;
        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                _ = shutdown.changed() => return StreamOutcome::Shutdown,
            };

            match item {
                Some(Ok(snapshot)) => {
                    forwarded += 1;
                    if let Err(e) = self.broadcaster.broadcast(&snapshot) {
                        tracing::error!(error = %e, "Failed to broadcast snapshot");
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(collection = %self.collection, error = %e, "Change stream error");
                    return StreamOutcome::Interrupted { forwarded };
                }
                None => {
                    tracing::warn!(collection = %self.collection, "Change stream ended");
                    return StreamOutcome::Interrupted { forwarded };
                }
            }
        }
    }
}

/// ±30% jitter
fn jittered(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor = 1.0 + rng.gen_range(-0.3..0.3);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}
