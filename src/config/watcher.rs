use super::{ConfigManager, RefreshOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background task polling the configuration file on a fixed period.
///
/// Failures inside a cycle are logged by the manager and never end the
/// loop; only [`stop`](Self::stop) or dropping the watcher does.
pub struct ConfigWatcher {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn spawn(manager: Arc<ConfigManager>, period: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let outcome = manager.refresh_once().await;
                        if outcome != RefreshOutcome::Unchanged {
                            debug!("Configuration check finished: {:?}", outcome);
                        }
                    }
                    _ = &mut stop_rx => {
                        break;
                    }
                }
            }
            info!("Configuration monitoring stopped");
        });

        info!(
            "Configuration monitoring started (period {}s)",
            period.as_secs_f32()
        );
        Self { stop_tx, handle }
    }

    /// Signals the loop to finish and waits for it.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.await;
    }
}
