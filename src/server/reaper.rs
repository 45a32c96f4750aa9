use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::proxy::backend::BackendRegistry;

/// Periodically evicts backends that stopped re-registering.
///
/// Runs `prune_stale(max_age)` every `interval` until `cancel` fires.
pub fn spawn_reaper(
    registry: BackendRegistry,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    registry.prune_stale(max_age).await;
                }
            }
        }
    })
}
