use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::live::{Archive, LiveAggregator};

/// Spawns the archive timer: every `period` (first pass one period after start) the aggregator is
/// swept and the result handed to `on_archive`.
///
/// Cancellation is only observed between sweeps.
pub fn spawn_archiver<F, Fut>(
    live: Arc<LiveAggregator>,
    period: Duration,
    cancel: CancellationToken,
    on_archive: F,
) -> JoinHandle<()>
where
    F: Fn(Archive) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // interval's first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("archive timer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let archive = live.archive();
                    on_archive(archive).await;
                }
            }
        }
    })
}
