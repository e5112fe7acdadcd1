use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::db::repositories::LeaderboardRepository;
use crate::db::store::LeaderboardStore;
use crate::live::MinuteSummary;
use crate::storage::{StorageResult, WriteStorage};
use crate::transport::summary::SummarySubscriber;

/// Recorder side: the only writer of the persistent leaderboards.
pub struct WriteOnlyStorage<R> {
    subscriber: SummarySubscriber,
    store: LeaderboardStore<R>,
}

impl<R: LeaderboardRepository> WriteOnlyStorage<R> {
    pub fn new(subscriber: SummarySubscriber, store: LeaderboardStore<R>) -> Self {
        Self { subscriber, store }
    }

    /// A summary that fails to apply is logged and dropped.
    pub async fn apply(&self, summary: MinuteSummary) {
        if let Err(e) = self.store.update_leaderboard(&summary).await {
            tracing::error!(
                channel = %summary.channel,
                date = %summary.date,
                error = %e,
                "failed to record summary"
            );
        }
    }
}

#[async_trait]
impl<R: LeaderboardRepository> WriteStorage for WriteOnlyStorage<R> {
    async fn record(&self, cancel: CancellationToken) -> StorageResult<()> {
        self.subscriber
            .run(cancel, |summary| self.apply(summary))
            .await;

        Ok(())
    }
}
