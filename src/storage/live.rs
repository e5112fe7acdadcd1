use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::ARCHIVE_INTERVAL;
use crate::live::{ChannelLevel, LiveAggregator, cron};
use crate::storage::{LiveStorage, StorageResult};
use crate::transport::snapshot::SnapshotServer;
use crate::transport::summary::SummaryPublisher;

/// Monitoring side: keeps messages in memory, answers snapshot requests, and publishes a summary
/// per channel for every archived minute.
pub struct MemoryStorage {
    live: Arc<LiveAggregator>,
}

impl MemoryStorage {
    pub fn new(live: Arc<LiveAggregator>) -> Self {
        Self { live }
    }

    /// Binds the snapshot socket and starts the archive timer.
    pub async fn serve(
        &self,
        snapshot_addr: &str,
        publisher: SummaryPublisher,
        cancel: CancellationToken,
    ) -> StorageResult<Vec<JoinHandle<()>>> {
        let server = SnapshotServer::bind(snapshot_addr, self.live.clone()).await?;
        let snapshot = server.spawn(cancel.clone());

        let archiver = cron::spawn_archiver(
            self.live.clone(),
            ARCHIVE_INTERVAL,
            cancel,
            move |archive| {
                let publisher = publisher.clone();
                async move { publisher.publish_archive(archive).await }
            },
        );

        Ok(vec![snapshot, archiver])
    }
}

#[async_trait]
impl LiveStorage for MemoryStorage {
    fn store(&self, channel: &str, score: u64) {
        self.live.store(channel, score);
    }

    async fn cancer(&self) -> Vec<ChannelLevel> {
        self.live.snapshot()
    }
}
