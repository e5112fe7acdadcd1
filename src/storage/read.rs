use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::db::catalog;
use crate::db::models::view::{ChannelView, LeaderboardEntry, LiveStatus, Status};
use crate::db::repositories::LeaderboardRepository;
use crate::db::store::LeaderboardStore;
use crate::live::ChannelLevel;
use crate::storage::{ReadStorage, StorageResult};
use crate::transport::snapshot::SnapshotClient;

/// API side: leaderboards from the persistent store, live levels over the snapshot channel.
pub struct ReadOnlyStorage<R> {
    snapshot: SnapshotClient,
    store: LeaderboardStore<R>,
}

impl<R: LeaderboardRepository> ReadOnlyStorage<R> {
    pub fn new(snapshot: SnapshotClient, store: LeaderboardStore<R>) -> Self {
        Self { snapshot, store }
    }
}

impl LiveStatus {
    pub fn from_levels(levels: &[ChannelLevel]) -> Self {
        levels.iter().fold(
            LiveStatus {
                channels: levels.len() as u64,
                ..Default::default()
            },
            |mut status, level| {
                status.messages += level.messages;
                status.cancer += level.cancer;
                status
            },
        )
    }
}

#[async_trait]
impl<R: LeaderboardRepository> ReadStorage for ReadOnlyStorage<R> {
    async fn cancer(&self) -> Vec<ChannelLevel> {
        self.snapshot.request().await
    }

    async fn leaderboards(
        &self,
        horizon: &str,
    ) -> StorageResult<BTreeMap<String, Vec<LeaderboardEntry>>> {
        Ok(self.store.leaderboards(horizon).await?)
    }

    async fn leaderboard(&self, name: &str) -> StorageResult<Vec<LeaderboardEntry>> {
        if !catalog::is_valid(name) {
            tracing::debug!(%name, "unknown leaderboard requested");
            return Ok(Vec::new());
        }

        Ok(self.store.leaderboard(name).await?)
    }

    async fn channel(&self, channel: &str) -> StorageResult<ChannelView> {
        Ok(self.store.channel(channel).await?)
    }

    async fn status(&self) -> StorageResult<Status> {
        let total = self.store.status().await?;
        let live = LiveStatus::from_levels(&self.snapshot.request().await);

        Ok(Status { total, live })
    }

    async fn search(&self, needle: Option<&str>) -> StorageResult<Vec<String>> {
        Ok(self.store.search(needle).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tokio_util::sync::CancellationToken;

    use crate::db::repositories::memory::MemoryLeaderboardRepository;
    use crate::live::{LiveAggregator, MinuteSummary};
    use crate::transport::snapshot::SnapshotServer;

    #[tokio::test]
    async fn test_status_combines_persisted_and_live() {
        let live = Arc::new(LiveAggregator::new());
        live.store("#forsen", 4);
        live.store("#forsen", 1);
        live.store("#lirik", 2);

        let cancel = CancellationToken::new();
        let server = SnapshotServer::bind("127.0.0.1:0", live).await.unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn(cancel.clone());

        let store = LeaderboardStore::new(MemoryLeaderboardRepository::new());
        store
            .update_leaderboard(&MinuteSummary {
                channel: "#forsen".into(),
                date: Utc::now(),
                cancer: 10,
                messages: 30,
            })
            .await
            .unwrap();

        let storage = ReadOnlyStorage::new(SnapshotClient::new(addr.to_string()), store);
        let status = storage.status().await.unwrap();

        assert_eq!(
            status.live,
            LiveStatus {
                channels: 2,
                messages: 3,
                cancer: 7
            }
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["total"]["all"]["messages"], 30);
        assert_eq!(json["total"]["all"]["channels"], 1);
        assert_eq!(json["live"]["cancer"], 7);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_leaderboard_is_empty() {
        let store = LeaderboardStore::new(MemoryLeaderboardRepository::new());
        store
            .update_leaderboard(&MinuteSummary {
                channel: "#forsen".into(),
                date: Utc::now(),
                cancer: 10,
                messages: 30,
            })
            .await
            .unwrap();

        let storage = ReadOnlyStorage::new(SnapshotClient::new("127.0.0.1:1"), store);

        assert_eq!(storage.leaderboard("all.cancer.total").await.unwrap().len(), 1);
        for name in ["all.cpm.average", "weekly.cancer.total", "all.cancer"] {
            assert!(storage.leaderboard(name).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_status_without_monitor_has_empty_live() {
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let storage = ReadOnlyStorage::new(
            SnapshotClient::with_timeout(addr.to_string(), Duration::from_millis(200)),
            LeaderboardStore::new(MemoryLeaderboardRepository::new()),
        );

        let status = storage.status().await.unwrap();
        assert_eq!(status.live, LiveStatus::default());
        assert_eq!(status.total.len(), 3);
    }
}
