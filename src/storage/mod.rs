//! Single entry point over the three storage roles.
//!
//! Each process builds a [`Storage`] with only the backends its role needs:
//!
//! - `monitor`: [`LiveStorage`] ([`live::MemoryStorage`]) for `store` and `cancer`
//! - `record`: [`WriteStorage`] ([`write::WriteOnlyStorage`]) for `record`
//! - `expose`: [`ReadStorage`] ([`read::ReadOnlyStorage`]) for everything else
//!
//! Calling an operation whose backend is absent fails with [`StorageError::Unavailable`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::db::DbError;
use crate::db::models::view::{ChannelView, LeaderboardEntry, Status};
use crate::live::ChannelLevel;
use crate::transport::TransportError;

pub mod live;
pub mod read;
pub mod write;

pub type StorageResult<T> = core::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no backend configured for '{0}'")]
    Unavailable(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[async_trait]
pub trait LiveStorage: Send + Sync {
    fn store(&self, channel: &str, score: u64);
    async fn cancer(&self) -> Vec<ChannelLevel>;
}

#[async_trait]
pub trait ReadStorage: Send + Sync {
    async fn cancer(&self) -> Vec<ChannelLevel>;
    async fn leaderboards(
        &self,
        horizon: &str,
    ) -> StorageResult<BTreeMap<String, Vec<LeaderboardEntry>>>;
    async fn leaderboard(&self, name: &str) -> StorageResult<Vec<LeaderboardEntry>>;
    async fn channel(&self, channel: &str) -> StorageResult<ChannelView>;
    async fn status(&self) -> StorageResult<Status>;
    async fn search(&self, needle: Option<&str>) -> StorageResult<Vec<String>>;
}

#[async_trait]
pub trait WriteStorage: Send + Sync {
    /// Applies incoming summaries until cancelled.
    async fn record(&self, cancel: CancellationToken) -> StorageResult<()>;
}

#[derive(Clone, Default)]
pub struct Storage {
    live: Option<Arc<dyn LiveStorage>>,
    read: Option<Arc<dyn ReadStorage>>,
    write: Option<Arc<dyn WriteStorage>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live(mut self, live: Arc<dyn LiveStorage>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_read(mut self, read: Arc<dyn ReadStorage>) -> Self {
        self.read = Some(read);
        self
    }

    pub fn with_write(mut self, write: Arc<dyn WriteStorage>) -> Self {
        self.write = Some(write);
        self
    }

    pub fn store(&self, channel: &str, score: u64) -> StorageResult<()> {
        self.live()?.store(channel, score);
        Ok(())
    }

    /// Live levels straight from the aggregator when it runs in this process, through the
    /// snapshot channel otherwise.
    pub async fn cancer(&self) -> StorageResult<Vec<ChannelLevel>> {
        if let Some(live) = &self.live {
            return Ok(live.cancer().await);
        }

        Ok(self.read("cancer")?.cancer().await)
    }

    pub async fn leaderboards(
        &self,
        horizon: &str,
    ) -> StorageResult<BTreeMap<String, Vec<LeaderboardEntry>>> {
        self.read("leaderboards")?.leaderboards(horizon).await
    }

    pub async fn leaderboard(&self, name: &str) -> StorageResult<Vec<LeaderboardEntry>> {
        self.read("leaderboard")?.leaderboard(name).await
    }

    pub async fn channel(&self, channel: &str) -> StorageResult<ChannelView> {
        self.read("channel")?.channel(channel).await
    }

    pub async fn status(&self) -> StorageResult<Status> {
        self.read("status")?.status().await
    }

    pub async fn search(&self, needle: Option<&str>) -> StorageResult<Vec<String>> {
        self.read("search")?.search(needle).await
    }

    pub async fn record(&self, cancel: CancellationToken) -> StorageResult<()> {
        let write = self
            .write
            .as_ref()
            .ok_or(StorageError::Unavailable("record"))?;

        write.record(cancel).await
    }

    fn live(&self) -> StorageResult<&Arc<dyn LiveStorage>> {
        self.live.as_ref().ok_or(StorageError::Unavailable("store"))
    }

    fn read(&self, op: &'static str) -> StorageResult<&Arc<dyn ReadStorage>> {
        self.read.as_ref().ok_or(StorageError::Unavailable(op))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::view::LiveStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLive {
        stored: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl LiveStorage for FakeLive {
        fn store(&self, channel: &str, score: u64) {
            self.stored.lock().unwrap().push((channel.to_string(), score));
        }

        async fn cancer(&self) -> Vec<ChannelLevel> {
            vec![ChannelLevel {
                channel: "#live".into(),
                cancer: 1,
                messages: 1,
            }]
        }
    }

    struct FakeRead;

    #[async_trait]
    impl ReadStorage for FakeRead {
        async fn cancer(&self) -> Vec<ChannelLevel> {
            vec![ChannelLevel {
                channel: "#read".into(),
                cancer: 2,
                messages: 2,
            }]
        }

        async fn leaderboards(
            &self,
            _: &str,
        ) -> StorageResult<BTreeMap<String, Vec<LeaderboardEntry>>> {
            Ok(BTreeMap::new())
        }

        async fn leaderboard(&self, _: &str) -> StorageResult<Vec<LeaderboardEntry>> {
            Ok(Vec::new())
        }

        async fn channel(&self, channel: &str) -> StorageResult<ChannelView> {
            Ok(ChannelView {
                channel: channel.to_string(),
                horizons: BTreeMap::new(),
            })
        }

        async fn status(&self) -> StorageResult<Status> {
            Ok(Status {
                total: BTreeMap::new(),
                live: LiveStatus::default(),
            })
        }

        async fn search(&self, _: Option<&str>) -> StorageResult<Vec<String>> {
            Ok(vec!["#read".into()])
        }
    }

    #[tokio::test]
    async fn test_missing_backends_are_unavailable() {
        let storage = Storage::new();

        assert!(matches!(storage.store("#a", 1), Err(StorageError::Unavailable("store"))));
        assert!(matches!(storage.cancer().await, Err(StorageError::Unavailable("cancer"))));
        assert!(matches!(
            storage.leaderboard("all.cancer.minute").await,
            Err(StorageError::Unavailable("leaderboard"))
        ));
        assert!(matches!(
            storage.record(CancellationToken::new()).await,
            Err(StorageError::Unavailable("record"))
        ));
    }

    #[tokio::test]
    async fn test_cancer_prefers_live_backend() {
        let live = Arc::new(FakeLive::default());
        let storage = Storage::new()
            .with_live(live.clone())
            .with_read(Arc::new(FakeRead));

        storage.store("#a", 3).unwrap();
        assert_eq!(live.stored.lock().unwrap().as_slice(), &[("#a".to_string(), 3)]);
        assert_eq!(storage.cancer().await.unwrap()[0].channel, "#live");

        let read_only = Storage::new().with_read(Arc::new(FakeRead));
        assert_eq!(read_only.cancer().await.unwrap()[0].channel, "#read");
        assert_eq!(read_only.search(Some("r")).await.unwrap(), vec!["#read"]);
        assert!(matches!(read_only.store("#a", 1), Err(StorageError::Unavailable("store"))));
    }
}
