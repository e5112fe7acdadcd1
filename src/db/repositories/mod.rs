use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::DbResult;
use crate::db::catalog::Horizon;
use crate::db::models::{Field, HorizonStatus, LeaderboardRecord};

pub mod leaderboard;
pub mod memory;

/// Persistence of [`LeaderboardRecord`]s keyed by `(horizon, period_start, channel)`.
///
/// Queries that rank or aggregate only ever see the records of a single horizon period.
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    async fn find(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        channel: &str,
    ) -> DbResult<Option<LeaderboardRecord>>;

    /// Inserts the record, replacing any record under the same key.
    async fn upsert(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        record: &LeaderboardRecord,
    ) -> DbResult<()>;

    /// Best `limit` records by `field`, descending; ties ordered by channel name.
    async fn top(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        limit: usize,
    ) -> DbResult<Vec<LeaderboardRecord>>;

    /// Number of records whose `field` is at least `value`.
    async fn rank(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        value: f64,
    ) -> DbResult<i64>;

    async fn status(&self, horizon: Horizon, period_start: DateTime<Utc>) -> DbResult<HorizonStatus>;

    /// Case-insensitive substring search over channel names of a period, sorted by name.
    async fn search(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        needle: &str,
    ) -> DbResult<Vec<String>>;
}

pub mod sql_fragment {
    pub const TABLE_NAME: &str = "leaderboard";

    pub const RECORD_FIELDS: &str = r#"
        channel,
        minute_cancer,
        minute_cancer_date,
        minute_messages,
        minute_messages_date,
        minute_cpm,
        minute_cpm_date,
        total_since,
        total_cancer,
        total_messages,
        total_cpm,
        average_duration,
        average_cancer,
        average_messages,
        average_cpm
    "#;
}
