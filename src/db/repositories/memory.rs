use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::DbResult;
use crate::db::catalog::Horizon;
use crate::db::models::{Field, HorizonStatus, LeaderboardRecord};
use crate::db::repositories::LeaderboardRepository;

type Key = (Horizon, DateTime<Utc>, String);

/// Process-local repository, for tests and runs without a database.
#[derive(Debug, Default)]
pub struct MemoryLeaderboardRepository {
    records: Mutex<HashMap<Key, LeaderboardRecord>>,
}

impl MemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn period(&self, horizon: Horizon, period_start: DateTime<Utc>) -> Vec<LeaderboardRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((h, p, _), _)| *h == horizon && *p == period_start)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl LeaderboardRepository for MemoryLeaderboardRepository {
    async fn find(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        channel: &str,
    ) -> DbResult<Option<LeaderboardRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(horizon, period_start, channel.to_string()))
            .cloned())
    }

    async fn upsert(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        record: &LeaderboardRecord,
    ) -> DbResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((horizon, period_start, record.channel.clone()), record.clone());

        Ok(())
    }

    async fn top(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        limit: usize,
    ) -> DbResult<Vec<LeaderboardRecord>> {
        let mut records = self.period(horizon, period_start);

        records.sort_by(|a, b| {
            b.value(field)
                .as_f64()
                .total_cmp(&a.value(field).as_f64())
                .then_with(|| a.channel.cmp(&b.channel))
        });
        records.truncate(limit);

        Ok(records)
    }

    async fn rank(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        value: f64,
    ) -> DbResult<i64> {
        let count = self
            .period(horizon, period_start)
            .iter()
            .filter(|record| record.value(field).as_f64() >= value)
            .count();

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn status(&self, horizon: Horizon, period_start: DateTime<Utc>) -> DbResult<HorizonStatus> {
        Ok(self
            .period(horizon, period_start)
            .iter()
            .fold(HorizonStatus::default(), |mut status, record| {
                status.channels += 1;
                status.messages += record.total_messages;
                status.cancer += record.total_cancer;
                status
            }))
    }

    async fn search(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        needle: &str,
    ) -> DbResult<Vec<String>> {
        let needle = needle.to_lowercase();

        let mut channels: Vec<String> = self
            .period(horizon, period_start)
            .into_iter()
            .map(|record| record.channel)
            .filter(|channel| channel.to_lowercase().contains(&needle))
            .collect();
        channels.sort();

        Ok(channels)
    }
}
