use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::DbResult;
use crate::db::catalog::Horizon;
use crate::db::models::{Field, HorizonStatus, LeaderboardRecord};
use crate::db::repositories::LeaderboardRepository;
use crate::db::repositories::sql_fragment::{RECORD_FIELDS, TABLE_NAME};

#[derive(Clone)]
pub struct PgLeaderboardRepository {
    pool: PgPool,
}

impl PgLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardRepository for PgLeaderboardRepository {
    #[instrument(skip(self))]
    async fn find(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        channel: &str,
    ) -> DbResult<Option<LeaderboardRecord>> {
        Ok(sqlx::query_as::<_, LeaderboardRecord>(&format!(
            "SELECT {RECORD_FIELDS} FROM {TABLE_NAME} \
             WHERE horizon = $1 AND period_start = $2 AND channel = $3"
        ))
        .bind(horizon.as_str())
        .bind(period_start)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self, record), fields(channel = %record.channel))]
    async fn upsert(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        record: &LeaderboardRecord,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard (
                horizon,
                period_start,
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
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (horizon, period_start, channel)
            DO UPDATE SET
                minute_cancer = EXCLUDED.minute_cancer,
                minute_cancer_date = EXCLUDED.minute_cancer_date,
                minute_messages = EXCLUDED.minute_messages,
                minute_messages_date = EXCLUDED.minute_messages_date,
                minute_cpm = EXCLUDED.minute_cpm,
                minute_cpm_date = EXCLUDED.minute_cpm_date,
                total_since = EXCLUDED.total_since,
                total_cancer = EXCLUDED.total_cancer,
                total_messages = EXCLUDED.total_messages,
                total_cpm = EXCLUDED.total_cpm,
                average_duration = EXCLUDED.average_duration,
                average_cancer = EXCLUDED.average_cancer,
                average_messages = EXCLUDED.average_messages,
                average_cpm = EXCLUDED.average_cpm
            "#,
        )
        .bind(horizon.as_str())
        .bind(period_start)
        .bind(&record.channel)
        .bind(record.minute_cancer)
        .bind(record.minute_cancer_date)
        .bind(record.minute_messages)
        .bind(record.minute_messages_date)
        .bind(record.minute_cpm)
        .bind(record.minute_cpm_date)
        .bind(record.total_since)
        .bind(record.total_cancer)
        .bind(record.total_messages)
        .bind(record.total_cpm)
        .bind(record.average_duration)
        .bind(record.average_cancer)
        .bind(record.average_messages)
        .bind(record.average_cpm)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn top(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        limit: usize,
    ) -> DbResult<Vec<LeaderboardRecord>> {
        // column names come from `Field`, never from user input
        let column = field.column();

        Ok(sqlx::query_as::<_, LeaderboardRecord>(&format!(
            "SELECT {RECORD_FIELDS} FROM {TABLE_NAME} \
             WHERE horizon = $1 AND period_start = $2 \
             ORDER BY {column} DESC, channel ASC \
             LIMIT $3"
        ))
        .bind(horizon.as_str())
        .bind(period_start)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn rank(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        field: Field,
        value: f64,
    ) -> DbResult<i64> {
        let column = field.column();

        Ok(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {TABLE_NAME} \
             WHERE horizon = $1 AND period_start = $2 \
             AND {column}::DOUBLE PRECISION >= $3"
        ))
        .bind(horizon.as_str())
        .bind(period_start)
        .bind(value)
        .fetch_one(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn status(&self, horizon: Horizon, period_start: DateTime<Utc>) -> DbResult<HorizonStatus> {
        Ok(sqlx::query_as::<_, HorizonStatus>(&format!(
            "SELECT \
                COUNT(*) AS channels, \
                COALESCE(SUM(total_messages), 0)::BIGINT AS messages, \
                COALESCE(SUM(total_cancer), 0)::BIGINT AS cancer \
             FROM {TABLE_NAME} \
             WHERE horizon = $1 AND period_start = $2"
        ))
        .bind(horizon.as_str())
        .bind(period_start)
        .fetch_one(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        horizon: Horizon,
        period_start: DateTime<Utc>,
        needle: &str,
    ) -> DbResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(&format!(
            "SELECT channel FROM {TABLE_NAME} \
             WHERE horizon = $1 AND period_start = $2 AND channel ILIKE $3 ESCAPE '\\' \
             ORDER BY channel ASC"
        ))
        .bind(horizon.as_str())
        .bind(period_start)
        .bind(like_pattern(needle))
        .fetch_all(&self.pool)
        .await?)
    }
}

/// Wraps `needle` for a substring `LIKE`, escaping its wildcards.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');

    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }

    pattern.push('%');
    pattern
}
