use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::constants::DEFAULT_LEADERBOARD_LIMIT;
use crate::db::DbResult;
use crate::db::catalog::{self, Horizon, Metric};
use crate::db::models::view::{
    AverageView, ChannelView, HorizonView, LeaderboardEntry, MinuteView, Ranked, RankedBest,
    RecordView, TotalView,
};
use crate::db::models::{Field, HorizonStatus, LeaderboardRecord, StatValue};
use crate::db::repositories::LeaderboardRepository;
use crate::live::MinuteSummary;

pub type Clock = fn() -> DateTime<Utc>;

/// Ranked per-channel statistics over the all-time, monthly and daily horizons.
///
/// Updates are read-modify-write: a single recorder process is expected to apply summaries.
pub struct LeaderboardStore<R> {
    repo: R,
    clock: Clock,
}

impl<R: LeaderboardRepository> LeaderboardStore<R> {
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, Utc::now)
    }

    pub fn with_clock(repo: R, clock: Clock) -> Self {
        Self { repo, clock }
    }

    #[instrument(skip(self, summary), fields(channel = %summary.channel, date = %summary.date))]
    pub async fn update_leaderboard(&self, summary: &MinuteSummary) -> DbResult<()> {
        let now = (self.clock)();

        for horizon in Horizon::ALL {
            if !horizon.contains(now, summary.date) {
                continue;
            }

            let period_start = horizon.period_start(now);

            let record = match self
                .repo
                .find(horizon, period_start, &summary.channel)
                .await?
            {
                Some(mut record) => {
                    record.apply(summary);
                    record
                }
                None => {
                    tracing::debug!(horizon = horizon.as_str(), "inserting new leaderboard record");
                    LeaderboardRecord::seed(horizon, period_start, summary)
                }
            };

            self.repo.upsert(horizon, period_start, &record).await?;
        }

        Ok(())
    }

    /// Top entries of a leaderboard by name; an unknown name is an empty leaderboard.
    pub async fn leaderboard(&self, name: &str) -> DbResult<Vec<LeaderboardEntry>> {
        self.leaderboard_limit(name, DEFAULT_LEADERBOARD_LIMIT).await
    }

    pub async fn leaderboard_limit(
        &self,
        name: &str,
        limit: usize,
    ) -> DbResult<Vec<LeaderboardEntry>> {
        let Some(leaderboard) = catalog::from_name(name) else {
            return Ok(Vec::new());
        };

        let field = Field::from(leaderboard);
        let period_start = leaderboard
            .start_date((self.clock)())
            .unwrap_or(DateTime::UNIX_EPOCH);

        let records = self
            .repo
            .top(leaderboard.horizon, period_start, field, limit)
            .await?;

        Ok(records
            .into_iter()
            .map(|record| LeaderboardEntry {
                date: record.date(field),
                value: record.value(field).to_string(),
                channel: record.channel,
            })
            .collect())
    }

    /// Every leaderboard of a horizon, by name.
    pub async fn leaderboards(
        &self,
        horizon: &str,
    ) -> DbResult<BTreeMap<String, Vec<LeaderboardEntry>>> {
        let mut result = BTreeMap::new();

        for leaderboard in catalog::build(Some(horizon), None, None) {
            let name = leaderboard.name();
            let entries = self.leaderboard(&name).await?;
            result.insert(name, entries);
        }

        Ok(result)
    }

    /// How many channels of the horizon's current period are at least as good as `value`.
    pub async fn rank(&self, horizon: Horizon, field: Field, value: StatValue) -> DbResult<i64> {
        let period_start = horizon.period_start((self.clock)());
        self.repo
            .rank(horizon, period_start, field, value.as_f64())
            .await
    }

    #[instrument(skip(self))]
    pub async fn channel(&self, channel: &str) -> DbResult<ChannelView> {
        let now = (self.clock)();
        let mut horizons = BTreeMap::new();

        for horizon in Horizon::ALL {
            let period_start = horizon.period_start(now);

            let view = match self.repo.find(horizon, period_start, channel).await? {
                Some(record) => HorizonView::Ranked(Box::new(self.ranked(horizon, &record).await?)),
                None => HorizonView::Missing {},
            };

            horizons.insert(horizon, view);
        }

        Ok(ChannelView {
            channel: channel.to_string(),
            horizons,
        })
    }

    async fn ranked(&self, horizon: Horizon, record: &LeaderboardRecord) -> DbResult<RecordView> {
        let best = |metric| async move {
            let field = Field::Minute(metric);
            let value = record.value(field);

            DbResult::Ok(RankedBest {
                value,
                date: record.date(field),
                rank: self.rank(horizon, field, value).await?,
            })
        };

        let ranked = |field| async move {
            let value = record.value(field);

            DbResult::Ok(Ranked {
                value,
                rank: self.rank(horizon, field, value).await?,
            })
        };

        let duration = ranked(Field::Duration).await?;

        Ok(RecordView {
            minute: MinuteView {
                cancer: best(Metric::Cancer).await?,
                messages: best(Metric::Messages).await?,
                cpm: best(Metric::Cpm).await?,
            },
            total: TotalView {
                cancer: ranked(Field::Total(Metric::Cancer)).await?,
                messages: ranked(Field::Total(Metric::Messages)).await?,
                cpm: ranked(Field::Total(Metric::Cpm)).await?,
                // reported in seconds
                duration: Ranked {
                    value: StatValue::Int(record.average_duration * 60),
                    rank: duration.rank,
                },
                since: record.total_since,
            },
            average: AverageView {
                cancer: ranked(Field::Average(Metric::Cancer)).await?,
                messages: ranked(Field::Average(Metric::Messages)).await?,
                cpm: ranked(Field::Average(Metric::Cpm)).await?,
            },
        })
    }

    pub async fn status(&self) -> DbResult<BTreeMap<Horizon, HorizonStatus>> {
        let now = (self.clock)();
        let mut result = BTreeMap::new();

        for horizon in Horizon::ALL {
            let status = self.repo.status(horizon, horizon.period_start(now)).await?;
            result.insert(horizon, status);
        }

        Ok(result)
    }

    /// Channels whose name contains `needle`, ignoring case. Nothing is searched for an empty or
    /// missing needle.
    pub async fn search(&self, needle: Option<&str>) -> DbResult<Vec<String>> {
        let Some(needle) = needle.filter(|n| !n.is_empty()) else {
            return Ok(Vec::new());
        };

        self.repo
            .search(Horizon::All, DateTime::UNIX_EPOCH, needle)
            .await
    }
}
