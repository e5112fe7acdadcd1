use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::db::catalog::{Horizon, Interval, Leaderboard, Metric};
use crate::live::MinuteSummary;

pub mod view;

/// Statistics of one channel over one horizon period.
///
/// `minute_*` hold the best single minute, `total_*` the running sums since `total_since`, and
/// `average_*` the running mean over `average_duration` applied minutes.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LeaderboardRecord {
    pub channel: String,

    pub minute_cancer: i64,
    pub minute_cancer_date: DateTime<Utc>,
    pub minute_messages: i64,
    pub minute_messages_date: DateTime<Utc>,
    pub minute_cpm: f64,
    pub minute_cpm_date: DateTime<Utc>,

    pub total_since: DateTime<Utc>,
    pub total_cancer: i64,
    pub total_messages: i64,
    pub total_cpm: f64,

    pub average_duration: i64,
    pub average_cancer: f64,
    pub average_messages: f64,
    pub average_cpm: f64,
}

impl LeaderboardRecord {
    /// First record of a channel in a period. All-time totals start at the summary's minute; the
    /// bounded horizons count from the start of their period.
    pub fn seed(horizon: Horizon, period_start: DateTime<Utc>, summary: &MinuteSummary) -> Self {
        let cancer = to_i64(summary.cancer);
        let messages = to_i64(summary.messages);
        let cpm = cpm(cancer, messages);
        let date = summary.date;

        let total_since = match horizon {
            Horizon::All => date,
            Horizon::Monthly | Horizon::Daily => period_start,
        };

        Self {
            channel: summary.channel.clone(),
            minute_cancer: cancer,
            minute_cancer_date: date,
            minute_messages: messages,
            minute_messages_date: date,
            minute_cpm: cpm,
            minute_cpm_date: date,
            total_since,
            total_cancer: cancer,
            total_messages: messages,
            total_cpm: cpm,
            average_duration: 1,
            average_cancer: cancer as f64,
            average_messages: messages as f64,
            average_cpm: cpm,
        }
    }

    /// Folds another minute into the record.
    pub fn apply(&mut self, summary: &MinuteSummary) {
        let cancer = to_i64(summary.cancer);
        let messages = to_i64(summary.messages);
        let minute_cpm = cpm(cancer, messages);
        let date = summary.date;

        self.total_cancer += cancer;
        self.total_messages += messages;
        self.total_cpm = cpm(self.total_cancer, self.total_messages);

        self.average_duration += 1;
        let n = self.average_duration as f64;
        self.average_cancer += (cancer as f64 - self.average_cancer) / n;
        self.average_messages += (messages as f64 - self.average_messages) / n;
        // mean of the per-minute ratios, not the ratio of the means
        self.average_cpm += (minute_cpm - self.average_cpm) / n;

        if cancer > self.minute_cancer {
            self.minute_cancer = cancer;
            self.minute_cancer_date = date;
        }

        if messages > self.minute_messages {
            self.minute_messages = messages;
            self.minute_messages_date = date;
        }

        if minute_cpm > self.minute_cpm {
            self.minute_cpm = minute_cpm;
            self.minute_cpm_date = date;
        }
    }

    pub fn value(&self, field: Field) -> StatValue {
        match field {
            Field::Minute(Metric::Cancer) => StatValue::Int(self.minute_cancer),
            Field::Minute(Metric::Messages) => StatValue::Int(self.minute_messages),
            Field::Minute(Metric::Cpm) => StatValue::Float(self.minute_cpm),

            Field::Total(Metric::Cancer) => StatValue::Int(self.total_cancer),
            Field::Total(Metric::Messages) => StatValue::Int(self.total_messages),
            Field::Total(Metric::Cpm) => StatValue::Float(self.total_cpm),

            // a single-minute average is that minute's integer count
            Field::Average(Metric::Cancer) if self.average_duration == 1 => {
                StatValue::Int(self.total_cancer)
            }
            Field::Average(Metric::Messages) if self.average_duration == 1 => {
                StatValue::Int(self.total_messages)
            }
            Field::Average(Metric::Cancer) => StatValue::Float(self.average_cancer),
            Field::Average(Metric::Messages) => StatValue::Float(self.average_messages),
            Field::Average(Metric::Cpm) => StatValue::Float(self.average_cpm),

            Field::Duration => StatValue::Int(self.average_duration),
        }
    }

    /// Date shown next to a leaderboard entry: when the best minute happened, or when counting
    /// started for sums and averages.
    pub fn date(&self, field: Field) -> DateTime<Utc> {
        match field {
            Field::Minute(Metric::Cancer) => self.minute_cancer_date,
            Field::Minute(Metric::Messages) => self.minute_messages_date,
            Field::Minute(Metric::Cpm) => self.minute_cpm_date,
            Field::Total(_) | Field::Average(_) | Field::Duration => self.total_since,
        }
    }
}

/// A rankable column of [`LeaderboardRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Minute(Metric),
    Total(Metric),
    Average(Metric),
    Duration,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::Minute(Metric::Cancer) => "minute_cancer",
            Field::Minute(Metric::Messages) => "minute_messages",
            Field::Minute(Metric::Cpm) => "minute_cpm",
            Field::Total(Metric::Cancer) => "total_cancer",
            Field::Total(Metric::Messages) => "total_messages",
            Field::Total(Metric::Cpm) => "total_cpm",
            Field::Average(Metric::Cancer) => "average_cancer",
            Field::Average(Metric::Messages) => "average_messages",
            Field::Average(Metric::Cpm) => "average_cpm",
            Field::Duration => "average_duration",
        }
    }
}

impl From<Leaderboard> for Field {
    fn from(leaderboard: Leaderboard) -> Self {
        match leaderboard.interval {
            Interval::Minute => Field::Minute(leaderboard.metric),
            Interval::Total => Field::Total(leaderboard.metric),
            Interval::Average => Field::Average(leaderboard.metric),
        }
    }
}

/// Counts print as integers, ratios and means keep their fractional part (`"45.0"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Int(i64),
    Float(f64),
}

impl StatValue {
    pub fn as_f64(self) -> f64 {
        match self {
            StatValue::Int(v) => v as f64,
            StatValue::Float(v) => v,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(v) => write!(f, "{v}"),
            // Debug keeps a trailing ".0" and the shortest round-trip digits
            StatValue::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl Serialize for StatValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatValue::Int(v) => serializer.serialize_i64(*v),
            StatValue::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct HorizonStatus {
    pub channels: i64,
    pub messages: i64,
    pub cancer: i64,
}

fn cpm(cancer: i64, messages: i64) -> f64 {
    if messages == 0 {
        return 0.0;
    }

    cancer as f64 / messages as f64
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
