//! Every leaderboard the store can rank, named `"<horizon>.<metric>.<interval>"`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Daily,
    Monthly,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cancer,
    Messages,
    Cpm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Total,
    Average,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Daily, Horizon::Monthly, Horizon::All];

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::Daily => "daily",
            Horizon::Monthly => "monthly",
            Horizon::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.as_str() == value)
    }

    /// First instant of the horizon containing `now`; `None` when unbounded.
    pub fn start_date(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Horizon::All => None,
            Horizon::Monthly => Some(start_of_month(now)),
            Horizon::Daily => Some(start_of_day(now)),
        }
    }

    /// Key under which records of the current period are persisted. The all-time horizon has a
    /// single period starting at the unix epoch.
    pub fn period_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_date(now).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Whether a minute belongs to the period of this horizon that contains `now`.
    pub fn contains(self, now: DateTime<Utc>, date: DateTime<Utc>) -> bool {
        match self {
            Horizon::All => true,
            Horizon::Monthly => start_of_month(date) == start_of_month(now),
            Horizon::Daily => start_of_day(date) == start_of_day(now),
        }
    }
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cancer, Metric::Messages, Metric::Cpm];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cancer => "cancer",
            Metric::Messages => "messages",
            Metric::Cpm => "cpm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Minute, Interval::Total, Interval::Average];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::Total => "total",
            Interval::Average => "average",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Leaderboard {
    pub horizon: Horizon,
    pub metric: Metric,
    pub interval: Interval,
}

impl Leaderboard {
    /// Returns `None` for the one combination that is never ranked: an average of cpm.
    pub fn new(horizon: Horizon, metric: Metric, interval: Interval) -> Option<Self> {
        if metric == Metric::Cpm && interval == Interval::Average {
            return None;
        }

        Some(Self {
            horizon,
            metric,
            interval,
        })
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    /// First instant ranked by this leaderboard; `None` for all-time boards.
    pub fn start_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.horizon.start_date(now)
    }
}

impl fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.horizon.as_str(),
            self.metric.as_str(),
            self.interval.as_str()
        )
    }
}

/// Cartesian product of the three axes. An unset axis spans its whole domain; an unknown value
/// empties the result.
pub fn build(
    horizon: Option<&str>,
    metric: Option<&str>,
    interval: Option<&str>,
) -> BTreeSet<Leaderboard> {
    let horizons = axis(horizon, &Horizon::ALL, Horizon::parse);
    let metrics = axis(metric, &Metric::ALL, Metric::parse);
    let intervals = axis(interval, &Interval::ALL, Interval::parse);

    let mut result = BTreeSet::new();

    for &h in &horizons {
        for &m in &metrics {
            for &i in &intervals {
                if let Some(leaderboard) = Leaderboard::new(h, m, i) {
                    result.insert(leaderboard);
                }
            }
        }
    }

    result
}

pub fn from_name(name: &str) -> Option<Leaderboard> {
    let mut parts = name.split('.');

    let (Some(h), Some(m), Some(i), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    Leaderboard::new(Horizon::parse(h)?, Metric::parse(m)?, Interval::parse(i)?)
}

pub fn is_valid(name: &str) -> bool {
    from_name(name).is_some()
}

fn axis<T: Copy>(value: Option<&str>, domain: &[T], parse: fn(&str) -> Option<T>) -> Vec<T> {
    match value {
        None => domain.to_vec(),
        Some(value) => parse(value).into_iter().collect(),
    }
}

fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn start_of_month(date: DateTime<Utc>) -> DateTime<Utc> {
    let day = date.date_naive();
    day.with_day(1)
        .unwrap_or(day)
        .and_time(NaiveTime::MIN)
        .and_utc()
}
