pub mod env;
pub mod telemetry;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Truncates a timestamp to the start of its minute.
pub fn truncate_minute(date: DateTime<Utc>) -> DateTime<Utc> {
    date.duration_trunc(TimeDelta::minutes(1)).unwrap_or(date)
}
