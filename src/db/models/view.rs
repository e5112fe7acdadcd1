use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::catalog::Horizon;
use crate::db::models::StatValue;

/// One row of a ranked leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub channel: String,
    pub date: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub value: StatValue,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBest {
    pub value: StatValue,
    pub date: DateTime<Utc>,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinuteView {
    pub cancer: RankedBest,
    pub messages: RankedBest,
    pub cpm: RankedBest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalView {
    pub cancer: Ranked,
    pub messages: Ranked,
    pub cpm: Ranked,
    /// seconds
    pub duration: Ranked,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageView {
    pub cancer: Ranked,
    pub messages: Ranked,
    pub cpm: Ranked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub minute: MinuteView,
    pub total: TotalView,
    pub average: AverageView,
}

/// A horizon without any record for the channel serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HorizonView {
    Ranked(Box<RecordView>),
    Missing {},
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelView {
    pub channel: String,
    #[serde(flatten)]
    pub horizons: BTreeMap<Horizon, HorizonView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveStatus {
    pub channels: u64,
    pub messages: u64,
    pub cancer: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub total: BTreeMap<Horizon, super::HorizonStatus>,
    pub live: LiveStatus,
}
