//! In-memory buffer of scored chat messages.
//!
//! Producers append with [`LiveAggregator::store`]; readers get the open window through
//! [`LiveAggregator::snapshot`]; the archive timer drains every message older than a full minute
//! into per-channel minute summaries with [`LiveAggregator::archive`].

pub mod cron;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::LIVE_WINDOW;
use crate::util::truncate_minute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub score: u64,
    pub date: DateTime<Utc>,
}

/// Live level of a single channel over the last minute of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLevel {
    pub channel: String,
    pub cancer: u64,
    pub messages: u64,
}

/// Aggregate of one channel over one archived minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteSummary {
    pub channel: String,
    pub date: DateTime<Utc>,
    pub cancer: u64,
    pub messages: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub cancer: u64,
    pub messages: u64,
}

impl Tally {
    fn add(&mut self, score: u64) {
        self.cancer += score;
        self.messages += 1;
    }
}

/// minute -> channel -> tally
pub type Archive = BTreeMap<DateTime<Utc>, BTreeMap<String, Tally>>;

/// Flattens an archive pass into one summary per (minute, channel), oldest minute first.
pub fn summaries(archive: Archive) -> Vec<MinuteSummary> {
    archive
        .into_iter()
        .flat_map(|(date, channels)| {
            channels
                .into_iter()
                .map(move |(channel, tally)| MinuteSummary {
                    channel,
                    date,
                    cancer: tally.cancer,
                    messages: tally.messages,
                })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct LiveAggregator {
    messages: Mutex<VecDeque<Message>>,
}

impl LiveAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, channel: &str, score: u64) {
        self.store_at(channel, score, Utc::now());
    }

    pub fn store_at(&self, channel: &str, score: u64, date: DateTime<Utc>) {
        let message = Message {
            channel: channel.to_string(),
            score,
            date,
        };

        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message);
    }

    pub fn snapshot(&self) -> Vec<ChannelLevel> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<ChannelLevel> {
        let breakpoint = now - LIVE_WINDOW;
        let mut levels: BTreeMap<&str, Tally> = BTreeMap::new();

        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());

        // newest messages sit at the back
        for message in messages.iter().rev() {
            if message.date < breakpoint {
                break;
            }

            levels
                .entry(message.channel.as_str())
                .or_default()
                .add(message.score);
        }

        levels
            .into_iter()
            .map(|(channel, tally)| ChannelLevel {
                channel: channel.to_string(),
                cancer: tally.cancer,
                messages: tally.messages,
            })
            .collect()
    }

    pub fn archive(&self) -> Archive {
        self.archive_at(Utc::now())
    }

    /// Removes every message whose minute ended more than [`LIVE_WINDOW`] before `now`.
    ///
    /// Run at 12:31:20, the breakpoint is 12:30:00: messages up to 12:29:59 are archived and
    /// anything from 12:30 onwards stays buffered.
    pub fn archive_at(&self, now: DateTime<Utc>) -> Archive {
        let breakpoint = truncate_minute(now - LIVE_WINDOW);
        let mut archive = Archive::new();
        let mut archived = 0usize;

        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(message) = messages.pop_front() {
            let minute = truncate_minute(message.date);

            if minute >= breakpoint {
                messages.push_front(message);
                break;
            }

            archive
                .entry(minute)
                .or_default()
                .entry(message.channel)
                .or_default()
                .add(message.score);

            archived += 1;
        }

        tracing::debug!(
            archived,
            remaining = messages.len(),
            %breakpoint,
            "archived live messages"
        );

        archive
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_snapshot_only_counts_last_minute() {
        let live = LiveAggregator::new();
        let now = at(12, 31, 20);

        live.store_at("#forsen", 100, now - TimeDelta::seconds(61));
        live.store_at("#forsen", 3, now - TimeDelta::seconds(59));
        live.store_at("#forsen", 2, now - TimeDelta::seconds(10));
        live.store_at("#lirik", 0, now - TimeDelta::seconds(1));

        let snapshot = live.snapshot_at(now);
        assert_eq!(
            snapshot,
            vec![
                ChannelLevel {
                    channel: "#forsen".into(),
                    cancer: 5,
                    messages: 2,
                },
                ChannelLevel {
                    channel: "#lirik".into(),
                    cancer: 0,
                    messages: 1,
                },
            ]
        );

        // snapshot never removes anything
        assert_eq!(live.len(), 4);
    }

    #[test]
    fn test_snapshot_empty() {
        let live = LiveAggregator::new();
        assert!(live.snapshot_at(at(0, 0, 0)).is_empty());
    }

    #[test]
    fn test_archive_groups_by_minute_and_channel() {
        let live = LiveAggregator::new();

        live.store_at("#forsen", 1, at(12, 28, 5));
        live.store_at("#lirik", 4, at(12, 28, 30));
        live.store_at("#forsen", 2, at(12, 28, 59));
        live.store_at("#forsen", 7, at(12, 29, 59));
        // too new at 12:31:20
        live.store_at("#forsen", 9, at(12, 30, 0));
        live.store_at("#lirik", 9, at(12, 31, 10));

        let archive = live.archive_at(at(12, 31, 20));

        assert_eq!(archive.len(), 2);
        assert_eq!(
            archive[&at(12, 28, 0)]["#forsen"],
            Tally {
                cancer: 3,
                messages: 2
            }
        );
        assert_eq!(
            archive[&at(12, 28, 0)]["#lirik"],
            Tally {
                cancer: 4,
                messages: 1
            }
        );
        assert_eq!(
            archive[&at(12, 29, 0)]["#forsen"],
            Tally {
                cancer: 7,
                messages: 1
            }
        );

        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_archive_twice_never_double_counts() {
        let live = LiveAggregator::new();

        live.store_at("#forsen", 1, at(12, 28, 5));
        live.store_at("#forsen", 1, at(12, 30, 5));

        let first = live.archive_at(at(12, 31, 20));
        let second = live.archive_at(at(12, 31, 20));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(live.len(), 1);

        // a minute later the remaining message is old enough
        let third = live.archive_at(at(12, 32, 20));
        assert_eq!(
            third[&at(12, 30, 0)]["#forsen"],
            Tally {
                cancer: 1,
                messages: 1
            }
        );
        assert!(live.is_empty());
    }

    #[test]
    fn test_summaries_flatten_in_order() {
        let live = LiveAggregator::new();

        live.store_at("#b", 2, at(10, 1, 0));
        live.store_at("#a", 1, at(10, 1, 30));
        live.store_at("#a", 5, at(10, 0, 30));

        let summaries = summaries(live.archive_at(at(10, 5, 0)));

        let keys: Vec<_> = summaries
            .iter()
            .map(|s| (s.date, s.channel.as_str(), s.cancer))
            .collect();
        assert_eq!(
            keys,
            vec![
                (at(10, 0, 0), "#a", 5),
                (at(10, 1, 0), "#a", 1),
                (at(10, 1, 0), "#b", 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_store() {
        let live = std::sync::Arc::new(LiveAggregator::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let live = live.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        live.store(&format!("#chan{i}"), 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let total: u64 = live.snapshot().iter().map(|c| c.messages).sum();
        assert_eq!(total, 800);
    }
}
