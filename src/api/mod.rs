//! Websocket pub/sub API served by the `expose` role.
//!
//! Clients subscribe to topic names (`twitchcancer.live`, `twitchcancer.channel.<name>`, ...) and
//! receive `{"topic", "data"}` frames whenever the topic is republished. One-shot requests such
//! as channel search are answered on the same socket.

use thiserror::Error;

use crate::api::topic::{Topic, TopicError, TopicResult};
use crate::constants::{
    HISTORY_REFRESH, LIVE_REFRESH, TOPIC_CHANNEL, TOPIC_LEADERBOARD, TOPIC_LEADERBOARDS,
    TOPIC_LIVE, TOPIC_STATUS,
};
use crate::storage::Storage;

pub mod hub;
pub mod protocol;
pub mod request;
pub mod server;
pub mod topic;

pub type ApiResult<T> = core::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Every topic the API publishes, backed by `storage`.
pub fn topics(storage: &Storage) -> TopicResult<Vec<Topic>> {
    let s = storage.clone();
    let live = Topic::fixed(TOPIC_LIVE, LIVE_REFRESH, move || {
        let s = s.clone();
        async move { Ok::<_, TopicError>(serde_json::to_value(s.cancer().await?)?) }
    });

    let s = storage.clone();
    let leaderboards = Topic::wildcard(TOPIC_LEADERBOARDS, HISTORY_REFRESH, move |horizon| {
        let s = s.clone();
        async move {
            Ok::<_, TopicError>(serde_json::to_value(s.leaderboards(&horizon).await?)?)
        }
    })?;

    let s = storage.clone();
    let leaderboard = Topic::wildcard(TOPIC_LEADERBOARD, HISTORY_REFRESH, move |name| {
        let s = s.clone();
        async move {
            Ok::<_, TopicError>(serde_json::to_value(s.leaderboard(&name).await?)?)
        }
    })?;

    let s = storage.clone();
    let status = Topic::fixed(TOPIC_STATUS, HISTORY_REFRESH, move || {
        let s = s.clone();
        async move { Ok::<_, TopicError>(serde_json::to_value(s.status().await?)?) }
    });

    let s = storage.clone();
    let channel = Topic::wildcard(TOPIC_CHANNEL, HISTORY_REFRESH, move |channel| {
        let s = s.clone();
        async move {
            Ok::<_, TopicError>(serde_json::to_value(s.channel(&channel).await?)?)
        }
    })?;

    Ok(vec![live, leaderboards, leaderboard, status, channel])
}
