use serde_json::{Value, json};

use crate::constants::REQUEST_SEARCH;
use crate::storage::Storage;

/// Answers a one-shot request. Unknown requests and failures both yield `{}`.
pub async fn handle(storage: &Storage, request: &str, data: &Value) -> Value {
    match request {
        REQUEST_SEARCH => {
            let Some(needle) = data.as_str() else {
                tracing::warn!(%request, %data, "malformed request");
                return json!({});
            };

            match storage.search(Some(needle)).await {
                Ok(channels) => json!(channels),
                Err(e) => {
                    tracing::error!(%request, error = %e, "request failed");
                    json!({})
                }
            }
        }
        _ => {
            tracing::debug!(%request, "unknown request");
            json!({})
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::db::repositories::memory::MemoryLeaderboardRepository;
    use crate::db::store::LeaderboardStore;
    use crate::live::MinuteSummary;
    use crate::storage::read::ReadOnlyStorage;
    use crate::transport::snapshot::SnapshotClient;

    async fn storage() -> Storage {
        let store = LeaderboardStore::new(MemoryLeaderboardRepository::new());
        for channel in ["#forsen", "#forsenlol", "#lirik"] {
            store
                .update_leaderboard(&MinuteSummary {
                    channel: channel.into(),
                    date: Utc::now(),
                    cancer: 1,
                    messages: 1,
                })
                .await
                .unwrap();
        }

        let read = ReadOnlyStorage::new(SnapshotClient::new("127.0.0.1:1"), store);
        Storage::new().with_read(Arc::new(read))
    }

    #[tokio::test]
    async fn test_search_request() {
        let storage = storage().await;

        let mut found: Vec<String> =
            serde_json::from_value(handle(&storage, REQUEST_SEARCH, &json!("forsen")).await)
                .unwrap();
        found.sort();

        assert_eq!(found, vec!["#forsen", "#forsenlol"]);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_requests() {
        let storage = storage().await;

        assert_eq!(handle(&storage, REQUEST_SEARCH, &Value::Null).await, json!({}));
        assert_eq!(handle(&storage, REQUEST_SEARCH, &json!(3)).await, json!({}));
        assert_eq!(
            handle(&storage, "twitchcancer.unknown", &json!("forsen")).await,
            json!({})
        );
        assert_eq!(
            handle(&Storage::new(), REQUEST_SEARCH, &json!("forsen")).await,
            json!({})
        );
    }
}
