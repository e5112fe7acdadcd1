use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::constants::PAYLOAD_CACHE_TTL;
use crate::storage::StorageError;

pub type TopicResult<T> = core::result::Result<T, TopicError>;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("invalid topic pattern '{0}': expected a non-empty prefix followed by '.*'")]
    InvalidPattern(String),

    #[error("'{name}' does not belong to topic '{topic}'")]
    NoMatch { topic: String, name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type FixedProducer = Arc<dyn Fn() -> BoxFuture<'static, TopicResult<Value>> + Send + Sync>;
type WildcardProducer =
    Arc<dyn Fn(String) -> BoxFuture<'static, TopicResult<Value>> + Send + Sync>;

enum Producer {
    Fixed(FixedProducer),
    Wildcard { prefix: String, produce: WildcardProducer },
}

/// A named view over storage, recomputed every `refresh`.
///
/// Payloads are cached per concrete name for [`PAYLOAD_CACHE_TTL`] so that a new subscriber can
/// be answered without hitting storage again.
pub struct Topic {
    name: String,
    refresh: Duration,
    producer: Producer,
    cache: Mutex<HashMap<String, (Instant, Arc<Value>)>>,
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl Topic {
    pub fn fixed<F, Fut>(name: &str, refresh: Duration, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TopicResult<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            refresh,
            producer: Producer::Fixed(Arc::new(move || producer().boxed())),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `pattern` must look like `"some.prefix.*"`; the part of a concrete name after the prefix
    /// is handed to `producer`.
    pub fn wildcard<F, Fut>(pattern: &str, refresh: Duration, producer: F) -> TopicResult<Self>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TopicResult<Value>> + Send + 'static,
    {
        let prefix = pattern
            .strip_suffix('*')
            .filter(|p| p.len() > 1 && p.ends_with('.') && !p.contains('*'))
            .ok_or_else(|| TopicError::InvalidPattern(pattern.to_string()))?;

        Ok(Self {
            name: pattern.to_string(),
            refresh,
            producer: Producer::Wildcard {
                prefix: prefix.to_string(),
                produce: Arc::new(move |arg| producer(arg).boxed()),
            },
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    pub fn matches(&self, name: &str) -> bool {
        self.argument(name).is_some()
    }

    /// Variable part of `name`; empty for a plain topic's own name.
    fn argument<'a>(&self, name: &'a str) -> Option<&'a str> {
        match &self.producer {
            Producer::Fixed(_) => (name == self.name).then_some(""),
            Producer::Wildcard { prefix, .. } => {
                name.strip_prefix(prefix.as_str()).filter(|arg| !arg.is_empty())
            }
        }
    }

    /// Data for the concrete `name`, from cache when allowed and still fresh.
    pub async fn payload(&self, name: &str, use_cache: bool) -> TopicResult<Arc<Value>> {
        let arg = self.argument(name).ok_or_else(|| TopicError::NoMatch {
            topic: self.name.clone(),
            name: name.to_string(),
        })?;

        if use_cache && let Some(cached) = self.cached(name) {
            return Ok(cached);
        }

        let value = match &self.producer {
            Producer::Fixed(produce) => produce().await?,
            Producer::Wildcard { produce, .. } => produce(arg.to_string()).await?,
        };
        let value = Arc::new(value);

        if let Ok(mut cache) = self.cache.lock() {
            // names are client chosen, expired ones must not pile up
            cache.retain(|_, (at, _)| at.elapsed() < PAYLOAD_CACHE_TTL);
            cache.insert(name.to_string(), (Instant::now(), value.clone()));
        }

        Ok(value)
    }

    /// Drops the cached payload of `name`.
    pub fn forget(&self, name: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(name);
        }
    }

    fn cached(&self, name: &str) -> Option<Arc<Value>> {
        let cache = self.cache.lock().ok()?;
        let (at, value) = cache.get(name)?;

        (at.elapsed() < PAYLOAD_CACHE_TTL).then(|| value.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_topic() -> (Topic, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let topic = Topic::fixed("twitchcancer.live", Duration::from_secs(1), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!(n)) }
        });

        (topic, calls)
    }

    #[test]
    fn test_wildcard_matching() {
        let topic = Topic::wildcard("twitchcancer.channel.*", Duration::from_secs(60), |arg| {
            async move { Ok(json!(arg)) }
        })
        .unwrap();

        assert!(topic.matches("twitchcancer.channel.forsenlol"));
        assert!(topic.matches("twitchcancer.channel.#forsen"));
        assert!(!topic.matches("twitchcancer.channel."));
        assert!(!topic.matches("twitchcancer.channel"));
        assert!(!topic.matches("twitchcancer.live"));
        assert!(!topic.matches("other.twitchcancer.channel.forsenlol"));
    }

    #[test]
    fn test_fixed_matches_exactly() {
        let (topic, _) = counting_topic();

        assert!(topic.matches("twitchcancer.live"));
        assert!(!topic.matches("twitchcancer.live.x"));
        assert!(!topic.matches("twitchcancer"));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        for pattern in ["twitchcancer.channel", "*", ".*", "a.*.b.*", "twitchcancer*"] {
            let topic = Topic::wildcard(pattern, Duration::from_secs(1), |_| async {
                Ok(Value::Null)
            });
            assert!(
                matches!(topic, Err(TopicError::InvalidPattern(_))),
                "{pattern} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_wildcard_payload_receives_argument() {
        let topic = Topic::wildcard("twitchcancer.leaderboard.*", Duration::from_secs(60), |arg| {
            async move { Ok(json!({ "name": arg })) }
        })
        .unwrap();

        let payload = topic
            .payload("twitchcancer.leaderboard.daily.cancer.minute", false)
            .await
            .unwrap();
        assert_eq!(payload["name"], "daily.cancer.minute");

        let err = topic.payload("twitchcancer.live", true).await;
        assert!(matches!(err, Err(TopicError::NoMatch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let (topic, calls) = counting_topic();

        let first = topic.payload("twitchcancer.live", true).await.unwrap();
        let second = topic.payload("twitchcancer.live", true).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(59)).await;
        let still = topic.payload("twitchcancer.live", true).await.unwrap();
        assert!(Arc::ptr_eq(&first, &still));

        tokio::time::advance(Duration::from_secs(2)).await;
        let fresh = topic.payload("twitchcancer.live", true).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_names_are_evicted() {
        let topic = Topic::wildcard("twitchcancer.channel.*", Duration::from_secs(60), |arg| {
            async move { Ok(json!(arg)) }
        })
        .unwrap();

        for i in 0..1000 {
            topic
                .payload(&format!("twitchcancer.channel.{i}"), true)
                .await
                .unwrap();
        }
        assert_eq!(topic.cache.lock().unwrap().len(), 1000);

        tokio::time::advance(PAYLOAD_CACHE_TTL).await;
        topic.payload("twitchcancer.channel.forsen", true).await.unwrap();

        let cache = topic.cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("twitchcancer.channel.forsen"));
    }

    #[tokio::test]
    async fn test_forget_drops_cached_payload() {
        let (topic, calls) = counting_topic();

        topic.payload("twitchcancer.live", true).await.unwrap();
        topic.forget("twitchcancer.live");
        topic.forget("twitchcancer.unknown");
        topic.payload("twitchcancer.live", true).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncached_payload_always_recomputes() {
        let (topic, calls) = counting_topic();

        topic.payload("twitchcancer.live", false).await.unwrap();
        let fresh = topic.payload("twitchcancer.live", false).await.unwrap();

        assert_eq!(*fresh, json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // uncached computations still refresh the cache
        let cached = topic.payload("twitchcancer.live", true).await.unwrap();
        assert!(Arc::ptr_eq(&fresh, &cached));
    }
}
