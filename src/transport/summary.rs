use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::constants::{SUMMARY_RECONNECT_MAX, SUMMARY_RECONNECT_MIN, SUMMARY_TOPIC};
use crate::live::{Archive, MinuteSummary, summaries};
use crate::transport::{TransportError, TransportResult};

pub fn encode_frame(summary: &MinuteSummary) -> TransportResult<(&'static str, Vec<u8>)> {
    Ok((SUMMARY_TOPIC, serde_json::to_vec(summary)?))
}

pub fn decode_frame(topic: &str, body: &[u8]) -> TransportResult<MinuteSummary> {
    if topic != SUMMARY_TOPIC {
        return Err(TransportError::ForeignTopic(topic.to_string()));
    }

    Ok(serde_json::from_slice(body)?)
}

/// Fire-and-forget side of the summary bus: a summary published while nobody listens is gone.
#[derive(Clone)]
pub struct SummaryPublisher {
    manager: ConnectionManager,
}

impl SummaryPublisher {
    #[instrument(skip(redis_url))]
    pub async fn connect(redis_url: &str) -> TransportResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::debug!("connected summary publisher");

        Ok(Self { manager })
    }

    /// Returns the number of subscribers that received the summary.
    pub async fn publish(&self, summary: &MinuteSummary) -> TransportResult<i64> {
        let (topic, body) = encode_frame(summary)?;
        let mut conn = self.manager.clone();

        Ok(conn.publish(topic, body).await?)
    }

    pub async fn publish_archive(&self, archive: Archive) {
        let minutes = archive.len();

        for summary in summaries(archive) {
            if let Err(e) = self.publish(&summary).await {
                tracing::error!(
                    channel = %summary.channel,
                    date = %summary.date,
                    error = %e,
                    "failed to publish summary"
                );
            }
        }

        tracing::info!(minutes, "published archived summaries");
    }
}

/// Where the recorder reads summaries from. Every call opens a fresh subscription.
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn subscribe(&self) -> TransportResult<SummaryStream>;
}

pub type SummaryStream = BoxStream<'static, TransportResult<MinuteSummary>>;

pub struct RedisSummarySource {
    client: redis::Client,
}

#[async_trait]
impl SummarySource for RedisSummarySource {
    async fn subscribe(&self) -> TransportResult<SummaryStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(SUMMARY_TOPIC).await?;
        tracing::info!(topic = SUMMARY_TOPIC, "subscribed to summaries");

        Ok(pubsub
            .into_on_message()
            .map(|msg| decode_frame(msg.get_channel_name(), msg.get_payload_bytes()))
            .boxed())
    }
}

/// Doubling delay between resubscriptions, capped at [`SUMMARY_RECONNECT_MAX`].
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: SUMMARY_RECONNECT_MIN,
        }
    }

    fn reset(&mut self) {
        self.next = SUMMARY_RECONNECT_MIN;
    }

    fn advance(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(SUMMARY_RECONNECT_MAX);
        delay
    }

    /// `false` when cancelled before the delay ran out.
    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.advance();
        tracing::warn!(delay = ?delay, "resubscribing to summaries");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[derive(Clone)]
pub struct SummarySubscriber {
    source: Arc<dyn SummarySource>,
}

impl SummarySubscriber {
    pub fn new(redis_url: &str) -> TransportResult<Self> {
        Ok(Self::from_source(Arc::new(RedisSummarySource {
            client: redis::Client::open(redis_url)?,
        })))
    }

    pub fn from_source(source: Arc<dyn SummarySource>) -> Self {
        Self { source }
    }

    /// Feeds every summary received on the bus to `on_summary`, one at a time, until cancelled.
    /// A lost or refused subscription is reopened after a growing delay.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut on_summary: F)
    where
        F: FnMut(MinuteSummary) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut backoff = Backoff::new();

        loop {
            let subscribed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                subscribed = self.source.subscribe() => subscribed,
            };

            match subscribed {
                Ok(mut summaries) => {
                    backoff.reset();

                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            next = summaries.next() => next,
                        };

                        match next {
                            Some(Ok(summary)) => on_summary(summary).await,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "skipping undecodable summary")
                            }
                            None => break,
                        }
                    }

                    tracing::warn!("summary subscription lost");
                }
                Err(e) => tracing::warn!(error = %e, "failed to subscribe to summaries"),
            }

            if !backoff.wait(&cancel).await {
                return;
            }
        }
    }
}
