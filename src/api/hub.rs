use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::protocol::envelope;
use crate::api::topic::Topic;

/// One websocket connection, as seen by the hub. Outbound frames go through `tx` to the
/// connection's writer task.
#[derive(Debug, Clone)]
pub struct Client {
    id: Uuid,
    tx: UnboundedSender<String>,
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Client {}

impl Hash for Client {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Client {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns false when the frame could not be handed to the writer.
    pub fn send(&self, topic: &str, data: &Value) -> bool {
        match envelope(topic, data) {
            Ok(frame) => self.tx.send(frame).is_ok(),
            Err(e) => {
                tracing::debug!(%topic, error = %e, "dropping unserializable payload");
                false
            }
        }
    }
}

type Subscriptions = HashMap<String, HashSet<Client>>;

/// Topic registry plus the `name -> subscribers` map.
///
/// The map lock is only ever held for synchronous bookkeeping; payloads are computed after it is
/// released.
pub struct Hub {
    topics: Vec<Arc<Topic>>,
    subscriptions: Mutex<Subscriptions>,
}

impl Hub {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self {
            topics: topics.into_iter().map(Arc::new).collect(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }

    /// First registered topic matching `name`.
    pub fn find(&self, name: &str) -> Option<Arc<Topic>> {
        let topic = self.topics.iter().find(|t| t.matches(name)).cloned();
        if topic.is_none() {
            tracing::warn!(%name, "no topic matches");
        }

        topic
    }

    /// Returns false, without subscribing, when no topic serves `name`.
    pub fn subscribe(&self, client: &Client, name: &str) -> bool {
        if self.find(name).is_none() {
            return false;
        }

        self.lock().entry(name.to_string()).or_default().insert(client.clone());
        tracing::debug!(client = %client.id, %name, "subscribed");

        true
    }

    pub fn unsubscribe(&self, client: &Client, name: &str) {
        self.remove(&mut self.lock(), client, name);
    }

    pub fn unsubscribe_all(&self, client: &Client) {
        let mut subs = self.lock();
        let names: Vec<String> = subs
            .iter()
            .filter(|(_, clients)| clients.contains(client))
            .map(|(name, _)| name.clone())
            .collect();

        for name in names {
            self.remove(&mut subs, client, &name);
        }
    }

    fn remove(&self, subs: &mut Subscriptions, client: &Client, name: &str) {
        let Some(clients) = subs.get_mut(name) else {
            tracing::warn!(client = %client.id, %name, "unsubscribe from a name nobody follows");
            return;
        };

        if !clients.remove(client) {
            tracing::warn!(client = %client.id, %name, "unsubscribe without a subscription");
        } else {
            tracing::debug!(client = %client.id, %name, "unsubscribed");
        }

        if clients.is_empty() {
            subs.remove(name);

            if let Some(topic) = self.topics.iter().find(|t| t.matches(name)) {
                topic.forget(name);
            }
        }
    }

    /// Names with at least one subscriber.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Fresh payload for every subscribed name `topic` serves, sent to each of its subscribers.
    /// A name whose payload fails is skipped until the next cycle.
    pub async fn publish(&self, topic: &Topic) {
        let targets: Vec<(String, Vec<Client>)> = self
            .lock()
            .iter()
            .filter(|(name, _)| topic.matches(name))
            .map(|(name, clients)| (name.clone(), clients.iter().cloned().collect()))
            .collect();

        for (name, clients) in targets {
            match topic.payload(&name, false).await {
                Ok(data) => {
                    tracing::debug!(%name, subscribers = clients.len(), "publishing");
                    for client in &clients {
                        client.send(&name, &data);
                    }
                }
                Err(e) => tracing::error!(%name, error = %e, "failed to compute payload"),
            }
        }
    }

    /// Latest (possibly cached) payload for `name` to a single client.
    pub async fn publish_one(&self, client: &Client, name: &str) {
        let Some(topic) = self.find(name) else {
            return;
        };

        match topic.payload(name, true).await {
            Ok(data) => {
                client.send(name, &data);
            }
            Err(e) => tracing::error!(%name, error = %e, "failed to compute payload"),
        }
    }

    /// One publish loop per topic: immediately, then every `refresh` until cancelled.
    pub fn spawn_publishers(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            topics = ?self.topics.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "starting publishers"
        );

        self.topics
            .iter()
            .cloned()
            .map(|topic| {
                let hub = self.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(topic.refresh());
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = ticker.tick() => hub.publish(&topic).await,
                        }
                    }

                    tracing::debug!(topic = %topic.name(), "publisher stopped");
                })
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        // a panic while holding the lock leaves the map consistent, keep serving
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
