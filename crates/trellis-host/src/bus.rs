//! Topic registry and fan-out delivery.
//!
//! The bus exclusively owns topic state: the current snapshot and the
//! subscriber set of every topic. Subscribers are held as weak handles to
//! their delivery queues, so a topic never keeps an instance alive past
//! its lifecycle; dead handles are pruned on contact.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use trellis_protocol::Message;

use crate::delivery::DeliveryQueue;
use crate::instance::InstanceId;

#[derive(Debug, Default)]
struct Topic {
    current: Option<serde_json::Value>,
    subscribers: HashMap<InstanceId, Weak<DeliveryQueue>>,
}

/// Host-side publish/subscribe bus.
#[derive(Debug, Default)]
pub struct TopicBus {
    topics: RwLock<HashMap<String, Topic>>,
}

impl TopicBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new snapshot for `topic` and fan it out to every live
    /// subscriber.
    ///
    /// All enqueues for one publish happen under the bus write lock, so
    /// subscribers of a topic observe snapshots in publish order. Across
    /// different topics no ordering is guaranteed.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) {
        let mut topics = self.topics.write().await;
        let entry = topics.entry(topic.to_string()).or_default();
        entry.current = Some(payload.clone());

        entry.subscribers.retain(|id, handle| match handle.upgrade() {
            Some(queue) => {
                let delivered = queue.enqueue(Message::DataEvent {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                });
                if !delivered {
                    debug!(instance = %id, topic, "subscriber queue closed, removed");
                }
                delivered
            }
            None => {
                debug!(instance = %id, topic, "subscriber queue gone, pruned");
                false
            }
        });
    }

    /// Add `instance` to each listed topic's subscriber set.
    ///
    /// A topic that already has a snapshot delivers it immediately, so a
    /// subscriber never waits for the next publish when data exists.
    pub async fn subscribe(&self, instance: InstanceId, queue: &Arc<DeliveryQueue>, topics: &[String]) {
        if queue.is_closed() {
            warn!(instance = %instance, "subscribe for retired delivery queue ignored");
            return;
        }
        let mut table = self.topics.write().await;
        for name in topics {
            let entry = table.entry(name.clone()).or_default();
            entry.subscribers.insert(instance, Arc::downgrade(queue));
            if let Some(current) = &entry.current {
                queue.enqueue(Message::DataEvent {
                    topic: name.clone(),
                    payload: current.clone(),
                });
            }
            debug!(instance = %instance, topic = %name, "subscribed");
        }
    }

    /// Remove `instance` from each listed topic. Idempotent; unknown
    /// topics and absent subscriptions are no-ops.
    pub async fn unsubscribe(&self, instance: InstanceId, topics: &[String]) {
        let mut table = self.topics.write().await;
        for name in topics {
            if let Some(entry) = table.get_mut(name) {
                entry.subscribers.remove(&instance);
            }
        }
    }

    /// Remove `instance` from every topic. Used on teardown and on sandbox
    /// crash.
    pub async fn remove_instance(&self, instance: InstanceId) {
        let mut table = self.topics.write().await;
        for entry in table.values_mut() {
            entry.subscribers.remove(&instance);
        }
    }

    // ── Query surface ────────────────────────────────────────────────

    pub async fn snapshot(&self, topic: &str) -> Option<serde_json::Value> {
        self.topics
            .read()
            .await
            .get(topic)
            .and_then(|t| t.current.clone())
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    pub async fn topic_names(&self) -> Vec<String> {
        self.topics.read().await.keys().cloned().collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
