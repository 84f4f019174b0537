//! Topic-addressed publish/subscribe fan-out.
//!
//! The bus maintains an explicit registry of `topic → subscribers`, each
//! subscriber backed by a bounded channel with explicit teardown. Delivery
//! is at-most-once: a message reaches exactly the subscribers registered at
//! the instant of publish, then is discarded. There is no buffering, replay,
//! or persistence; publishing to a topic with no subscribers is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use taskwire_proto::stream::EventPayload;
use tokio::sync::{RwLock, mpsc};

/// Default per-subscriber queue capacity.
const DEFAULT_CAPACITY: usize = 64;

/// Opaque handle identifying one subscriber registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event as delivered to a subscriber queue: the payload plus the topic
/// it was published on, so one queue can carry several topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Topic the event was published on.
    pub topic: String,
    /// The published payload.
    pub event: EventPayload,
}

/// A live feed of future events for one topic, with its own queue.
pub struct Subscription {
    /// Handle to pass to [`EventBus::unsubscribe`].
    pub id: SubscriberId,
    /// Receiving end of the subscriber queue.
    pub rx: mpsc::Receiver<BusEvent>,
}

struct TopicSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<BusEvent>,
}

/// In-memory topic registry with bounded fan-out queues.
///
/// Thread-safe via [`RwLock`]; safe under concurrent publish and concurrent
/// subscribe/unsubscribe from many independent callers.
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<TopicSubscriber>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a new, empty bus with the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new, empty bus with a custom per-subscriber queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Subscribes to a topic with a fresh bounded queue.
    ///
    /// Only events published after this call are delivered.
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.subscribe_with(topic, tx).await;
        Subscription { id, rx }
    }

    /// Subscribes to a topic, delivering into a caller-provided sender.
    ///
    /// A connection holding several subscriptions can pass clones of one
    /// sender so that all its topics funnel into a single queue and arrive
    /// in publish order.
    pub async fn subscribe_with(&self, topic: &str, tx: mpsc::Sender<BusEvent>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .push(TopicSubscriber { id, tx });
        drop(topics);
        tracing::debug!(topic = %topic, subscriber = %id, "subscribed");
        id
    }

    /// Removes a subscriber from a topic. Idempotent.
    ///
    /// Returns `true` if the registration existed and was removed.
    pub async fn unsubscribe(&self, topic: &str, id: SubscriberId) -> bool {
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() < before;
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        drop(topics);
        if removed {
            tracing::debug!(topic = %topic, subscriber = %id, "unsubscribed");
        }
        removed
    }

    /// Publishes an event to every subscriber currently registered on the
    /// topic, returning the number of successful deliveries.
    ///
    /// Delivery failures never propagate to the publisher: a full queue
    /// drops the event for that subscriber with a warning (at-most-once,
    /// no backpressure onto mutations), and a closed queue causes the
    /// subscriber to be pruned from the registry.
    pub async fn publish(&self, topic: &str, event: EventPayload) -> usize {
        let mut delivered = 0;
        let mut closed: Vec<SubscriberId> = Vec::new();

        {
            let topics = self.topics.read().await;
            let Some(subscribers) = topics.get(topic) else {
                tracing::debug!(topic = %topic, "published with no subscribers");
                return 0;
            };
            for subscriber in subscribers {
                let bus_event = BusEvent {
                    topic: topic.to_string(),
                    event: event.clone(),
                };
                match subscriber.tx.try_send(bus_event) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            topic = %topic,
                            subscriber = %subscriber.id,
                            "subscriber queue full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(subscriber.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut topics = self.topics.write().await;
            if let Some(subscribers) = topics.get_mut(topic) {
                subscribers.retain(|s| !closed.contains(&s.id));
                if subscribers.is_empty() {
                    topics.remove(topic);
                }
            }
            drop(topics);
            tracing::debug!(
                topic = %topic,
                pruned = closed.len(),
                "pruned closed subscribers"
            );
        }

        delivered
    }

    /// Returns the number of subscribers currently registered on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map_or(0, Vec::len)
    }
}
