//! In-memory topic bus.

use super::subscription::{Delivery, Mailbox, Subscription, SubscriptionId};
use super::{Event, OverflowPolicy, TopicBus};
use crate::error::{Result, WatchError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type Subscriptions = HashMap<SubscriptionId, Arc<Mailbox>>;

/// A [`TopicBus`] keeping every topic in one lock-guarded map.
///
/// Publishing, unsubscribing and deleting a topic all happen under the same
/// lock, so an event is never offered to a mailbox that has already been
/// removed. Mailbox pushes never block: a subscriber that falls behind is
/// handled according to the bus [`OverflowPolicy`].
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, Subscriptions>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl InMemoryBus {
    /// Default per-subscriber queue length.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a bus whose subscriptions queue up to `capacity` events each.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// The per-subscriber queue length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The overflow policy applied to full subscriber queues.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, OverflowPolicy::default())
    }
}

impl TopicBus for InMemoryBus {
    fn create_topic(&self, path: &str) -> bool {
        let mut topics = self.topics.lock();
        if topics.contains_key(path) {
            return false;
        }
        topics.insert(path.to_string(), Subscriptions::new());
        debug!(topic = %path, "created topic");
        true
    }

    fn delete_topic(&self, path: &str) -> bool {
        let mut topics = self.topics.lock();
        match topics.remove(path) {
            Some(subscriptions) => {
                for mailbox in subscriptions.values() {
                    mailbox.close();
                }
                debug!(
                    topic = %path,
                    closed = subscriptions.len(),
                    "deleted topic"
                );
                true
            }
            None => false,
        }
    }

    fn topic_exists(&self, path: &str) -> bool {
        self.topics.lock().contains_key(path)
    }

    fn subscribe(&self, path: &str) -> Result<Subscription> {
        let mut topics = self.topics.lock();
        let subscriptions = topics
            .get_mut(path)
            .ok_or_else(|| WatchError::no_such_topic(path))?;

        let (subscription, mailbox) = Subscription::new(path, self.capacity);
        subscriptions.insert(subscription.id(), mailbox);
        debug!(topic = %path, subscription = %subscription.id(), "subscribed");
        Ok(subscription)
    }

    fn unsubscribe(&self, path: &str, id: &SubscriptionId) -> Result<()> {
        let mut topics = self.topics.lock();
        let subscriptions = topics
            .get_mut(path)
            .ok_or_else(|| WatchError::no_such_topic(path))?;

        if let Some(mailbox) = subscriptions.remove(id) {
            mailbox.close();
            debug!(topic = %path, subscription = %id, "unsubscribed");
        }
        Ok(())
    }

    fn publish(&self, path: &str, event: &Event) -> usize {
        let mut topics = self.topics.lock();
        let Some(subscriptions) = topics.get_mut(path) else {
            return 0;
        };

        let mut delivered = 0;
        subscriptions.retain(|id, mailbox| match mailbox.push(event.clone(), self.policy) {
            Delivery::Queued => {
                delivered += 1;
                true
            }
            Delivery::DroppedOldest => {
                warn!(
                    topic = %path,
                    subscription = %id,
                    "subscriber queue full, dropped oldest event"
                );
                delivered += 1;
                true
            }
            Delivery::Disconnected => {
                warn!(
                    topic = %path,
                    subscription = %id,
                    "subscriber queue full, disconnecting slow subscriber"
                );
                false
            }
            Delivery::Closed => false,
        });
        delivered
    }

    fn subscription_count(&self, path: &str) -> usize {
        self.topics.lock().get(path).map_or(0, HashMap::len)
    }

    fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}
