//! Topic-based publish/subscribe fan-out of change events.
//!
//! Each config path maps to a topic holding zero or more subscriptions.
//! Delivery is FIFO per subscription and never blocks the publisher.

mod event;
mod in_memory;
mod subscription;

pub use event::{Event, EventKind};
pub use in_memory::InMemoryBus;
pub use subscription::{Subscription, SubscriptionId};

use crate::error::{Result, WatchError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What the bus does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverflowPolicy {
    /// Discard the oldest queued event to make room.
    #[default]
    DropOldest,
    /// Close the subscription and remove it from its topic.
    Disconnect,
}

impl OverflowPolicy {
    /// The name used in settings and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop-oldest",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop-oldest" => Ok(Self::DropOldest),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(WatchError::Settings(format!(
                "unknown overflow policy '{}', expected 'drop-oldest' or 'disconnect'",
                other
            ))),
        }
    }
}

/// Publish/subscribe capability keyed by config path.
pub trait TopicBus: Send + Sync {
    /// Create an empty topic. Creating an existing topic is a no-op that
    /// keeps its subscriptions; returns `true` if a topic was created.
    fn create_topic(&self, path: &str) -> bool;

    /// Remove a topic, closing every subscription it holds. Returns `false`
    /// if there was no such topic.
    fn delete_topic(&self, path: &str) -> bool;

    /// Returns `true` if the topic exists.
    ///
    /// The answer may be stale by the time the caller acts on it.
    fn topic_exists(&self, path: &str) -> bool;

    /// Register a new subscription on an existing topic.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoSuchTopic`] if the topic does not exist.
    fn subscribe(&self, path: &str) -> Result<Subscription>;

    /// Remove and close a subscription. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoSuchTopic`] if the topic does not exist.
    fn unsubscribe(&self, path: &str, id: &SubscriptionId) -> Result<()>;

    /// Offer `event` to every subscription of the topic and return how many
    /// accepted it. A missing topic delivers to nobody.
    fn publish(&self, path: &str, event: &Event) -> usize;

    /// Number of live subscriptions on a topic.
    fn subscription_count(&self, path: &str) -> usize;

    /// Number of topics.
    fn topic_count(&self) -> usize;
}

/// Statically known topic bus backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusKind {
    /// [`InMemoryBus`]
    #[default]
    InMemory,
}

impl BusKind {
    /// The name used in settings and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in-memory",
        }
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-memory" => Ok(Self::InMemory),
            other => Err(WatchError::NotImplemented {
                component: "bus",
                kind: other.to_string(),
            }),
        }
    }
}

/// Build a topic bus of the given kind.
pub fn new_bus(kind: BusKind, capacity: usize, policy: OverflowPolicy) -> Arc<dyn TopicBus> {
    match kind {
        BusKind::InMemory => Arc::new(InMemoryBus::new(capacity, policy)),
    }
}
