//! Subscriptions and their bounded delivery queues.

use super::OverflowPolicy;
use super::event::Event;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Globally unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What happened to an event offered to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Queued after evicting the oldest pending event.
    DroppedOldest,
    /// The queue was full and the mailbox closed itself.
    Disconnected,
    Closed,
}

struct MailboxState {
    queue: VecDeque<Event>,
    closed: bool,
    dropped: u64,
}

/// Bounded single-consumer queue shared by the bus (producer side) and a
/// [`Subscription`] (consumer side).
///
/// Pushing never blocks. Once closed, pushes are ignored and the consumer
/// drains whatever is left before seeing the end of the stream.
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&self, event: Event, policy: OverflowPolicy) -> Delivery {
        let delivery = {
            let mut state = self.state.lock();
            if state.closed {
                return Delivery::Closed;
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(event);
                Delivery::Queued
            } else {
                match policy {
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                        state.dropped += 1;
                        state.queue.push_back(event);
                        Delivery::DroppedOldest
                    }
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        state.dropped += 1;
                        Delivery::Disconnected
                    }
                }
            }
        };
        self.notify.notify_one();
        delivery
    }

    /// Close the mailbox. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let was_open = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if was_open {
            self.notify.notify_one();
        }
        was_open
    }

    fn try_pop(&self) -> Result<Event, bool> {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(event) => Ok(event),
            None => Err(state.closed),
        }
    }

    async fn recv(&self) -> Option<Event> {
        loop {
            match self.try_pop() {
                Ok(event) => return Some(event),
                Err(true) => return None,
                Err(false) => self.notify.notified().await,
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// A live interest registration on one topic.
///
/// Events published to the topic are queued in a bounded mailbox owned by
/// this subscription. The stream of events ends once the subscription is
/// unsubscribed, its topic is deleted, or the bus disconnects it for falling
/// behind.
pub struct Subscription {
    id: SubscriptionId,
    path: String,
    mailbox: Arc<Mailbox>,
}

impl Subscription {
    pub(crate) fn new(path: impl Into<String>, capacity: usize) -> (Self, Arc<Mailbox>) {
        let mailbox = Arc::new(Mailbox::new(capacity));
        let subscription = Self {
            id: SubscriptionId::new(),
            path: path.into(),
            mailbox: Arc::clone(&mailbox),
        };
        (subscription, mailbox)
    }

    /// The subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The topic this subscription belongs to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription is closed and every queued event
    /// has been received. Cancel safe: dropping the future loses no event.
    pub async fn recv(&self) -> Option<Event> {
        self.mailbox.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&self) -> Option<Event> {
        self.mailbox.try_pop().ok()
    }

    /// Number of events discarded because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped()
    }

    /// Returns `true` once no further events will be queued.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
