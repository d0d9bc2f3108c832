//! Streaming of change events to one watcher.

use crate::error::{Result, WatchError};
use crate::pubsub::{Subscription, SubscriptionId, TopicBus};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// One message sent to a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Subscription the event was delivered to.
    pub subscription_id: SubscriptionId,
    /// Rendered event, e.g. `[2024-01-01T00:00:00.000000Z] - CONFIG_UPDATED: app/db.toml`.
    pub event: String,
}

/// Outbound side of a watch stream, provided by the transport.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Delivery`] if the peer is gone or the transport
    /// rejected the message; the stream then ends.
    async fn send(&mut self, notification: Notification) -> Result<()>;
}

#[async_trait]
impl EventSink for mpsc::Sender<Notification> {
    async fn send(&mut self, notification: Notification) -> Result<()> {
        mpsc::Sender::send(self, notification)
            .await
            .map_err(|_| WatchError::Delivery("notification receiver dropped".to_string()))
    }
}

/// Unsubscribes exactly once, on release or on drop.
struct UnsubscribeGuard {
    bus: Arc<dyn TopicBus>,
    target: Option<(String, SubscriptionId)>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl UnsubscribeGuard {
    fn release(&mut self) {
        let Some((path, id)) = self.target.take() else {
            return;
        };
        match self.bus.unsubscribe(&path, &id) {
            Ok(()) => debug!(path = %path, subscription = %id, "unsubscribed watcher"),
            // Topic deletion already closed and removed the subscription.
            Err(err) => debug!(path = %path, subscription = %id, error = %err, "unsubscribe skipped"),
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.subscription_closed();
        }
    }
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live WatchConfig call: a subscription plus the obligation to remove it.
///
/// The subscription is removed from the bus exactly once, when [`run`]
/// finishes or when the stream (or the `run` future) is dropped.
///
/// [`run`]: NotificationStream::run
pub struct NotificationStream {
    subscription: Subscription,
    guard: UnsubscribeGuard,
}

impl NotificationStream {
    /// Wrap a subscription taken from `bus`.
    pub fn new(bus: Arc<dyn TopicBus>, subscription: Subscription) -> Self {
        let target = Some((subscription.path().to_string(), subscription.id()));
        Self {
            subscription,
            guard: UnsubscribeGuard {
                bus,
                target,
                #[cfg(feature = "metrics")]
                metrics: None,
            },
        }
    }

    /// Count this stream in the open-subscriptions gauge until it is released.
    ///
    /// The caller records the opening with
    /// [`WatchMetrics::subscription_opened`].
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.guard.metrics = Some(metrics);
        self
    }

    /// Id of the underlying subscription.
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Watched config path.
    pub fn path(&self) -> &str {
        self.subscription.path()
    }

    /// Forward events to `sink` until `cancel` fires, the subscription is
    /// closed by the bus, or the sink fails.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if a delivery fails. Cancellation and
    /// closing are a normal end of the stream.
    pub async fn run<S>(mut self, sink: &mut S, cancel: CancellationToken) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        let id = self.subscription.id();
        info!(path = %self.path(), subscription = %id, "watcher connected");

        let result = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                event = self.subscription.recv() => event,
            };
            let Some(event) = event else {
                debug!(path = %self.path(), subscription = %id, "subscription closed by bus");
                break Ok(());
            };

            let notification = Notification {
                subscription_id: id,
                event: event.to_string(),
            };
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                sent = sink.send(notification) => sent,
            };
            if let Err(err) = sent {
                break Err(err);
            }
        };

        self.guard.release();
        match &result {
            Ok(()) => info!(path = %self.path(), subscription = %id, "watcher disconnected"),
            Err(err) => info!(
                path = %self.path(),
                subscription = %id,
                error = %err,
                "watcher dropped after failed delivery"
            ),
        }
        result
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("subscription", &self.subscription)
            .finish()
    }
}
