//! GetConfig and WatchConfig operations.

use super::stream::NotificationStream;
use crate::error::Result;
use crate::kv::ContentStore;
use crate::pubsub::TopicBus;
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// How often `watch_config` retries when the topic is deleted between its
/// creation and the subscription.
const SUBSCRIBE_ATTEMPTS: usize = 3;

/// Request handlers over a store and a bus, independent of any transport.
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::api::ConfigApi;
/// use confwatch::kv::InMemoryStore;
/// use confwatch::pubsub::InMemoryBus;
/// use std::sync::Arc;
///
/// let api = ConfigApi::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryBus::default()));
/// match api.get_config("app/db.toml") {
///     Ok(text) => println!("{}", text),
///     Err(e) if e.is_not_found() => println!("no such config"),
///     Err(e) => eprintln!("error: {}", e),
/// }
/// ```
#[derive(Clone)]
pub struct ConfigApi {
    store: Arc<dyn ContentStore>,
    bus: Arc<dyn TopicBus>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl ConfigApi {
    /// Create handlers over `store` and `bus`.
    pub fn new(store: Arc<dyn ContentStore>, bus: Arc<dyn TopicBus>) -> Self {
        Self {
            store,
            bus,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Count open watch streams.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current text of the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotFound`](crate::error::WatchError::NotFound) if
    /// nothing is stored under `path`, or a compression error if the stored
    /// payload cannot be decoded.
    pub fn get_config(&self, path: &str) -> Result<String> {
        let value = self.store.get(path).inspect_err(|err| {
            if err.is_not_found() {
                debug!(path = %path, "config requested but not stored");
            } else {
                error!(path = %path, error = %err, "error reading config");
            }
        })?;
        value
            .text()
            .inspect_err(|err| error!(path = %path, error = %err, "error decoding config"))
    }

    /// Subscribe to changes of `path`, creating its topic if needed.
    ///
    /// The config does not need to exist yet; a later creation is delivered
    /// as `CONFIG_CREATED`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoSuchTopic`](crate::error::WatchError::NoSuchTopic)
    /// if the topic keeps disappearing between creation and subscription.
    pub fn watch_config(&self, path: &str) -> Result<NotificationStream> {
        let mut attempt = 1;
        let subscription = loop {
            self.bus.create_topic(path);
            match self.bus.subscribe(path) {
                Ok(subscription) => break subscription,
                Err(err) if err.is_no_such_topic() && attempt < SUBSCRIBE_ATTEMPTS => {
                    debug!(path = %path, attempt, "topic vanished before subscribing, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    error!(path = %path, error = %err, "error subscribing to config");
                    return Err(err);
                }
            }
        };

        let stream = NotificationStream::new(Arc::clone(&self.bus), subscription);

        #[cfg(feature = "metrics")]
        let stream = match &self.metrics {
            Some(metrics) => {
                metrics.subscription_opened();
                stream.with_metrics(metrics.clone())
            }
            None => stream,
        };

        Ok(stream)
    }

    /// The store served by `get_config`.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// The bus served by `watch_config`.
    pub fn bus(&self) -> &Arc<dyn TopicBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use crate::pubsub::{Event, EventKind, InMemoryBus};

    fn api() -> ConfigApi {
        ConfigApi::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryBus::default()))
    }

    #[test]
    fn test_get_config() {
        let api = api();
        api.store().put("foo/config.yaml", b"foo: bar").unwrap();
        assert_eq!(api.get_config("foo/config.yaml").unwrap(), "foo: bar");
    }

    #[test]
    fn test_get_missing_config() {
        let err = api().get_config("missing.yaml").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "[KEY_NOT_FOUND_ERROR] Key missing.yaml not found in store"
        );
    }

    #[test]
    fn test_watch_creates_topic() {
        let api = api();
        let stream = api.watch_config("later.yaml").unwrap();
        assert!(api.bus().topic_exists("later.yaml"));
        assert_eq!(api.bus().subscription_count("later.yaml"), 1);
        assert_eq!(stream.path(), "later.yaml");

        let other = api.watch_config("later.yaml").unwrap();
        assert_ne!(stream.id(), other.id());
        assert_eq!(api.bus().subscription_count("later.yaml"), 2);

        assert_eq!(
            api.bus()
                .publish("later.yaml", &Event::new(EventKind::Created, "later.yaml")),
            2
        );
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn test_active_subscriptions_follow_streams() {
        use crate::api::Notification;
        use opentelemetry::global;
        use tokio::sync::mpsc;
        use tokio_util::sync::CancellationToken;

        let metrics = WatchMetrics::new(global::meter("test"));
        let api = api().with_metrics(metrics.clone());

        let first = api.watch_config("a.yaml").unwrap();
        let second = api.watch_config("a.yaml").unwrap();
        let other = api.watch_config("b.yaml").unwrap();
        assert_eq!(metrics.active_subscriptions(), 3);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut tx, _rx) = mpsc::channel::<Notification>(1);
        first.run(&mut tx, cancel.clone()).await.unwrap();
        second.run(&mut tx, cancel).await.unwrap();
        assert_eq!(metrics.active_subscriptions(), 1);

        // a stream ended by topic deletion is released once, on drop
        api.bus().delete_topic("b.yaml");
        drop(other);
        assert_eq!(metrics.active_subscriptions(), 0);
    }
}
