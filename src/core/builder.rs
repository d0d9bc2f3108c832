//! Builder for constructing Configd instances.

use crate::api::ConfigApi;
use crate::core::{Configd, Settings};
use crate::error::Result;
use crate::fswatch::{ChangeRouter, FsWatcher, TreeWalker, WatchOptions};
use crate::kv::{ContentStore, StoreKind, new_store};
use crate::pubsub::{BusKind, InMemoryBus, OverflowPolicy, TopicBus, new_bus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Builder for a running [`Configd`].
///
/// Backends are picked by kind unless an instance is supplied with
/// [`with_store`](Self::with_store) or [`with_bus`](Self::with_bus).
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let daemon = Configd::builder()
///     .with_root("/etc/myapp")
///     .with_walk_interval(Duration::from_secs(2))
///     .with_queue_capacity(128)
///     .with_overflow_policy(OverflowPolicy::Disconnect)
///     .start()
///     .await?;
///
/// println!("{}", daemon.api().get_config("db.yaml")?);
/// daemon.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ConfigdBuilder {
    root: PathBuf,
    walk_interval: Duration,
    settle: Duration,
    store_kind: StoreKind,
    bus_kind: BusKind,
    queue_capacity: usize,
    overflow_policy: OverflowPolicy,
    store: Option<Arc<dyn ContentStore>>,
    bus: Option<Arc<dyn TopicBus>>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl ConfigdBuilder {
    /// Create a builder watching the current directory with default tuning.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("./"),
            walk_interval: TreeWalker::DEFAULT_INTERVAL,
            settle: ChangeRouter::DEFAULT_SETTLE,
            store_kind: StoreKind::default(),
            bus_kind: BusKind::default(),
            queue_capacity: InMemoryBus::DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            store: None,
            bus: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Create a builder from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotImplemented`](crate::error::WatchError::NotImplemented)
    /// for an unknown store or bus name and
    /// [`WatchError::Settings`](crate::error::WatchError::Settings) for an
    /// unknown overflow policy.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new()
            .with_root(&settings.root_folder)
            .with_walk_interval(settings.walk_interval())
            .with_settle_delay(settings.settle())
            .with_store_kind(settings.store_kind()?)
            .with_bus_kind(settings.bus_kind()?)
            .with_queue_capacity(settings.queue_capacity)
            .with_overflow_policy(settings.overflow_policy()?))
    }

    /// Root of the watched tree.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Period of the tree walker.
    pub fn with_walk_interval(mut self, interval: Duration) -> Self {
        self.walk_interval = interval;
        self
    }

    /// Delay before reading a file after a native create/write event.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Content store backend, ignored if a store instance is supplied.
    pub fn with_store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = kind;
        self
    }

    /// Topic bus backend, ignored if a bus instance is supplied.
    pub fn with_bus_kind(mut self, kind: BusKind) -> Self {
        self.bus_kind = kind;
        self
    }

    /// Length of each subscriber's queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// What happens when a subscriber's queue is full.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Use an existing content store.
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an existing topic bus.
    pub fn with_bus(mut self, bus: Arc<dyn TopicBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Record metrics for routing and subscriptions.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the backends and start watching.
    ///
    /// Files already under the root are in the store when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`](crate::error::WatchError::Watch) if the
    /// root is not a directory or the native watcher cannot be set up.
    pub async fn start(self) -> Result<Configd> {
        let store = self.store.unwrap_or_else(|| new_store(self.store_kind));
        let bus = self
            .bus
            .unwrap_or_else(|| new_bus(self.bus_kind, self.queue_capacity, self.overflow_policy));

        let options = WatchOptions {
            walk_interval: self.walk_interval,
            settle: self.settle,
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        };

        let cancel = CancellationToken::new();
        let watcher = FsWatcher::spawn(
            &self.root,
            Arc::clone(&store),
            Arc::clone(&bus),
            options,
            cancel.clone(),
        )
        .await?;

        let api = ConfigApi::new(store, bus);
        #[cfg(feature = "metrics")]
        let api = match self.metrics {
            Some(metrics) => api.with_metrics(metrics),
            None => api,
        };

        Ok(Configd::new(api, watcher, cancel))
    }
}

impl Default for ConfigdBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            root_folder: PathBuf::from("/srv/configs"),
            walk_interval_ms: 250,
            queue_capacity: 4,
            overflow_policy: "disconnect".to_string(),
            ..Settings::default()
        };
        let builder = ConfigdBuilder::from_settings(&settings).unwrap();

        assert_eq!(builder.root, PathBuf::from("/srv/configs"));
        assert_eq!(builder.walk_interval, Duration::from_millis(250));
        assert_eq!(builder.queue_capacity, 4);
        assert_eq!(builder.overflow_policy, OverflowPolicy::Disconnect);
    }

    #[test]
    fn test_from_settings_unknown_bus() {
        let settings = Settings {
            bus: "redis".to_string(),
            ..Settings::default()
        };
        let err = ConfigdBuilder::from_settings(&settings).err().unwrap();
        assert!(matches!(
            err,
            WatchError::NotImplemented {
                component: "bus",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_start_missing_root() {
        let result = ConfigdBuilder::new()
            .with_root("/nonexistent/confwatch")
            .start()
            .await;
        assert!(matches!(result, Err(WatchError::Watch(_))));
    }
}
