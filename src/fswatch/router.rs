//! Routing of filesystem changes into the store and the bus.

use super::filter::is_valid_path;
use super::observer::{FsEvent, FsEventKind, FsObserver};
use super::path::config_key;
use super::registry::PathRegistry;
use super::walker;
use crate::error::Result;
use crate::kv::{ContentStore, PutOutcome};
use crate::pubsub::{Event, EventKind, TopicBus};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Keeps the content store and the topic bus in line with the filesystem.
///
/// Create and write events store the file's content when its digest changed
/// and publish `Created` or `Updated`. Remove events drop the stored value,
/// and every value stored below a removed directory, and publish `Deleted`
/// for each. Failures are logged and never stop the caller's loop.
///
/// Cloning is cheap; every dispatch task holds its own clone.
#[derive(Clone)]
pub struct ChangeRouter {
    root: Arc<Path>,
    store: Arc<dyn ContentStore>,
    bus: Arc<dyn TopicBus>,
    registry: Arc<PathRegistry>,
    observer: Arc<FsObserver>,
    settle: Duration,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl ChangeRouter {
    /// Default delay between a native create/write event and reading the file.
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);

    /// Create a router for the tree under `root` (expected to be canonical).
    pub fn new(
        root: impl AsRef<Path>,
        store: Arc<dyn ContentStore>,
        bus: Arc<dyn TopicBus>,
        registry: Arc<PathRegistry>,
        observer: FsObserver,
    ) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
            store,
            bus,
            registry,
            observer: Arc::new(observer),
            settle: Self::DEFAULT_SETTLE,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Set how long to wait before reading a file after a native event.
    ///
    /// Editors and `write(2)` sequences emit several events per save; waiting
    /// lets them all read the final content so the digest check collapses them.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Record routing metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Root of the watched tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The content store this router writes to.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// The bus this router publishes to.
    pub fn bus(&self) -> &Arc<dyn TopicBus> {
        &self.bus
    }

    /// Directories currently under native observation.
    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    /// Delay between a native create/write event and reading the file.
    pub fn settle(&self) -> Duration {
        self.settle
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn metrics(&self) -> Option<&WatchMetrics> {
        self.metrics.as_ref()
    }

    /// Config path key of a filesystem path under the root.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        config_key(&self.root, path)
    }

    /// Handle one event, logging instead of returning any failure.
    pub async fn route(&self, event: FsEvent) {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(WatchMetrics::start_routing);

        let result = self.handle(&event).await;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match &result {
                Ok(_) => metrics.record_routing_success(timer),
                Err(_) => metrics.record_routing_failure(timer),
            }
        }

        if let Err(err) = result {
            error!(
                path = %event.path.display(),
                kind = ?event.kind,
                error = %err,
                "error while handling filesystem event"
            );
        }
    }

    /// Handle one event and return the kind of change published, if any.
    ///
    /// # Errors
    ///
    /// Returns IO errors from reading the file, store errors, and watch errors
    /// from registering a newly created directory.
    pub async fn handle(&self, event: &FsEvent) -> Result<Option<EventKind>> {
        match event.kind {
            FsEventKind::Create | FsEventKind::Write => {
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                }
                self.handle_upsert(event).await
            }
            FsEventKind::Remove => self.handle_remove(&event.path).await,
        }
    }

    async fn handle_upsert(&self, event: &FsEvent) -> Result<Option<EventKind>> {
        let metadata = match tokio::fs::metadata(&event.path).await {
            Ok(metadata) => metadata,
            // Gone again before we got to it; the remove event covers it.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if metadata.is_dir() {
            if event.kind == FsEventKind::Create && is_valid_path(&event.path) {
                let stats = walker::scan(self, &event.path).await?;
                debug!(
                    path = %event.path.display(),
                    directories = stats.directories_registered,
                    files = stats.files_synthesized,
                    "scanned new directory"
                );
            }
            return Ok(None);
        }
        if !metadata.is_file() {
            return Ok(None);
        }
        self.route_file(&event.path).await
    }

    /// Store the current content of the regular file at `path` and publish
    /// the change, if any.
    ///
    /// Invalid names and paths outside the root are ignored. Content whose
    /// digest matches the stored one publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns IO errors from reading the file and store errors.
    pub async fn route_file(&self, path: &Path) -> Result<Option<EventKind>> {
        if !is_valid_path(path) {
            return Ok(None);
        }
        let Some(key) = self.key_for(path) else {
            return Ok(None);
        };

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let kind = match self.store.put_if_changed(&key, &raw)? {
            PutOutcome::Created(_) => EventKind::Created,
            PutOutcome::Updated(_) => EventKind::Updated,
            PutOutcome::Unchanged => {
                debug!(path = %key, "content unchanged, nothing to publish");
                return Ok(None);
            }
        };
        self.publish(&key, kind);
        Ok(Some(kind))
    }

    async fn handle_remove(&self, path: &Path) -> Result<Option<EventKind>> {
        let removed_dirs = self.registry.unregister_tree(path);
        for dir in &removed_dirs {
            if let Err(err) = self.observer.unwatch(dir).await {
                // The OS drops watches of deleted directories on its own.
                debug!(path = %dir.display(), error = %err, "unwatch after removal");
            }
        }
        if !removed_dirs.is_empty() {
            info!(
                path = %path.display(),
                directories = removed_dirs.len(),
                "stopped watching removed directory"
            );
        }

        if !is_valid_path(path) {
            return Ok(None);
        }
        let Some(key) = self.key_for(path) else {
            return Ok(None);
        };

        // A directory moved out of the tree reports only its own removal.
        let prefix = format!("{}/", key);
        for nested in self.store.keys().into_iter().filter(|k| k.starts_with(&prefix)) {
            self.store.delete(&nested);
            self.publish(&nested, EventKind::Deleted);
        }

        self.store.delete(&key);
        self.publish(&key, EventKind::Deleted);
        Ok(Some(EventKind::Deleted))
    }

    /// Register `dir` with the native watcher unless it already is.
    ///
    /// Returns `true` if the directory was newly registered.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`](crate::error::WatchError::Watch) if the
    /// native watch fails; the directory stays unregistered so a later walk
    /// retries it.
    pub async fn register_dir(&self, dir: &Path) -> Result<bool> {
        if !self.registry.register(dir) {
            return Ok(false);
        }
        if let Err(err) = self.observer.watch(dir).await {
            self.registry.unregister(dir);
            return Err(err);
        }
        info!(path = %dir.display(), "adding watcher");
        Ok(true)
    }

    fn publish(&self, key: &str, kind: EventKind) -> usize {
        if self.bus.create_topic(key) {
            debug!(path = %key, "created topic for changed config");
        }
        let delivered = self.bus.publish(key, &Event::new(kind, key));
        info!(path = %key, kind = %kind, subscribers = delivered, "published config event");

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_published(kind, delivered);
        }

        delivered
    }
}
