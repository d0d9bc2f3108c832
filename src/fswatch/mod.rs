//! Filesystem change detection.
//!
//! Two sources feed the [`ChangeRouter`]: the native watcher ([`FsObserver`]),
//! which observes each registered directory non-recursively, and the
//! [`TreeWalker`], which periodically registers new directories and picks up
//! files the native watcher missed. [`FsWatcher`] owns both and their tasks.

mod filter;
mod observer;
mod path;
mod registry;
mod router;
mod walker;

pub use filter::{is_valid_file_name, is_valid_path};
pub use observer::{FsEvent, FsEventKind, FsObserver};
pub use path::config_key;
pub use registry::PathRegistry;
pub use router::ChangeRouter;
pub use walker::{TreeWalker, WalkStats};

use crate::error::{Result, WatchError};
use crate::kv::ContentStore;
use crate::pubsub::TopicBus;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Tuning for a running [`FsWatcher`].
#[derive(Clone)]
pub struct WatchOptions {
    /// Period of the tree walker.
    pub walk_interval: Duration,
    /// Delay before reading a file after a native create/write event.
    pub settle: Duration,
    /// Metrics recorded by the router.
    #[cfg(feature = "metrics")]
    pub metrics: Option<WatchMetrics>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            walk_interval: TreeWalker::DEFAULT_INTERVAL,
            settle: ChangeRouter::DEFAULT_SETTLE,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

impl std::fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("walk_interval", &self.walk_interval)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

/// A running change detector.
///
/// Dropping the watcher cancels its tasks without waiting for them; call
/// [`FsWatcher::shutdown`] to also wait for in-flight dispatches.
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::fswatch::{FsWatcher, WatchOptions};
/// use confwatch::kv::InMemoryStore;
/// use confwatch::pubsub::InMemoryBus;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> confwatch::error::Result<()> {
/// let watcher = FsWatcher::spawn(
///     "/etc/myapp",
///     Arc::new(InMemoryStore::new()),
///     Arc::new(InMemoryBus::default()),
///     WatchOptions::default(),
///     CancellationToken::new(),
/// )
/// .await?;
///
/// // ... serve GetConfig / WatchConfig ...
///
/// watcher.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct FsWatcher {
    router: ChangeRouter,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl FsWatcher {
    /// Start watching the tree under `root`.
    ///
    /// Registers the root, runs a first full walk so that files already on
    /// disk are in the store when this returns, then spawns the event loop and
    /// the periodic walker. Both stop when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`] if `root` is not a directory or if the
    /// native watcher cannot be created or cannot watch the root.
    pub async fn spawn(
        root: impl AsRef<Path>,
        store: Arc<dyn ContentStore>,
        bus: Arc<dyn TopicBus>,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let root = tokio::fs::canonicalize(root.as_ref()).await.map_err(|e| {
            WatchError::Watch(format!(
                "Failed to resolve root folder {}: {}",
                root.as_ref().display(),
                e
            ))
        })?;
        if !tokio::fs::metadata(&root).await?.is_dir() {
            return Err(WatchError::Watch(format!(
                "Root folder {} is not a directory",
                root.display()
            )));
        }

        let (observer, events) = FsObserver::new()?;
        let router = ChangeRouter::new(&root, store, bus, Arc::new(PathRegistry::new()), observer)
            .with_settle(options.settle);
        #[cfg(feature = "metrics")]
        let router = match options.metrics {
            Some(metrics) => router.with_metrics(metrics),
            None => router,
        };

        router.register_dir(&root).await?;

        let walker = TreeWalker::new(router.clone(), options.walk_interval);
        let stats = walker.walk().await?;
        info!(
            root = %root.display(),
            directories = stats.directories_registered + 1,
            files = stats.files_synthesized,
            "initial walk complete"
        );

        let tracker = TaskTracker::new();
        tracker.spawn(walker.run(cancel.child_token()));
        tracker.spawn(event_loop(
            router.clone(),
            events,
            tracker.clone(),
            cancel.child_token(),
        ));

        info!(
            root = %root.display(),
            walk_interval_ms = options.walk_interval.as_millis() as u64,
            "watching config tree"
        );

        Ok(Self {
            router,
            cancel,
            tracker,
        })
    }

    /// The router shared by the event loop and the walker.
    pub fn router(&self) -> &ChangeRouter {
        &self.router
    }

    /// Canonical root of the watched tree.
    pub fn root(&self) -> &Path {
        self.router.root()
    }

    /// Stop the walker and the event loop and wait for in-flight dispatches.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(root = %self.root().display(), "stopped watching config tree");
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn event_loop(
    router: ChangeRouter,
    mut events: mpsc::UnboundedReceiver<FsEvent>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let router = router.clone();
                tracker.spawn(async move { router.route(event).await });
            }
        }
    }
    debug!("filesystem event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use crate::pubsub::InMemoryBus;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawn_rejects_missing_root() {
        let result = FsWatcher::spawn(
            "/nonexistent/confwatch/root",
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBus::default()),
            WatchOptions::default(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(WatchError::Watch(_))));
    }

    #[tokio::test]
    async fn test_spawn_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.yaml");
        fs::write(&file, "a: 1").unwrap();

        let result = FsWatcher::spawn(
            &file,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBus::default()),
            WatchOptions::default(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(WatchError::Watch(_))));
    }

    #[tokio::test]
    async fn test_spawn_loads_existing_files_and_shuts_down() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.yaml"), "a: 1").unwrap();

        let store: Arc<dyn ContentStore> = Arc::new(InMemoryStore::new());
        let watcher = FsWatcher::spawn(
            temp_dir.path(),
            Arc::clone(&store),
            Arc::new(InMemoryBus::default()),
            WatchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(store.get("a.yaml").unwrap().text().unwrap(), "a: 1");
        assert!(watcher.router().registry().is_registered(watcher.root()));

        tokio::time::timeout(Duration::from_secs(5), watcher.shutdown())
            .await
            .unwrap();
    }
}
