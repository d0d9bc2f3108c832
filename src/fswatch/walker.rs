//! Periodic reconciliation of the watched tree.

use super::filter::{is_valid_file_name, is_valid_path};
use super::router::ChangeRouter;
use crate::error::{Result, WatchError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Directories newly registered with the native watcher.
    pub directories_registered: usize,
    /// Files found on disk without a stored value and routed as creations.
    pub files_synthesized: usize,
}

/// Walks the whole tree on a fixed period.
///
/// Every directory not yet observed gets registered, and every valid file
/// without a stored value gets routed as if the OS had reported its creation.
/// This catches whatever the native watcher missed, including files that
/// already existed at startup and entries created before their directory's
/// watch was in place.
pub struct TreeWalker {
    router: ChangeRouter,
    interval: Duration,
}

impl TreeWalker {
    /// Default period between walks.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a walker over the router's root.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn new(router: ChangeRouter, interval: Duration) -> Self {
        Self {
            router,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Period between walks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass over the whole tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be listed. Failures for single
    /// entries are logged and skipped.
    pub async fn walk(&self) -> Result<WalkStats> {
        debug!(root = %self.router.root().display(), "walking config tree");
        scan(&self.router, self.router.root()).await
    }

    /// Walk every interval until `cancel` fires.
    ///
    /// The first tick comes one interval after the call; callers run the
    /// initial pass themselves so startup failures surface.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("tree walker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.walk().await {
                        Ok(stats) if stats != WalkStats::default() => {
                            info!(
                                directories = stats.directories_registered,
                                files = stats.files_synthesized,
                                "walk picked up missed changes"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "error walking config tree"),
                    }

                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = self.router.metrics() {
                        metrics.update_content_age();
                    }
                }
            }
        }
    }
}

/// Entries found under a directory, split by type.
#[derive(Debug, Default)]
struct Listing {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// List `dir` and everything below it, skipping hidden directories.
async fn discover(dir: &Path) -> Result<Listing> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut listing = Listing::default();
        let walker = WalkDir::new(&dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || entry.file_name().to_str().is_some_and(is_valid_file_name)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Raced with a removal, or unreadable; the next walk retries.
                    debug!(error = %err, "skipping entry during walk");
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                listing.dirs.push(entry.into_path());
            } else if file_type.is_file() || (file_type.is_symlink() && entry.path().is_file()) {
                listing.files.push(entry.into_path());
            }
        }
        listing
    })
    .await
    .map_err(|e| WatchError::Watch(format!("Tree walk task failed: {}", e)))
}

/// Register every directory under `dir` and route every valid file that has
/// no stored value yet.
///
/// Directories are registered before files are read so that an entry created
/// during the scan is seen either here or by the native watcher.
pub(crate) async fn scan(router: &ChangeRouter, dir: &Path) -> Result<WalkStats> {
    let listing = discover(dir).await?;
    let mut stats = WalkStats::default();

    for dir in &listing.dirs {
        match router.register_dir(dir).await {
            Ok(true) => stats.directories_registered += 1,
            Ok(false) => {}
            Err(err) => warn!(path = %dir.display(), error = %err, "failed to watch directory"),
        }
    }

    let missing: Vec<(&PathBuf, String)> = listing
        .files
        .iter()
        .filter(|file| is_valid_path(file))
        .filter_map(|file| router.key_for(file).map(|key| (file, key)))
        .filter(|(_, key)| !router.store().contains(key))
        .collect();

    // A file listed mid-write would otherwise be stored half written.
    if !missing.is_empty() && !router.settle().is_zero() {
        tokio::time::sleep(router.settle()).await;
    }

    for (file, key) in missing {
        warn!(path = %key, "found file missing from store, processing it as new");
        match router.route_file(file).await {
            Ok(Some(_)) => stats.files_synthesized += 1,
            Ok(None) => {}
            Err(err) => warn!(path = %key, error = %err, "failed to process discovered file"),
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fswatch::{FsObserver, PathRegistry};
    use crate::kv::InMemoryStore;
    use crate::pubsub::{EventKind, InMemoryBus};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn router(root: &Path) -> ChangeRouter {
        let (observer, _rx) = FsObserver::new().unwrap();
        ChangeRouter::new(
            root,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBus::default()),
            Arc::new(PathRegistry::new()),
            observer,
        )
        .with_settle(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_walk_discovers_existing_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("app/nested")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("top.yaml"), "a: 1").unwrap();
        fs::write(root.join("app/db.toml"), "url = 'x'").unwrap();
        fs::write(root.join("app/nested/deep.json"), "{}").unwrap();
        fs::write(root.join("app/db.toml.swp"), "junk").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();

        let walker = TreeWalker::new(router(&root), TreeWalker::DEFAULT_INTERVAL);
        let stats = walker.walk().await.unwrap();

        assert_eq!(stats.directories_registered, 3);
        assert_eq!(stats.files_synthesized, 3);
        assert_eq!(
            walker.router.store().keys(),
            vec!["app/db.toml", "app/nested/deep.json", "top.yaml"]
        );
        assert!(!walker.router.registry().is_registered(&root.join(".git")));
    }

    #[tokio::test]
    async fn test_second_walk_is_quiet() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("a.yaml"), "a: 1").unwrap();

        let walker = TreeWalker::new(router(&root), TreeWalker::DEFAULT_INTERVAL);
        walker.walk().await.unwrap();
        assert_eq!(walker.walk().await.unwrap(), WalkStats::default());
    }

    #[tokio::test]
    async fn test_walk_publishes_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let walker = TreeWalker::new(router(&root), TreeWalker::DEFAULT_INTERVAL);
        walker.walk().await.unwrap();

        walker.router.bus().create_topic("late.yaml");
        let sub = walker.router.bus().subscribe("late.yaml").unwrap();
        fs::write(root.join("late.yaml"), "x: y").unwrap();

        let stats = walker.walk().await.unwrap();
        assert_eq!(stats.files_synthesized, 1);
        assert_eq!(sub.try_recv().unwrap().kind(), EventKind::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let walker = TreeWalker::new(router(&root), Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(walker.run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
