//! Native filesystem observation.

use crate::error::{Result, WatchError};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, mpsc};
use tracing::error;

/// Classification of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// An entry appeared.
    Create,
    /// An entry's content (or metadata) changed.
    Write,
    /// An entry went away.
    Remove,
}

/// A change to one path, either reported by the OS or synthesized by the
/// tree walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// What happened.
    pub kind: FsEventKind,
    /// Absolute path of the entry.
    pub path: PathBuf,
}

impl FsEvent {
    /// Create an event.
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Per-directory native watcher.
///
/// Wraps the platform watcher from the `notify` crate. Directories are watched
/// non-recursively; the tree walker registers each one individually.
/// Translated events are delivered on the channel returned by [`FsObserver::new`].
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::fswatch::FsObserver;
///
/// # async fn example() -> confwatch::error::Result<()> {
/// let (observer, mut events) = FsObserver::new()?;
/// observer.watch("/etc/myapp".as_ref()).await?;
///
/// while let Some(event) = events.recv().await {
///     println!("{:?} {}", event.kind, event.path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct FsObserver {
    watcher: Mutex<RecommendedWatcher>,
}

impl FsObserver {
    /// Create the native watcher.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`] if the platform watcher cannot be created.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<FsEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<FsEvent>();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for ev in translate(event) {
                        // Receiver dropped means we are shutting down
                        let _ = event_tx.send(ev);
                    }
                }
                Err(err) => error!(error = %err, "error watching for filesystem changes"),
            }
        })
        .map_err(|e| WatchError::Watch(format!("Failed to create file watcher: {}", e)))?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
            },
            event_rx,
        ))
    }

    /// Start observing the entries of directory `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`] if the directory cannot be watched.
    pub async fn watch(&self, dir: &Path) -> Result<()> {
        let mut watcher = self.watcher.lock().await;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Watch(format!("Failed to watch {}: {}", dir.display(), e)))
    }

    /// Stop observing `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Watch`] if the directory was not watched, which
    /// is expected when the OS already dropped the watch of a removed directory.
    pub async fn unwatch(&self, dir: &Path) -> Result<()> {
        let mut watcher = self.watcher.lock().await;
        watcher
            .unwatch(dir)
            .map_err(|e| WatchError::Watch(format!("Failed to unwatch {}: {}", dir.display(), e)))
    }
}

/// Map a `notify` event onto create/write/remove events.
pub(crate) fn translate(event: notify::Event) -> Vec<FsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Remove(_) => FsEventKind::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FsEventKind::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![
                    FsEvent::new(FsEventKind::Remove, from),
                    FsEvent::new(FsEventKind::Create, to),
                ],
                _ => Vec::new(),
            };
        }
        // Backends that cannot tell which side of a rename they saw
        EventKind::Modify(ModifyKind::Name(_)) => {
            return event
                .paths
                .into_iter()
                .map(|path| {
                    let kind = if path.exists() {
                        FsEventKind::Create
                    } else {
                        FsEventKind::Remove
                    };
                    FsEvent::new(kind, path)
                })
                .collect();
        }
        EventKind::Modify(_) => FsEventKind::Write,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => FsEventKind::Write,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| FsEvent::new(kind, path))
        .collect()
}
