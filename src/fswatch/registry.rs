//! Bookkeeping of directories under native observation.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Set of directories currently registered with the native watcher.
///
/// Registration is idempotent; at most one entry exists per directory.
#[derive(Debug, Default)]
pub struct PathRegistry {
    dirs: Mutex<HashSet<PathBuf>>,
}

impl PathRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`. Returns `false` if it was already registered.
    pub fn register(&self, path: &Path) -> bool {
        self.dirs.lock().insert(path.to_path_buf())
    }

    /// Returns `true` if `path` is registered.
    pub fn is_registered(&self, path: &Path) -> bool {
        self.dirs.lock().contains(path)
    }

    /// Unregister `path`. Returns `false` if it was not registered.
    pub fn unregister(&self, path: &Path) -> bool {
        self.dirs.lock().remove(path)
    }

    /// Unregister `path` and every registered directory below it, returning
    /// what was removed.
    pub fn unregister_tree(&self, path: &Path) -> Vec<PathBuf> {
        let mut dirs = self.dirs.lock();
        let removed: Vec<PathBuf> = dirs
            .iter()
            .filter(|dir| dir.starts_with(path))
            .cloned()
            .collect();
        for dir in &removed {
            dirs.remove(dir);
        }
        removed
    }

    /// Registered directories, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.dirs.lock().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of registered directories.
    pub fn len(&self) -> usize {
        self.dirs.lock().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_is_idempotent() {
        let registry = PathRegistry::new();
        let dir = Path::new("/srv/configs");

        assert!(registry.register(dir));
        assert!(!registry.register(dir));
        assert!(registry.is_registered(dir));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(dir));
        assert!(!registry.unregister(dir));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_tree() {
        let registry = PathRegistry::new();
        registry.register(Path::new("/r"));
        registry.register(Path::new("/r/a"));
        registry.register(Path::new("/r/a/b"));
        registry.register(Path::new("/r/ab"));

        let mut removed = registry.unregister_tree(Path::new("/r/a"));
        removed.sort();
        assert_eq!(removed, vec![PathBuf::from("/r/a"), PathBuf::from("/r/a/b")]);
        assert_eq!(registry.paths(), vec![PathBuf::from("/r"), PathBuf::from("/r/ab")]);
    }

    #[test]
    fn test_concurrent_register() {
        let registry = Arc::new(PathRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(Path::new("/same")))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }
}
