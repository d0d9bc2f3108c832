//! Content store: the latest value per config path.
//!
//! The store is the single source of truth for "did content change". Values
//! carry a digest of the raw bytes plus a compressed payload, see
//! [`ContentValue`].

mod in_memory;
pub mod value;

pub use in_memory::InMemoryStore;
pub use value::ContentValue;

use crate::error::{Result, WatchError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Result of a conditional write, see [`ContentStore::put_if_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The path had no value before.
    Created(ContentValue),
    /// The path had a value with a different digest.
    Updated(ContentValue),
    /// The stored digest already matches; nothing was written.
    Unchanged,
}

impl PutOutcome {
    /// Returns `true` unless the write was a no-op.
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Storage capability for configuration content.
///
/// Implementations must be safe to share between the change router, the
/// tree walker and request handlers.
pub trait ContentStore: Send + Sync {
    /// Store `raw` under `path`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Compression`] if the payload cannot be encoded; in
    /// that case nothing is stored.
    fn put(&self, path: &str, raw: &[u8]) -> Result<ContentValue>;

    /// Fetch the current value of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotFound`] if nothing is stored under `path`.
    fn get(&self, path: &str) -> Result<ContentValue>;

    /// Remove `path`. Removing an absent path is a no-op.
    fn delete(&self, path: &str);

    /// Store `raw` only if its digest differs from the stored one.
    ///
    /// The default composes [`get`](Self::get) and [`put`](Self::put) and is
    /// therefore not atomic; backends should override it with a
    /// compare-and-put.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying get or put.
    fn put_if_changed(&self, path: &str, raw: &[u8]) -> Result<PutOutcome> {
        let digest = value::digest(raw);
        match self.get(path) {
            Ok(current) if current.digest() == digest => Ok(PutOutcome::Unchanged),
            Ok(_) => self.put(path, raw).map(PutOutcome::Updated),
            Err(err) if err.is_not_found() => self.put(path, raw).map(PutOutcome::Created),
            Err(err) => Err(err),
        }
    }

    /// All stored paths, sorted.
    fn keys(&self) -> Vec<String>;

    /// Number of stored paths.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `path` has a stored value.
    fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }
}

/// Statically known content store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreKind {
    /// [`InMemoryStore`]
    #[default]
    InMemory,
}

impl StoreKind {
    /// The name used in settings and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in-memory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-memory" => Ok(Self::InMemory),
            other => Err(WatchError::NotImplemented {
                component: "store",
                kind: other.to_string(),
            }),
        }
    }
}

/// Build a content store of the given kind.
pub fn new_store(kind: StoreKind) -> Arc<dyn ContentStore> {
    match kind {
        StoreKind::InMemory => Arc::new(InMemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[test]
    fn test_store_kind_from_name() {
        assert_eq!("in-memory".parse::<StoreKind>().unwrap(), StoreKind::InMemory);
        assert_eq!(StoreKind::InMemory.to_string(), "in-memory");

        let err = "foo".parse::<StoreKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "[NOT_IMPLEMENTED_ERROR] foo is not a supported implementation of store"
        );
    }

    #[test]
    fn test_new_store() {
        let store = new_store(StoreKind::InMemory);
        assert!(store.is_empty());
        store.put("foo", b"bar").unwrap();
        assert!(store.contains("foo"));
    }

    /// A store that only implements the required methods, to exercise the
    /// default `put_if_changed`.
    #[derive(Default)]
    struct PlainStore(Mutex<HashMap<String, ContentValue>>);

    impl ContentStore for PlainStore {
        fn put(&self, path: &str, raw: &[u8]) -> Result<ContentValue> {
            let value = ContentValue::new(raw)?;
            self.0.lock().insert(path.to_string(), value.clone());
            Ok(value)
        }

        fn get(&self, path: &str) -> Result<ContentValue> {
            self.0
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| WatchError::not_found(path))
        }

        fn delete(&self, path: &str) {
            self.0.lock().remove(path);
        }

        fn keys(&self) -> Vec<String> {
            self.0.lock().keys().cloned().collect()
        }

        fn len(&self) -> usize {
            self.0.lock().len()
        }
    }

    #[test]
    fn test_default_put_if_changed() {
        let store = PlainStore::default();
        assert!(matches!(
            store.put_if_changed("x", b"1").unwrap(),
            PutOutcome::Created(_)
        ));
        assert_eq!(store.put_if_changed("x", b"1").unwrap(), PutOutcome::Unchanged);
        assert!(matches!(
            store.put_if_changed("x", b"2").unwrap(),
            PutOutcome::Updated(_)
        ));
    }
}
