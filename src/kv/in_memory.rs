//! In-memory content store.

use super::value::{self, ContentValue};
use super::{ContentStore, PutOutcome};
use crate::error::{Result, WatchError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A [`ContentStore`] backed by a lock-guarded hash map.
///
/// Nothing survives a restart; the tree walker repopulates the store on startup.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    db: RwLock<HashMap<String, ContentValue>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for InMemoryStore {
    fn put(&self, path: &str, raw: &[u8]) -> Result<ContentValue> {
        // Encode before taking the lock; a failed encode stores nothing.
        let value = ContentValue::new(raw)?;
        self.db.write().insert(path.to_string(), value.clone());
        Ok(value)
    }

    fn get(&self, path: &str) -> Result<ContentValue> {
        self.db
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| WatchError::not_found(path))
    }

    fn delete(&self, path: &str) {
        self.db.write().remove(path);
    }

    fn put_if_changed(&self, path: &str, raw: &[u8]) -> Result<PutOutcome> {
        let digest = value::digest(raw);
        if self
            .db
            .read()
            .get(path)
            .is_some_and(|current| current.digest() == digest)
        {
            return Ok(PutOutcome::Unchanged);
        }

        let value = ContentValue::new(raw)?;

        // Re-check under the write lock: a concurrent dispatch for the same
        // path may have stored this content in the meantime.
        let mut db = self.db.write();
        match db.get(path) {
            Some(current) if current.digest() == value.digest() => Ok(PutOutcome::Unchanged),
            Some(_) => {
                db.insert(path.to_string(), value.clone());
                Ok(PutOutcome::Updated(value))
            }
            None => {
                db.insert(path.to_string(), value.clone());
                Ok(PutOutcome::Created(value))
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.db.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.db.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_in_memory_operations() {
        let db = InMemoryStore::new();

        let err = db.get("foo").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "[KEY_NOT_FOUND_ERROR] Key foo not found in store"
        );

        let stored = db.put("foo", b"bar").unwrap();
        let fetched = db.get("foo").unwrap();
        assert_eq!(stored, fetched);
        assert_eq!(fetched.text().unwrap(), "bar");

        db.delete("foo");
        assert!(db.get("foo").unwrap_err().is_not_found());

        // deleting again is not an error
        db.delete("foo");
        assert!(db.is_empty());
    }

    #[test]
    fn test_put_overwrites_unconditionally() {
        let db = InMemoryStore::new();
        let first = db.put("a.yaml", b"k: v").unwrap();
        let second = db.put("a.yaml", b"k: v").unwrap();
        assert_eq!(first.digest(), second.digest());
        assert!(second.last_modified() >= first.last_modified());
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_put_if_changed() {
        let db = InMemoryStore::new();

        assert!(matches!(
            db.put_if_changed("a.yaml", b"k: v").unwrap(),
            PutOutcome::Created(_)
        ));
        assert!(matches!(
            db.put_if_changed("a.yaml", b"k: v").unwrap(),
            PutOutcome::Unchanged
        ));

        let outcome = db.put_if_changed("a.yaml", b"k: v\nx: y").unwrap();
        match outcome {
            PutOutcome::Updated(value) => assert_eq!(value.text().unwrap(), "k: v\nx: y"),
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(db.get("a.yaml").unwrap().text().unwrap(), "k: v\nx: y");
    }

    #[test]
    fn test_concurrent_put_if_changed_reports_one_change() {
        let db = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.put_if_changed("race.yaml", b"same").unwrap())
            })
            .collect();

        let changed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(PutOutcome::is_changed)
            .count();
        assert_eq!(changed, 1);
    }

    #[test]
    fn test_keys_sorted() {
        let db = InMemoryStore::new();
        db.put("b.yaml", b"b").unwrap();
        db.put("a.yaml", b"a").unwrap();
        assert_eq!(db.keys(), vec!["a.yaml".to_string(), "b.yaml".to_string()]);
    }
}
