//! Client document cache
//!
//! Documents fetched by `_id` across databases, keyed by
//! (database, collection, id). Committed updates refresh an entry and
//! removals evict it; a dropped collection or closed database is only
//! forgotten through `forget_database` or `clear`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::document::Document;
use crate::store::{StoreError, StoreResult};

use super::listeners::Change;

type Key = (String, String, String);

fn key(database: &str, collection: &str, id: &str) -> Key {
    (database.to_string(), collection.to_string(), id.to_string())
}

#[derive(Default)]
pub(crate) struct DocumentCache {
    entries: Mutex<HashMap<Key, Document>>,
}

impl DocumentCache {
    pub(crate) fn get(&self, database: &str, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(&key(database, collection, id)).cloned())
    }

    pub(crate) fn put(&self, database: &str, collection: &str, id: &str, doc: Document) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key(database, collection, id), doc);
        Ok(())
    }

    /// Applies a committed change to an entry that is already cached
    pub(crate) fn observe(&self, database: &str, collection: &str, id: &str, change: Change<'_>) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let key = key(database, collection, id);
        match change {
            Change::Updated(doc) => {
                if let Some(slot) = entries.get_mut(&key) {
                    *slot = doc.clone();
                }
            }
            Change::Removed => {
                entries.remove(&key);
            }
        }
    }

    pub(crate) fn forget_database(&self, database: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .retain(|(db, _, _), _| db != database);
        Ok(())
    }

    /// Empties the cache, returning how many entries were dropped
    pub(crate) fn clear(&self) -> StoreResult<usize> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        let dropped = entries.len();
        entries.clear();
        Ok(dropped)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_observe_refreshes_only_cached_entries() {
        let cache = DocumentCache::default();
        cache.put("app", "users", "u1", doc(json!({"age": 1}))).unwrap();

        cache.observe("app", "users", "u1", Change::Updated(&doc(json!({"age": 2}))));
        cache.observe("app", "users", "u2", Change::Updated(&doc(json!({"age": 9}))));

        assert_eq!(cache.get("app", "users", "u1").unwrap(), Some(doc(json!({"age": 2}))));
        assert_eq!(cache.get("app", "users", "u2").unwrap(), None);
    }

    #[test]
    fn test_removal_evicts() {
        let cache = DocumentCache::default();
        cache.put("app", "users", "u1", doc(json!({}))).unwrap();
        cache.observe("app", "users", "u1", Change::Removed);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_forget_database_and_clear() {
        let cache = DocumentCache::default();
        cache.put("a", "users", "u1", doc(json!({}))).unwrap();
        cache.put("b", "users", "u1", doc(json!({}))).unwrap();

        cache.forget_database("a").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.len(), 0);
    }
}
