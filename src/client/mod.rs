//! Client registry for litedoc
//!
//! A `Client` owns every named database under one data directory
//! (`<data_dir>/<name>.sqlite`), caches their handles, and owns the update
//! listener registry shared by all of them. Handles live until `close` or
//! until the client is dropped.
//!
//! Cross-database lookups (`get_document`, `get_related`, `embed_data`)
//! go through a document cache that committed updates and removals keep
//! current. `preload_documents` fills it in one query; `clear_cache`
//! empties it.

mod cache;
mod listeners;

pub use listeners::{Change, ChangeWatcher, ListenerRegistry, UpdateListener};

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::config::StoreConfig;
use crate::document::{document_id, Document};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::query::Filter;
use crate::store::{Database, StoreError, StoreResult};

use cache::DocumentCache;

const DATABASE_EXTENSION: &str = "sqlite";

enum Backing {
    Directory(StoreConfig),
    Memory,
}

/// Registry of named databases
pub struct Client {
    backing: Backing,
    databases: Mutex<HashMap<String, Database>>,
    listeners: Arc<ListenerRegistry>,
    cache: Arc<DocumentCache>,
}

impl Client {
    /// Opens a client over `config.data_dir`, creating the directory
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Logger::set_min_severity(config.severity()?);

        fs::create_dir_all(&config.data_dir)?;

        let data_dir = config.data_dir.display().to_string();
        log_event_with_fields(Event::ClientOpened, &[("data_dir", &data_dir)]);

        Ok(Self::with_backing(Backing::Directory(config)))
    }

    /// Client whose databases are private in-memory connections
    pub fn in_memory() -> Self {
        Self::with_backing(Backing::Memory)
    }

    fn with_backing(backing: Backing) -> Self {
        let cache = Arc::new(DocumentCache::default());
        let observer = Arc::clone(&cache);
        let listeners = ListenerRegistry::watched(move |database, collection, id, change| {
            observer.observe(database, collection, id, change)
        });

        Self {
            backing,
            databases: Mutex::new(HashMap::new()),
            listeners: Arc::new(listeners),
            cache,
        }
    }

    /// Cached handle for a named database, opened on first use
    pub fn database(&self, name: &str) -> StoreResult<Database> {
        validate_database_name(name)?;

        let mut databases = self.databases.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(db) = databases.get(name) {
            return Ok(db.clone());
        }

        let listeners = Arc::clone(&self.listeners);
        let db = match &self.backing {
            Backing::Directory(config) => {
                let path = database_path(config, name);
                Database::open_with_listeners(name, &path, config, listeners)?
            }
            Backing::Memory => Database::open_in_memory_with_listeners(name, listeners)?,
        };
        databases.insert(name.to_string(), db.clone());
        Ok(db)
    }

    /// Databases present in the data directory, plus open in-memory ones; sorted
    pub fn list_databases(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = match &self.backing {
            Backing::Directory(config) => fs::read_dir(&config.data_dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension().and_then(|e| e.to_str()) == Some(DATABASE_EXTENSION)
                })
                .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                .filter(|name| validate_database_name(name).is_ok())
                .collect(),
            Backing::Memory => self
                .databases
                .lock()
                .map_err(|_| StoreError::LockPoisoned)?
                .keys()
                .cloned()
                .collect(),
        };
        names.sort();
        Ok(names)
    }

    /// Drops the cached handle; returns false if it was not open.
    ///
    /// The connection closes once every clone of the handle is gone. An
    /// in-memory database is discarded with it.
    pub fn close(&self, name: &str) -> StoreResult<bool> {
        let removed = self
            .databases
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(name)
            .is_some();
        if removed {
            self.cache.forget_database(name)?;
            log_event_with_fields(Event::DatabaseClosed, &[("database", name)]);
        }
        Ok(removed)
    }

    /// Registers an update listener for `database`/`collection`
    pub fn on_update<F>(&self, database: &str, collection: &str, callback: F) -> StoreResult<String>
    where
        F: Fn(&str, &Document) + Send + Sync + 'static,
    {
        self.listeners.subscribe(database, collection, callback)
    }

    /// Removes an update listener
    pub fn remove_listener(&self, subscription_id: &str) -> bool {
        self.listeners.unsubscribe(subscription_id)
    }

    /// Document by `_id` from any database, served from the cache when present
    pub fn get_document(&self, database: &str, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        if let Some(doc) = self.cache.get(database, collection, id)? {
            return Ok(Some(doc));
        }

        let found = self.database(database)?.collection(collection)?.get(id)?;
        if let Some(doc) = &found {
            self.cache.put(database, collection, id, doc.clone())?;
        }
        Ok(found)
    }

    /// Follows id-valued fields of `source` to their documents.
    ///
    /// Each relation maps a field of `source` to `"database.collection"`.
    /// The result holds one key per field present in `source` with a string
    /// value: the referenced document, or null when it does not exist.
    pub fn get_related(&self, source: &Document, relations: &[(&str, &str)]) -> StoreResult<Document> {
        let mut related = Document::new();
        for (field, target) in relations {
            let (database, collection) = parse_target(target)?;
            if let Some(id) = source.get(*field).and_then(Value::as_str) {
                let doc = self.get_document(database, collection, id)?;
                related.insert(field.to_string(), doc.map(Value::Object).unwrap_or(Value::Null));
            }
        }
        Ok(related)
    }

    /// Documents whose field references `source_id`, described as
    /// `"database:collection:field"`
    pub fn get_many_related(&self, source_id: &str, descriptor: &str) -> StoreResult<Vec<Document>> {
        let (database, collection, field) = parse_descriptor(descriptor)?;
        let cursor = self
            .database(database)?
            .collection(collection)?
            .find(json!({ field: source_id }))?;
        Ok(cursor.to_vec())
    }

    /// A document with referenced documents embedded under new keys.
    ///
    /// Each rule maps an output key to `"database:collection:field"`, where
    /// `field` is a field of the source document holding the target `_id`.
    /// Returns None when the source document does not exist.
    pub fn embed_data(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        rules: &[(&str, &str)],
    ) -> StoreResult<Option<Document>> {
        let mut source = match self.get_document(database, collection, id)? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let mut embedded = Vec::with_capacity(rules.len());
        for (key, rule) in rules {
            let (target_db, target_coll, field) = parse_descriptor(rule)?;
            if let Some(target_id) = source.get(field).and_then(Value::as_str) {
                let doc = self.get_document(target_db, target_coll, target_id)?;
                embedded.push((key.to_string(), doc.map(Value::Object).unwrap_or(Value::Null)));
            }
        }

        source.extend(embedded);
        Ok(Some(source))
    }

    /// Loads the listed documents into the cache with one `$in` query;
    /// returns how many were found
    pub fn preload_documents(&self, database: &str, collection: &str, ids: &[&str]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let docs = self
            .database(database)?
            .collection(collection)?
            .find(json!({ "_id": { "$in": ids } }))?
            .to_vec();
        for doc in &docs {
            if let Some(id) = document_id(doc) {
                self.cache.put(database, collection, id, doc.clone())?;
            }
        }

        let loaded = docs.len().to_string();
        log_event_with_fields(
            Event::DocumentsPreloaded,
            &[("collection", collection), ("count", &loaded), ("database", database)],
        );
        Ok(docs.len())
    }

    /// Empties the document cache
    pub fn clear_cache(&self) -> StoreResult<()> {
        let dropped = self.cache.clear()?.to_string();
        log_event_with_fields(Event::CacheCleared, &[("entries", &dropped)]);
        Ok(())
    }

    /// Number of cached documents
    pub fn cached_documents(&self) -> usize {
        self.cache.len()
    }

    /// Copies matching documents of `collection` from one database to another
    /// in a single all-or-nothing batch; returns how many were copied.
    ///
    /// Copies keep their `_id` and get fresh timestamps.
    pub fn migrate(
        &self,
        from: &str,
        to: &str,
        collection: &str,
        filter: impl Into<Filter>,
    ) -> StoreResult<usize> {
        let docs: Vec<Value> = self
            .database(from)?
            .collection(collection)?
            .find(filter)?
            .into_iter()
            .map(Value::Object)
            .collect();

        let copied = self.database(to)?.collection(collection)?.insert_many(docs)?.len();

        let count = copied.to_string();
        log_event_with_fields(
            Event::DataMigrated,
            &[("collection", collection), ("count", &count), ("from", from), ("to", to)],
        );
        Ok(copied)
    }
}

/// Splits `"database:collection:field"`
fn parse_descriptor(descriptor: &str) -> StoreResult<(&str, &str, &str)> {
    let parts: Vec<&str> = descriptor.split(':').collect();
    match parts.as_slice() {
        [d, c, f] if !d.is_empty() && !c.is_empty() && !f.is_empty() => Ok((*d, *c, *f)),
        _ => Err(StoreError::InvalidRelation(format!(
            "descriptor '{}' must look like 'database:collection:field'",
            descriptor
        ))),
    }
}

/// Splits `"database.collection"` at the first dot; database names hold no dots
fn parse_target(target: &str) -> StoreResult<(&str, &str)> {
    match target.split_once('.') {
        Some((d, c)) if !d.is_empty() && !c.is_empty() => Ok((d, c)),
        _ => Err(StoreError::InvalidRelation(format!(
            "target '{}' must look like 'database.collection'",
            target
        ))),
    }
}

fn database_path(config: &StoreConfig, name: &str) -> PathBuf {
    config.data_dir.join(format!("{}.{}", name, DATABASE_EXTENSION))
}

/// Database names map to file names
pub fn validate_database_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::invalid_name(
            name,
            "database names may only contain letters, digits, '_' and '-'",
        ))
    }
}
