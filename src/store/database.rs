//! Database handle
//!
//! One SQLite connection shared by every collection handle of the database.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::client::ListenerRegistry;
use crate::config::StoreConfig;
use crate::observability::{log_event_with_fields, Event};

use super::collection::Collection;
use super::errors::{StoreError, StoreResult};
use super::sqlite;

/// Named database
#[derive(Clone)]
pub struct Database {
    name: String,
    conn: Arc<Mutex<Connection>>,
    listeners: Arc<ListenerRegistry>,
}

impl Database {
    /// Opens (creating if needed) a database file
    pub fn open(name: &str, path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        Self::open_with_listeners(name, path, config, Arc::new(ListenerRegistry::new()))
    }

    /// Opens a private in-memory database
    pub fn open_in_memory(name: &str) -> StoreResult<Self> {
        Self::open_in_memory_with_listeners(name, Arc::new(ListenerRegistry::new()))
    }

    pub(crate) fn open_with_listeners(
        name: &str,
        path: &Path,
        config: &StoreConfig,
        listeners: Arc<ListenerRegistry>,
    ) -> StoreResult<Self> {
        let conn = sqlite::open(path, config)?;
        let path = path.display().to_string();
        log_event_with_fields(Event::DatabaseOpened, &[("database", name), ("path", &path)]);
        Ok(Self::from_connection(name, conn, listeners))
    }

    pub(crate) fn open_in_memory_with_listeners(
        name: &str,
        listeners: Arc<ListenerRegistry>,
    ) -> StoreResult<Self> {
        let conn = sqlite::open_in_memory(&StoreConfig::new(":memory:"))?;
        log_event_with_fields(Event::DatabaseOpened, &[("database", name), ("path", ":memory:")]);
        Ok(Self::from_connection(name, conn, listeners))
    }

    fn from_connection(
        name: &str,
        conn: Connection,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            listeners,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Update listeners consulted by this database's collections
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Collection handle, creating its tables on first use
    pub fn collection(&self, name: &str) -> StoreResult<Collection> {
        sqlite::ensure_collection(&*self.lock()?, name)?;
        log_event_with_fields(
            Event::CollectionReady,
            &[("collection", name), ("database", &self.name)],
        );
        Ok(Collection::new(
            &self.name,
            name,
            Arc::clone(&self.conn),
            Arc::clone(&self.listeners),
        ))
    }

    /// Names of existing collections, sorted
    pub fn list_collections(&self) -> StoreResult<Vec<String>> {
        sqlite::list_collections(&*self.lock()?)
    }

    /// Drops a collection with its index rows; returns false if it did not exist
    pub fn drop_collection(&self, name: &str) -> StoreResult<bool> {
        let dropped = sqlite::drop_collection(&mut *self.lock()?, name)?;
        if dropped {
            log_event_with_fields(
                Event::CollectionDropped,
                &[("collection", name), ("database", &self.name)],
            );
        }
        Ok(dropped)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}
