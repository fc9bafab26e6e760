//! # Update Listeners
//!
//! Typed subscriber lists keyed by (database, collection). Dispatch is
//! synchronous and in-call: a successful `update`/`replace` invokes every
//! listener for each touched document after the transaction commits.
//!
//! A watcher, fixed at construction, is registry-wide and also hears
//! removals; the client keeps its document cache coherent through it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::document::Document;
use crate::observability::{log_event_with_fields, Event};
use crate::store::{StoreError, StoreResult};

/// Callback receiving the document `_id` and its new content
pub type UpdateListener = Arc<dyn Fn(&str, &Document) + Send + Sync>;

/// Committed change to one document
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    Updated(&'a Document),
    Removed,
}

/// Callback receiving database, collection, `_id` and the change
pub type ChangeWatcher = Arc<dyn Fn(&str, &str, &str, Change<'_>) + Send + Sync>;

struct Subscription {
    id: String,
    callback: UpdateListener,
}

/// Registry of update listeners
#[derive(Default)]
pub struct ListenerRegistry {
    subscriptions: RwLock<HashMap<(String, String), Vec<Subscription>>>,
    watchers: RwLock<Vec<ChangeWatcher>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, returning its subscription id
    pub fn subscribe<F>(&self, database: &str, collection: &str, callback: F) -> StoreResult<String>
    where
        F: Fn(&str, &Document) + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.write().map_err(|_| {
            log_event_with_fields(
                Event::ListenerRejected,
                &[("collection", collection), ("database", database)],
            );
            StoreError::LockPoisoned
        })?;

        let id = Uuid::new_v4().to_string();
        subs.entry((database.to_string(), collection.to_string()))
            .or_default()
            .push(Subscription {
                id: id.clone(),
                callback: Arc::new(callback),
            });
        drop(subs);

        log_event_with_fields(
            Event::ListenerRegistered,
            &[("collection", collection), ("database", database), ("subscription", &id)],
        );
        Ok(id)
    }

    /// Registry whose watcher hears every committed update and removal
    pub fn watched<F>(watcher: F) -> Self
    where
        F: Fn(&str, &str, &str, Change<'_>) + Send + Sync + 'static,
    {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            watchers: RwLock::new(vec![Arc::new(watcher)]),
        }
    }

    /// Removes a listener; returns false if the id is unknown
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut subs = match self.subscriptions.write() {
            Ok(s) => s,
            Err(_) => return false,
        };

        let mut removed = false;
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != subscription_id);
            removed |= list.len() != before;
        }
        subs.retain(|_, list| !list.is_empty());
        removed
    }

    /// Number of listeners for a key
    pub fn len_for(&self, database: &str, collection: &str) -> usize {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subs| {
                subs.get(&(database.to_string(), collection.to_string()))
                    .map(Vec::len)
            })
            .unwrap_or(0)
    }

    /// Invokes every listener for the key; returns how many ran.
    ///
    /// Callbacks run without the registry lock held, so they may register
    /// further listeners.
    pub fn dispatch(&self, database: &str, collection: &str, id: &str, doc: &Document) -> usize {
        self.notify_watchers(database, collection, id, Change::Updated(doc));

        let callbacks: Vec<UpdateListener> = match self.subscriptions.read() {
            Ok(subs) => subs
                .get(&(database.to_string(), collection.to_string()))
                .map(|list| list.iter().map(|s| Arc::clone(&s.callback)).collect())
                .unwrap_or_default(),
            Err(_) => return 0,
        };

        if callbacks.is_empty() {
            return 0;
        }

        for callback in &callbacks {
            callback(id, doc);
        }

        let count = callbacks.len().to_string();
        log_event_with_fields(
            Event::ListenerDispatch,
            &[("collection", collection), ("database", database), ("id", id), ("listeners", &count)],
        );
        callbacks.len()
    }

    /// Tells watchers a document was removed; update listeners are not called
    pub fn removed(&self, database: &str, collection: &str, id: &str) {
        self.notify_watchers(database, collection, id, Change::Removed);
    }

    fn notify_watchers(&self, database: &str, collection: &str, id: &str, change: Change<'_>) {
        let watchers: Vec<ChangeWatcher> = match self.watchers.read() {
            Ok(list) => list.iter().map(Arc::clone).collect(),
            Err(_) => return,
        };
        for watcher in &watchers {
            watcher(database, collection, id, change);
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self
            .subscriptions
            .read()
            .map(|subs| subs.len())
            .unwrap_or(0);
        f.debug_struct("ListenerRegistry").field("keys", &keys).finish()
    }
}
