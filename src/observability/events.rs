//! Observability events for litedoc
//!
//! Every line the store logs names one of these events. Events are explicit
//! and typed; each carries the severity it is logged at.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration file loaded
    ConfigLoaded,
    /// Client registry opened over a data directory
    ClientOpened,
    /// Database file opened and schema ensured
    DatabaseOpened,
    /// Cached database handle released
    DatabaseClosed,

    // Collections
    /// Collection tables exist and are ready
    CollectionReady,
    /// Collection tables dropped
    CollectionDropped,

    // Writes
    /// Single document inserted
    DocumentInserted,
    /// Batch insert committed
    BatchInserted,
    /// Batch insert failed and was rolled back
    BatchRolledBack,
    /// Update or replace committed
    DocumentsUpdated,
    /// Remove committed
    DocumentsRemoved,

    // Reads
    /// Criteria compiled against the index table
    QueryPlanned,
    /// Criteria evaluated by decoding every record
    QueryFullScan,
    /// A field holding a list of containers was skipped by the index engine
    FieldNotIndexed,
    /// Join attached foreign documents
    JoinComplete,
    /// Aggregation pipeline finished
    AggregateComplete,

    // Indexes and relations
    /// User index created
    IndexCreated,
    /// User index dropped
    IndexDropped,
    /// Relation row written
    RelationCreated,

    // Listeners
    /// Update listener registered
    ListenerRegistered,
    /// Update listeners invoked for a document
    ListenerDispatch,
    /// Listener registry lock poisoned; the subscription was not stored
    ListenerRejected,

    // Cross-database
    /// Documents loaded into the client cache in one batch
    DocumentsPreloaded,
    /// Client document cache emptied
    CacheCleared,
    /// Documents copied from one database to another
    DataMigrated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ClientOpened => "CLIENT_OPENED",
            Event::DatabaseOpened => "DATABASE_OPENED",
            Event::DatabaseClosed => "DATABASE_CLOSED",

            Event::CollectionReady => "COLLECTION_READY",
            Event::CollectionDropped => "COLLECTION_DROPPED",

            Event::DocumentInserted => "DOCUMENT_INSERTED",
            Event::BatchInserted => "BATCH_INSERTED",
            Event::BatchRolledBack => "BATCH_ROLLED_BACK",
            Event::DocumentsUpdated => "DOCUMENTS_UPDATED",
            Event::DocumentsRemoved => "DOCUMENTS_REMOVED",

            Event::QueryPlanned => "QUERY_PLANNED",
            Event::QueryFullScan => "QUERY_FULL_SCAN",
            Event::FieldNotIndexed => "FIELD_NOT_INDEXED",
            Event::JoinComplete => "JOIN_COMPLETE",
            Event::AggregateComplete => "AGGREGATE_COMPLETE",

            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexDropped => "INDEX_DROPPED",
            Event::RelationCreated => "RELATION_CREATED",

            Event::ListenerRegistered => "LISTENER_REGISTERED",
            Event::ListenerDispatch => "LISTENER_DISPATCH",
            Event::ListenerRejected => "LISTENER_REJECTED",

            Event::DocumentsPreloaded => "DOCUMENTS_PRELOADED",
            Event::CacheCleared => "CACHE_CLEARED",
            Event::DataMigrated => "DATA_MIGRATED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryPlanned | Event::DocumentInserted | Event::ListenerDispatch => {
                Severity::Trace
            }
            Event::BatchRolledBack | Event::FieldNotIndexed => Severity::Warn,
            Event::ListenerRejected => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
