//! Store error types
//!
//! Error codes:
//! - DOC_STORE_SQLITE / DOC_STORE_CONSTRAINT
//! - DOC_STORE_SERIALIZATION
//! - DOC_STORE_INVALID_DOCUMENT
//! - DOC_STORE_INVALID_NAME
//! - DOC_STORE_INVALID_RELATION
//! - DOC_STORE_ID_MISMATCH
//! - DOC_STORE_LOCK_POISONED
//! - DOC_STORE_IO
//! - query, update, pipeline and config errors keep their own `DOC_*` codes
//!
//! Any error raised inside a mutating call rolls back that call's
//! transaction before it reaches the caller.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::query::QueryError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the underlying record store, including constraint violations
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored or supplied document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed filter, patch or pipeline
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Client opened with an unusable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Document that is not an object or carries a malformed `_id`
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Database, collection or index field name that cannot be used
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Malformed relation descriptor or missing source document
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    /// Replacement carrying an `_id` different from the stored one
    #[error("Replacement _id '{found}' does not match stored _id '{expected}'")]
    IdMismatch { expected: String, found: String },

    /// A thread panicked while holding the connection
    #[error("Connection lock poisoned")]
    LockPoisoned,

    /// Filesystem error around the data directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for unique or foreign key violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
        )
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Sqlite(_) if self.is_constraint_violation() => "DOC_STORE_CONSTRAINT",
            StoreError::Sqlite(_) => "DOC_STORE_SQLITE",
            StoreError::Serialization(_) => "DOC_STORE_SERIALIZATION",
            StoreError::Query(e) => e.code(),
            StoreError::Config(e) => e.code(),
            StoreError::InvalidDocument(_) => "DOC_STORE_INVALID_DOCUMENT",
            StoreError::InvalidName { .. } => "DOC_STORE_INVALID_NAME",
            StoreError::InvalidRelation(_) => "DOC_STORE_INVALID_RELATION",
            StoreError::IdMismatch { .. } => "DOC_STORE_ID_MISMATCH",
            StoreError::LockPoisoned => "DOC_STORE_LOCK_POISONED",
            StoreError::Io(_) => "DOC_STORE_IO",
        }
    }
}
