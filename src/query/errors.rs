//! Query error types
//!
//! Error codes:
//! - DOC_QUERY_INVALID_FILTER
//! - DOC_QUERY_UNSUPPORTED_OPERATOR
//! - DOC_QUERY_INVALID_REGEX
//! - DOC_UPDATE_INVALID
//! - DOC_UPDATE_RESERVED_FIELD
//! - DOC_PIPELINE_INVALID
//!
//! All of these reject the request before any data is touched.

use thiserror::Error;

/// Result type for parsing and compiling filters, patches and pipelines
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while interpreting caller-supplied query documents
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Malformed filter document
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// `$`-prefixed key that is not supported in this position
    #[error("Unsupported operator '{0}'")]
    UnsupportedOperator(String),

    /// `$regex` pattern that does not compile
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// Malformed update patch
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Update targeting a store-managed field
    #[error("Field '{0}' is managed by the store and cannot be updated")]
    ReservedField(String),

    /// Malformed aggregation pipeline
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl QueryError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidFilter(_) => "DOC_QUERY_INVALID_FILTER",
            QueryError::UnsupportedOperator(_) => "DOC_QUERY_UNSUPPORTED_OPERATOR",
            QueryError::InvalidRegex { .. } => "DOC_QUERY_INVALID_REGEX",
            QueryError::InvalidUpdate(_) => "DOC_UPDATE_INVALID",
            QueryError::ReservedField(_) => "DOC_UPDATE_RESERVED_FIELD",
            QueryError::InvalidPipeline(_) => "DOC_PIPELINE_INVALID",
        }
    }
}
