//! Document model for litedoc
//!
//! A document is an ordered mapping of string keys to JSON values. The store
//! reserves three top-level fields:
//!
//! - `_id`: string primary key, UUID v4 when the caller does not supply one
//! - `_created_at`: unix timestamp stamped once on insert
//! - `_updated_at`: unix timestamp refreshed on every write
//!
//! # Submodules
//!
//! - `path`: dot-path get / set / unset / exists over nested maps and lists
//! - `encode`: canonical scalar encoding and the numeric-aware comparator
//!   shared by the index, the query compiler, the cursor and aggregation

mod encode;
mod path;

pub use encode::{compare_encoded, compare_values, encode_scalar, is_numeric_str, numeric_value};
pub use path::{get_path, set_path, unset_path};

use serde_json::{Map, Value};

/// A schema-flexible document
pub type Document = Map<String, Value>;

/// Primary key field
pub const ID_FIELD: &str = "_id";

/// Creation timestamp field
pub const CREATED_AT_FIELD: &str = "_created_at";

/// Last-write timestamp field
pub const UPDATED_AT_FIELD: &str = "_updated_at";

/// Returns true if `field` is one of the store-managed top-level fields
pub fn is_reserved_field(field: &str) -> bool {
    let top = field.split('.').next().unwrap_or(field);
    matches!(top, ID_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD)
}

/// Returns the `_id` of a document if it holds a string
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}
