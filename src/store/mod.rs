//! Document Store for litedoc
//!
//! Persists documents in SQLite through `rusqlite`:
//! - one document table and one index table per collection
//! - one shared `_relations` table per database
//!
//! Writers:
//! - document and index tables: `Collection` mutations only
//! - relations table: `Collection::relate_to` only
//!
//! Relations are not validated or cleaned when a document is removed.

mod collection;
mod database;
mod errors;
mod join;
mod sqlite;

pub use collection::{Collection, IndexInfo, Relation};
pub use database::Database;
pub use errors::{StoreError, StoreResult};
pub use join::JoinMode;
pub use sqlite::{validate_collection_name, RELATIONS_TABLE};
