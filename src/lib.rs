//! litedoc - an embedded document store on SQLite
//!
//! Schema-flexible JSON documents in named collections, each persisted as
//! a record table plus a flattened index table inside one SQLite file per
//! database.
//!
//! ```no_run
//! use litedoc::{Client, StoreConfig};
//! use serde_json::json;
//!
//! let client = Client::open(StoreConfig::new("./data"))?;
//! let users = client.database("app")?.collection("users")?;
//! users.insert(json!({"name": "Eka", "age": 25}))?;
//! let adults = users.find(json!({"age": {"$gte": 18}}))?.to_vec();
//! # Ok::<(), litedoc::StoreError>(())
//! ```

pub mod aggregate;
pub mod cli;
pub mod client;
pub mod config;
pub mod cursor;
pub mod document;
pub mod index;
pub mod observability;
pub mod query;
pub mod store;
pub mod update;

pub use aggregate::Pipeline;
pub use client::Client;
pub use config::{ConfigError, StoreConfig};
pub use cursor::{Cursor, SortDirection, SortSpec};
pub use document::Document;
pub use query::{Filter, QueryError};
pub use store::{Collection, Database, JoinMode, StoreError, StoreResult};
pub use update::Update;
