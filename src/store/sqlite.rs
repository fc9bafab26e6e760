//! SQLite substrate
//!
//! Opens and configures connections, registers the `doc_cmp` comparison
//! function, and owns the per-collection DDL.
//!
//! Layout per collection `c`:
//!
//! ```text
//! "c"        (id INTEGER PRIMARY KEY AUTOINCREMENT, doc TEXT NOT NULL)
//! "c_index"  (parent_id -> "c"(id) ON DELETE CASCADE, field, value, type)
//!            idx_c_parent (parent_id), idx_c_field_value (field, value),
//!            idx_c__id_unique UNIQUE (value) WHERE field = '_id'
//! ```
//!
//! plus one `_relations` table per database.

use std::path::Path;
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::document::compare_encoded;
use crate::query::{index_table, quote_ident, COMPARE_FUNCTION};

use super::errors::{StoreError, StoreResult};

/// Shared relations table
pub const RELATIONS_TABLE: &str = "_relations";

const INDEX_SUFFIX: &str = "_index";

/// Opens a database file
pub fn open(path: &Path, config: &StoreConfig) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, config)?;
    Ok(conn)
}

/// Opens a private in-memory database
pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, config)?;
    Ok(conn)
}

fn configure(conn: &Connection, config: &StoreConfig) -> StoreResult<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    // Values were checked against fixed lists by StoreConfig::validate
    conn.execute_batch(&format!(
        r#"
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = {};
        PRAGMA synchronous = {};
        PRAGMA cache_size = {};
        "#,
        config.journal_mode.to_ascii_uppercase(),
        config.synchronous.to_ascii_uppercase(),
        config.cache_size_kib
    ))?;

    register_compare(conn)?;

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {relations} (
          from_id TEXT NOT NULL,
          from_collection TEXT NOT NULL,
          to_id TEXT NOT NULL,
          to_collection TEXT NOT NULL,
          UNIQUE(from_id, to_id)
        );
        "#,
        relations = quote_ident(RELATIONS_TABLE)
    ))?;

    Ok(())
}

/// `doc_cmp(a, b)` returns -1, 0 or 1 with the numeric-aware rule
fn register_compare(conn: &Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        COMPARE_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = sql_text(ctx.get_raw(0));
            let b = sql_text(ctx.get_raw(1));
            Ok(compare_encoded(&a, &b) as i64)
        },
    )?;
    Ok(())
}

fn sql_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Rejects names that would collide with internal tables
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_name(name, "name must not be empty"));
    }
    if name.starts_with("sqlite_") {
        return Err(StoreError::invalid_name(name, "prefix 'sqlite_' is reserved"));
    }
    if name.starts_with('_') {
        return Err(StoreError::invalid_name(name, "prefix '_' is reserved"));
    }
    if name.ends_with(INDEX_SUFFIX) {
        return Err(StoreError::invalid_name(name, "suffix '_index' is reserved"));
    }
    Ok(())
}

/// Name of the index enforcing `_id` uniqueness
pub fn id_unique_index(collection: &str) -> String {
    format!("idx_{}__id_unique", collection)
}

/// Names of the indexes created with every collection
pub fn builtin_indexes(collection: &str) -> [String; 3] {
    [
        format!("idx_{}_parent", collection),
        format!("idx_{}_field_value", collection),
        id_unique_index(collection),
    ]
}

/// Creates the collection's tables if missing
pub fn ensure_collection(conn: &Connection, name: &str) -> StoreResult<()> {
    validate_collection_name(name)?;

    let table = quote_ident(name);
    let index = quote_ident(&index_table(name));
    let [parent, field_value, id_unique] = builtin_indexes(name).map(|n| quote_ident(&n));

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          doc TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {index} (
          parent_id INTEGER NOT NULL REFERENCES {table}(id) ON DELETE CASCADE,
          field TEXT NOT NULL,
          value TEXT,
          type INTEGER
        );

        CREATE INDEX IF NOT EXISTS {parent} ON {index}(parent_id);
        CREATE INDEX IF NOT EXISTS {field_value} ON {index}(field, value);
        CREATE UNIQUE INDEX IF NOT EXISTS {id_unique} ON {index}(value) WHERE field = '_id';
        "#
    ))?;

    Ok(())
}

/// Collection names in this database, sorted
pub fn list_collections(conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table'
        ORDER BY name ASC
        "#,
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names
        .into_iter()
        .filter(|n| validate_collection_name(n).is_ok())
        .collect())
}

/// Drops a collection and its index table; returns false if it did not exist
pub fn drop_collection(conn: &mut Connection, name: &str) -> StoreResult<bool> {
    validate_collection_name(name)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(false);
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
        quote_ident(&index_table(name)),
        quote_ident(name)
    ))?;
    tx.commit()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        open_in_memory(&StoreConfig::new(":memory:")).unwrap()
    }

    #[test]
    fn test_doc_cmp_is_numeric_aware() {
        let conn = memory();
        let cmp = |a: &str, b: &str| -> i64 {
            conn.query_row("SELECT doc_cmp(?1, ?2)", [a, b], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(cmp("9", "10"), -1);
        assert_eq!(cmp("10", "9"), 1);
        assert_eq!(cmp("abc", "abd"), -1);
        assert_eq!(cmp("2.50", "2.5"), 0);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = memory();
        let on: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(on, 1);
    }

    #[test]
    fn test_ensure_and_list_collections() {
        let mut conn = memory();
        ensure_collection(&conn, "users").unwrap();
        ensure_collection(&conn, "orders").unwrap();
        ensure_collection(&conn, "users").unwrap();

        assert_eq!(list_collections(&conn).unwrap(), vec!["orders", "users"]);

        assert!(drop_collection(&mut conn, "orders").unwrap());
        assert!(!drop_collection(&mut conn, "orders").unwrap());
        assert_eq!(list_collections(&conn).unwrap(), vec!["users"]);
    }

    #[test]
    fn test_reserved_names_rejected() {
        for bad in ["", "_relations", "sqlite_master", "users_index"] {
            let err = validate_collection_name(bad).unwrap_err();
            assert_eq!(err.code(), "DOC_STORE_INVALID_NAME", "name {:?}", bad);
        }
        assert!(validate_collection_name("users").is_ok());
    }
}
