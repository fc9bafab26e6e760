//! Document Store
//!
//! A `Collection` owns one document table and one index table. Every
//! mutating call runs in exactly one transaction covering every document it
//! touches; index rows are deleted and rebuilt from the new content on every
//! write and cascade away with their record.
//!
//! No lock is held across calls. A caller doing read-then-write gets no
//! atomicity against another caller doing the same.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::aggregate::Pipeline;
use crate::client::ListenerRegistry;
use crate::cursor::Cursor;
use crate::document::{
    document_id, is_reserved_field, Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::index::{flatten, IndexEntry, TypeTag};
use crate::observability::{log_event_with_fields, Event};
use crate::query::{
    index_table, quote_ident, CompiledQuery, Criteria, Filter, PredicateMatcher, QueryCompiler,
    QueryPlan,
};
use crate::update::Update;

use super::errors::{StoreError, StoreResult};
use super::sqlite::RELATIONS_TABLE;

/// Prefix of user index names; built-in indexes start with `idx_`
const USER_INDEX_PREFIX: &str = "uidx:";

/// User-created index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub field: String,
    pub unique: bool,
}

/// Directed edge between two documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub from_id: String,
    pub from_collection: String,
    pub to_id: String,
    pub to_collection: String,
}

/// Handle to one collection
#[derive(Clone)]
pub struct Collection {
    database: String,
    name: String,
    conn: Arc<Mutex<Connection>>,
    listeners: Arc<ListenerRegistry>,
}

impl Collection {
    pub(crate) fn new(
        database: &str,
        name: &str,
        conn: Arc<Mutex<Connection>>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            database: database.to_string(),
            name: name.to_string(),
            conn,
            listeners,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database
    pub fn database(&self) -> &str {
        &self.database
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ========== WRITES ==========

    /// Inserts one document and returns its `_id`
    pub fn insert(&self, doc: Value) -> StoreResult<String> {
        let (id, doc) = prepare_new(doc, now())?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        self.insert_tx(&tx, &doc)?;
        tx.commit()?;

        log_event_with_fields(
            Event::DocumentInserted,
            &[("collection", &self.name), ("id", &id)],
        );
        Ok(id)
    }

    /// Inserts every document or none of them
    pub fn insert_many(&self, docs: Vec<Value>) -> StoreResult<Vec<String>> {
        let stamp = now();
        let prepared = docs
            .into_iter()
            .map(|doc| prepare_new(doc, stamp))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (position, (_, doc)) in prepared.iter().enumerate() {
            if let Err(e) = self.insert_tx(&tx, doc) {
                // Dropping the transaction rolls back every earlier insert
                let position = position.to_string();
                log_event_with_fields(
                    Event::BatchRolledBack,
                    &[("collection", &self.name), ("error", &e.to_string()), ("position", &position)],
                );
                return Err(e);
            }
        }
        tx.commit()?;

        let count = prepared.len().to_string();
        log_event_with_fields(
            Event::BatchInserted,
            &[("collection", &self.name), ("count", &count)],
        );
        Ok(prepared.into_iter().map(|(id, _)| id).collect())
    }

    /// Applies a patch to every matching document; returns how many were touched
    pub fn update(&self, filter: impl Into<Filter>, patch: Value) -> StoreResult<usize> {
        let update = Update::parse(&patch)?;
        self.apply_update(filter.into(), &update)
    }

    /// Replaces the content of every matching document, keeping `_id` and `_created_at`
    pub fn replace(&self, filter: impl Into<Filter>, doc: Value) -> StoreResult<usize> {
        let update = Update::replace(&doc)?;
        self.apply_update(filter.into(), &update)
    }

    fn apply_update(&self, filter: Filter, update: &Update) -> StoreResult<usize> {
        let stamp = now();
        let touched = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let matches = self.resolve(&tx, filter)?;

            let mut touched = Vec::with_capacity(matches.len());
            for (rowid, current) in matches {
                if let Some(found) = update.replacement_id() {
                    check_replacement_id(&current, found)?;
                }
                let next = update.apply(&current, stamp);
                self.persist_tx(&tx, rowid, &next)?;
                touched.push(next);
            }
            tx.commit()?;
            touched
        };

        let count = touched.len().to_string();
        log_event_with_fields(
            Event::DocumentsUpdated,
            &[("collection", &self.name), ("count", &count)],
        );

        for doc in &touched {
            if let Some(id) = document_id(doc) {
                self.listeners.dispatch(&self.database, &self.name, id, doc);
            }
        }
        Ok(touched.len())
    }

    /// Deletes every matching document; returns how many were removed
    pub fn remove(&self, filter: impl Into<Filter>) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let matches = self.resolve(&tx, filter.into())?;

        let sql = format!("DELETE FROM {} WHERE id = ?1", quote_ident(&self.name));
        for (rowid, _) in &matches {
            tx.execute(&sql, params![rowid])?;
        }
        tx.commit()?;

        drop(conn);

        let count = matches.len().to_string();
        log_event_with_fields(
            Event::DocumentsRemoved,
            &[("collection", &self.name), ("count", &count)],
        );

        for (_, doc) in &matches {
            if let Some(id) = document_id(doc) {
                self.listeners.removed(&self.database, &self.name, id);
            }
        }
        Ok(matches.len())
    }

    fn insert_tx(&self, tx: &Transaction<'_>, doc: &Document) -> StoreResult<i64> {
        tx.execute(
            &format!("INSERT INTO {} (doc) VALUES (?1)", quote_ident(&self.name)),
            params![serde_json::to_string(doc)?],
        )?;
        let rowid = tx.last_insert_rowid();
        self.write_index_tx(tx, rowid, doc)?;
        Ok(rowid)
    }

    fn persist_tx(&self, tx: &Transaction<'_>, rowid: i64, doc: &Document) -> StoreResult<()> {
        tx.execute(
            &format!("UPDATE {} SET doc = ?1 WHERE id = ?2", quote_ident(&self.name)),
            params![serde_json::to_string(doc)?, rowid],
        )?;
        self.write_index_tx(tx, rowid, doc)
    }

    /// Replaces the record's index rows with those derived from `doc`
    fn write_index_tx(&self, tx: &Transaction<'_>, rowid: i64, doc: &Document) -> StoreResult<()> {
        let index = quote_ident(&index_table(&self.name));
        tx.execute(
            &format!("DELETE FROM {} WHERE parent_id = ?1", index),
            params![rowid],
        )?;

        let outcome = flatten(doc);
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {} (parent_id, field, value, type) VALUES (?1, ?2, ?3, ?4)",
            index
        ))?;
        for entry in &outcome.entries {
            stmt.execute(params![rowid, entry.field, entry.value, entry.type_tag.as_i64()])?;
        }

        for field in &outcome.unindexed {
            log_event_with_fields(
                Event::FieldNotIndexed,
                &[("collection", &self.name), ("field", field)],
            );
        }
        Ok(())
    }

    // ========== READS ==========

    /// Matching documents, in insertion order, wrapped in a cursor
    ///
    /// A predicate closure runs after the connection is released, so it may
    /// read this database.
    pub fn find(&self, filter: impl Into<Filter>) -> StoreResult<Cursor> {
        let docs: Vec<Document> = match filter.into() {
            Filter::Predicate(predicate) => {
                log_event_with_fields(Event::QueryFullScan, &[("collection", &self.name)]);
                let all = run_query(&*self.lock()?, &QueryCompiler::scan_all(&self.name))?;
                all.into_iter()
                    .map(|(_, doc)| doc)
                    .filter(|doc| predicate(doc))
                    .collect()
            }
            structured => {
                let conn = self.lock()?;
                self.resolve(&conn, structured)?
                    .into_iter()
                    .map(|(_, doc)| doc)
                    .collect()
            }
        };
        Ok(Cursor::new(docs))
    }

    /// First matching document in insertion order
    pub fn find_one(&self, filter: impl Into<Filter>) -> StoreResult<Option<Document>> {
        Ok(self.find(filter)?.limit(1).first())
    }

    /// Document with the given `_id`
    pub fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.find_one(json!({ ID_FIELD: id }))
    }

    /// Number of matching documents
    pub fn count(&self, filter: impl Into<Filter>) -> StoreResult<usize> {
        Ok(self.find(filter)?.count())
    }

    /// Index rows currently stored for a document, in field order
    pub fn index_entries(&self, id: &str) -> StoreResult<Vec<IndexEntry>> {
        let conn = self.lock()?;
        let index = quote_ident(&index_table(&self.name));
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT i.field, i.value, i.type FROM {index} i
            WHERE i.parent_id = (SELECT parent_id FROM {index} WHERE field = '_id' AND value = ?1)
            ORDER BY i.field ASC, i.value ASC
            "#
        ))?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(IndexEntry {
                field: row.get(0)?,
                value: row.get(1)?,
                type_tag: TypeTag::from_i64(row.get(2)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Runs an aggregation pipeline over the whole collection
    pub fn aggregate(&self, pipeline: &Value) -> StoreResult<Vec<Document>> {
        let pipeline = Pipeline::from_json(pipeline)?;
        let docs = self.find(Filter::all())?.to_vec();
        let input = docs.len().to_string();

        let out = pipeline.execute(docs);

        let output = out.len().to_string();
        let stages = pipeline.stages().len().to_string();
        log_event_with_fields(
            Event::AggregateComplete,
            &[
                ("collection", &self.name),
                ("input", &input),
                ("output", &output),
                ("stages", &stages),
            ],
        );
        Ok(out)
    }

    /// Resolves a filter to `(record id, document)` pairs in insertion order
    pub(crate) fn resolve(&self, conn: &Connection, filter: Filter) -> StoreResult<Vec<(i64, Document)>> {
        match filter {
            Filter::Structured(value) => {
                let criteria = Criteria::parse(&value)?;
                match QueryCompiler::compile(&self.name, criteria) {
                    QueryPlan::Indexed(query) => {
                        let joins = query.bindings.len().to_string();
                        log_event_with_fields(
                            Event::QueryPlanned,
                            &[("bindings", &joins), ("collection", &self.name)],
                        );
                        run_query(conn, &query)
                    }
                    QueryPlan::FullScan(criteria) => {
                        log_event_with_fields(Event::QueryFullScan, &[("collection", &self.name)]);
                        self.scan(conn, |doc| PredicateMatcher::matches(doc, &criteria))
                    }
                }
            }
            Filter::Predicate(predicate) => {
                log_event_with_fields(Event::QueryFullScan, &[("collection", &self.name)]);
                self.scan(conn, |doc| predicate(doc))
            }
        }
    }

    fn scan<F>(&self, conn: &Connection, keep: F) -> StoreResult<Vec<(i64, Document)>>
    where
        F: Fn(&Document) -> bool,
    {
        let all = run_query(conn, &QueryCompiler::scan_all(&self.name))?;
        Ok(all.into_iter().filter(|(_, doc)| keep(doc)).collect())
    }

    // ========== INDEX OPERATIONS ==========

    /// Creates a partial index over one field's index rows
    pub fn create_index(&self, field: &str, unique: bool) -> StoreResult<()> {
        validate_index_field(field)?;
        let name = user_index_name(&self.name, field, unique);
        let sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} (value) WHERE field = '{}'",
            if unique { "UNIQUE " } else { "" },
            quote_ident(&name),
            quote_ident(&index_table(&self.name)),
            field
        );

        self.lock()?.execute_batch(&sql)?;

        log_event_with_fields(
            Event::IndexCreated,
            &[("collection", &self.name), ("field", field), ("index", &name)],
        );
        Ok(())
    }

    /// Drops the user indexes on one field; absent indexes are ignored
    pub fn drop_index(&self, field: &str) -> StoreResult<()> {
        validate_index_field(field)?;
        let plain = quote_ident(&user_index_name(&self.name, field, false));
        let unique = quote_ident(&user_index_name(&self.name, field, true));

        self.lock()?
            .execute_batch(&format!("DROP INDEX IF EXISTS {plain}; DROP INDEX IF EXISTS {unique};"))?;

        log_event_with_fields(
            Event::IndexDropped,
            &[("collection", &self.name), ("field", field)],
        );
        Ok(())
    }

    /// User-created indexes, by field
    pub fn list_indexes(&self) -> StoreResult<Vec<IndexInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT name, sql FROM sqlite_master
            WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL
            ORDER BY name ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![index_table(&self.name)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut indexes: Vec<IndexInfo> = rows
            .into_iter()
            .filter(|(name, _)| name.starts_with(USER_INDEX_PREFIX))
            .filter_map(|(name, sql)| {
                let field = partial_index_field(&sql)?;
                Some(IndexInfo {
                    unique: sql.trim_start().to_ascii_uppercase().starts_with("CREATE UNIQUE"),
                    name,
                    field,
                })
            })
            .collect();
        indexes.sort_by(|a, b| a.field.cmp(&b.field).then(a.unique.cmp(&b.unique)));
        Ok(indexes)
    }

    // ========== RELATIONS ==========

    /// Records an edge from a document of this collection to any document.
    ///
    /// Only the source is checked; the target may live in another database.
    /// A second edge between the same ids overwrites the target collection.
    pub fn relate_to(&self, from_id: &str, to_collection: &str, to_id: &str) -> StoreResult<()> {
        if from_id.is_empty() || to_id.is_empty() {
            return Err(StoreError::InvalidRelation("ids must not be empty".into()));
        }
        if to_collection.is_empty() {
            return Err(StoreError::InvalidRelation(
                "target collection must not be empty".into(),
            ));
        }
        if self.get(from_id)?.is_none() {
            return Err(StoreError::InvalidRelation(format!(
                "source document '{}' not found in '{}'",
                from_id, self.name
            )));
        }

        self.lock()?.execute(
            &format!(
                r#"
                INSERT INTO {} (from_id, from_collection, to_id, to_collection)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (from_id, to_id) DO UPDATE SET to_collection = excluded.to_collection
                "#,
                quote_ident(RELATIONS_TABLE)
            ),
            params![from_id, self.name, to_id, to_collection],
        )?;

        log_event_with_fields(
            Event::RelationCreated,
            &[("from", from_id), ("from_collection", &self.name), ("to", to_id), ("to_collection", to_collection)],
        );
        Ok(())
    }

    /// Edges leaving a document of this collection
    pub fn get_relations(&self, from_id: &str) -> StoreResult<Vec<Relation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT from_id, from_collection, to_id, to_collection FROM {}
            WHERE from_id = ?1 AND from_collection = ?2
            ORDER BY rowid ASC
            "#,
            quote_ident(RELATIONS_TABLE)
        ))?;
        let rows = stmt.query_map(params![from_id, self.name], |row| {
            Ok(Relation {
                from_id: row.get(0)?,
                from_collection: row.get(1)?,
                to_id: row.get(2)?,
                to_collection: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("database", &self.database)
            .field("name", &self.name)
            .finish()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Validates a new document and stamps `_id` and timestamps; `_id` comes first
fn prepare_new(doc: Value, stamp: i64) -> StoreResult<(String, Document)> {
    let mut fields = match doc {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::InvalidDocument(format!(
                "document must be an object, got {}",
                other
            )))
        }
    };

    let id = match fields.remove(ID_FIELD) {
        None | Some(Value::Null) => Uuid::new_v4().to_string(),
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(other) => {
            return Err(StoreError::InvalidDocument(format!(
                "_id must be a non-empty string, got {}",
                other
            )))
        }
    };

    let mut doc = Map::with_capacity(fields.len() + 3);
    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    for (key, value) in fields {
        if key != CREATED_AT_FIELD && key != UPDATED_AT_FIELD {
            doc.insert(key, value);
        }
    }
    doc.insert(CREATED_AT_FIELD.to_string(), Value::from(stamp));
    doc.insert(UPDATED_AT_FIELD.to_string(), Value::from(stamp));

    Ok((id, doc))
}

fn check_replacement_id(current: &Document, found: &Value) -> StoreResult<()> {
    let expected = document_id(current).unwrap_or_default();
    match found {
        Value::String(s) if s == expected => Ok(()),
        other => Err(StoreError::IdMismatch {
            expected: expected.to_string(),
            found: other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string()),
        }),
    }
}

fn run_query(conn: &Connection, query: &CompiledQuery) -> StoreResult<Vec<(i64, Document)>> {
    let mut stmt = conn.prepare(&query.sql)?;
    let rows = stmt
        .query_map(params_from_iter(query.bindings.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(rowid, text)| Ok((rowid, serde_json::from_str::<Document>(&text)?)))
        .collect()
}

/// Index fields are embedded in partial index DDL, so they are restricted.
/// Store-managed fields keep their built-in indexes.
fn validate_index_field(field: &str) -> StoreResult<()> {
    if is_reserved_field(field) {
        return Err(StoreError::invalid_name(
            field,
            "store-managed fields cannot carry user indexes",
        ));
    }

    let valid = !field.is_empty()
        && !field.starts_with('.')
        && !field.ends_with('.')
        && !field.contains("..")
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::invalid_name(
            field,
            "index fields may only contain letters, digits, '_' and '.'",
        ))
    }
}

/// `uidx:<u|i>:<collection>:<field>`. Fields never contain ':', so the
/// last ':' always separates the field from the collection.
fn user_index_name(collection: &str, field: &str, unique: bool) -> String {
    let kind = if unique { "u" } else { "i" };
    format!("{}{}:{}:{}", USER_INDEX_PREFIX, kind, collection, field)
}

fn partial_index_field(sql: &str) -> Option<String> {
    let marker = "WHERE field = '";
    let start = sql.find(marker)? + marker.len();
    let end = sql[start..].find('\'')?;
    Some(sql[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_new_assigns_id_and_stamps() {
        let (id, doc) = prepare_new(json!({"name": "Eka", "_created_at": 1}), 500).unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(doc["_created_at"], json!(500));
        assert_eq!(doc["_updated_at"], json!(500));
        assert_eq!(doc["name"], json!("Eka"));
    }

    #[test]
    fn test_prepare_new_keeps_caller_id() {
        let (id, doc) = prepare_new(json!({"_id": "u1"}), 1).unwrap();
        assert_eq!(id, "u1");
        assert_eq!(doc["_id"], json!("u1"));
    }

    #[test]
    fn test_prepare_new_rejects_bad_input() {
        assert!(matches!(prepare_new(json!([1]), 1), Err(StoreError::InvalidDocument(_))));
        assert!(matches!(prepare_new(json!({"_id": 7}), 1), Err(StoreError::InvalidDocument(_))));
        assert!(matches!(prepare_new(json!({"_id": ""}), 1), Err(StoreError::InvalidDocument(_))));
    }

    #[test]
    fn test_replacement_id_check() {
        let current = json!({"_id": "u1"}).as_object().cloned().unwrap();
        assert!(check_replacement_id(&current, &json!("u1")).is_ok());
        let err = check_replacement_id(&current, &json!("u2")).unwrap_err();
        assert_eq!(err.code(), "DOC_STORE_ID_MISMATCH");
    }

    #[test]
    fn test_index_field_validation() {
        assert!(validate_index_field("address.city").is_ok());
        assert!(validate_index_field("email").is_ok());
        assert!(validate_index_field("x'; DROP TABLE users; --").is_err());
        assert!(validate_index_field("a..b").is_err());
        assert!(validate_index_field("").is_err());
        assert!(validate_index_field("_id").is_err());
        assert!(validate_index_field("_created_at").is_err());
    }

    #[test]
    fn test_user_index_names_are_distinct() {
        assert_ne!(user_index_name("a", "b_c", false), user_index_name("a_b", "c", false));
        assert_ne!(user_index_name("users", "email", false), user_index_name("users", "email", true));
        for builtin in super::super::sqlite::builtin_indexes("users") {
            assert!(!builtin.starts_with(USER_INDEX_PREFIX));
            for field in ["parent", "field_value", "email"] {
                assert_ne!(user_index_name("users", field, false), builtin);
            }
        }
    }

    #[test]
    fn test_partial_index_field() {
        let sql = "CREATE UNIQUE INDEX \"uidx:u:users:email\" ON \"users_index\" (value) WHERE field = 'email'";
        assert_eq!(partial_index_field(sql), Some("email".to_string()));
        assert_eq!(partial_index_field("CREATE INDEX x ON y (a)"), None);
    }
}
