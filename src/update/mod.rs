//! Update/Operator Engine for litedoc
//!
//! Interprets a patch against a loaded document before the store re-persists
//! and re-indexes it.
//!
//! # Patch resolution
//!
//! - every key starts with `$`: operator patch, all operators applied in
//!   patch order (`$set`, `$unset`, `$inc`, `$push`)
//! - no key starts with `$`: flat top-level merge
//! - mixed: rejected
//!
//! Store-managed fields (`_id`, `_created_at`, `_updated_at`) cannot be
//! targeted. Replace mode keeps `_id` and `_created_at`.

mod operators;

pub use operators::UpdateOp;

use serde_json::{Map, Value};

use crate::document::{is_reserved_field, Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::query::{QueryError, QueryResult};

/// A validated update
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Operator patch
    Operators(Vec<UpdateOp>),
    /// Flat top-level merge
    Merge(Document),
    /// Whole-document replacement
    Replace(Document),
}

impl Update {
    /// Parses a patch document
    pub fn parse(patch: &Value) -> QueryResult<Self> {
        let map = as_object(patch, "patch")?;

        let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            for key in map.keys() {
                check_path(key)?;
            }
            return Ok(Update::Merge(map.clone()));
        }
        if operator_keys != map.len() {
            return Err(QueryError::InvalidUpdate(
                "patch mixes update operators and plain fields".into(),
            ));
        }

        let mut ops = Vec::new();
        for (operator, fields) in map {
            let fields = as_object(fields, operator)?;
            for (path, value) in fields {
                check_path(path)?;
                ops.push(parse_op(operator, path, value)?);
            }
        }
        Ok(Update::Operators(ops))
    }

    /// Wraps a whole-document replacement
    pub fn replace(replacement: &Value) -> QueryResult<Self> {
        let map = as_object(replacement, "replacement")?;
        Ok(Update::Replace(map.clone()))
    }

    /// `_id` carried by a replacement, if any
    pub fn replacement_id(&self) -> Option<&Value> {
        match self {
            Update::Replace(doc) => doc.get(ID_FIELD),
            _ => None,
        }
    }

    /// Produces the next version of `current`, stamping `_updated_at`
    pub fn apply(&self, current: &Document, now: i64) -> Document {
        let mut next = match self {
            Update::Operators(ops) => {
                let mut doc = current.clone();
                for op in ops {
                    op.apply(&mut doc);
                }
                doc
            }
            Update::Merge(fields) => {
                let mut doc = current.clone();
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
                doc
            }
            Update::Replace(replacement) => {
                let mut doc = Map::new();
                if let Some(id) = current.get(ID_FIELD) {
                    doc.insert(ID_FIELD.to_string(), id.clone());
                }
                for (key, value) in replacement {
                    if !is_reserved_field(key) {
                        doc.insert(key.clone(), value.clone());
                    }
                }
                let created = current
                    .get(CREATED_AT_FIELD)
                    .cloned()
                    .unwrap_or_else(|| Value::from(now));
                doc.insert(CREATED_AT_FIELD.to_string(), created);
                doc
            }
        };

        next.insert(UPDATED_AT_FIELD.to_string(), Value::from(now));
        next
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> QueryResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| QueryError::InvalidUpdate(format!("{} must be an object", what)))
}

fn check_path(path: &str) -> QueryResult<()> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(QueryError::InvalidUpdate(format!("invalid field path '{}'", path)));
    }
    if is_reserved_field(path) {
        return Err(QueryError::ReservedField(path.to_string()));
    }
    Ok(())
}

fn parse_op(operator: &str, path: &str, value: &Value) -> QueryResult<UpdateOp> {
    let path = path.to_string();
    match operator {
        "$set" => Ok(UpdateOp::Set { path, value: value.clone() }),
        "$unset" => Ok(UpdateOp::Unset { path }),
        "$inc" => match value {
            Value::Number(delta) => Ok(UpdateOp::Inc { path, delta: delta.clone() }),
            other => Err(QueryError::InvalidUpdate(format!(
                "$inc on '{}' expects a number, got {}",
                path, other
            ))),
        },
        "$push" => Ok(UpdateOp::Push { path, value: value.clone() }),
        other => Err(QueryError::UnsupportedOperator(other.to_string())),
    }
}
