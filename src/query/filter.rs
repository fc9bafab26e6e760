//! Filter AST
//!
//! A filter is either a structured criteria document or an arbitrary
//! predicate closure. Structured criteria are parsed into a flat list of
//! predicates combined with AND.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::document::Document;

use super::errors::{QueryError, QueryResult};

/// Predicate closure evaluated against a fully decoded document
pub type PredicateFn = Box<dyn Fn(&Document) -> bool>;

/// Filter argument accepted by `find`, `update`, `remove` and `count`
pub enum Filter {
    /// Criteria document such as `{"age": {"$gt": 20}, "city": "Jakarta"}`
    Structured(Value),
    /// Closure evaluated on every document (full scan, no index use).
    ///
    /// Under `find`, `find_one` and `count` the closure runs with the
    /// connection released. Under `update`, `replace` and `remove` it runs
    /// inside the write transaction and must not call back into the same
    /// database, or it blocks forever on the connection lock.
    Predicate(PredicateFn),
}

impl Filter {
    /// Matches every document
    pub fn all() -> Self {
        Filter::Structured(Value::Object(Map::new()))
    }

    /// Wraps a closure
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + 'static,
    {
        Filter::Predicate(Box::new(f))
    }
}

impl From<Value> for Filter {
    fn from(value: Value) -> Self {
        Filter::Structured(value)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Structured(value) => f.debug_tuple("Structured").field(value).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(<closure>)"),
        }
    }
}

/// Comparison attached to one field
#[derive(Debug, Clone)]
pub enum FilterOp {
    /// Bare equality or `$eq`
    Eq(Value),
    /// `$ne`
    Ne(Value),
    /// `$gt`
    Gt(Value),
    /// `$gte`
    Gte(Value),
    /// `$lt`
    Lt(Value),
    /// `$lte`
    Lte(Value),
    /// `$in`
    In(Vec<Value>),
    /// `$nin`
    Nin(Vec<Value>),
    /// `$exists`
    Exists(bool),
    /// `$regex` with optional `$options`
    Regex(Regex),
}

impl FilterOp {
    /// Operator name for logs and errors
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "$eq",
            FilterOp::Ne(_) => "$ne",
            FilterOp::Gt(_) => "$gt",
            FilterOp::Gte(_) => "$gte",
            FilterOp::Lt(_) => "$lt",
            FilterOp::Lte(_) => "$lte",
            FilterOp::In(_) => "$in",
            FilterOp::Nin(_) => "$nin",
            FilterOp::Exists(_) => "$exists",
            FilterOp::Regex(_) => "$regex",
        }
    }

    /// Returns true if this is a range operation
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gt(_) | FilterOp::Gte(_) | FilterOp::Lt(_) | FilterOp::Lte(_)
        )
    }

    fn indexable(&self) -> bool {
        match self {
            FilterOp::Exists(_) | FilterOp::Regex(_) => false,
            FilterOp::In(values) | FilterOp::Nin(values) => values.iter().all(is_plain_scalar),
            FilterOp::Eq(v)
            | FilterOp::Ne(v)
            | FilterOp::Gt(v)
            | FilterOp::Gte(v)
            | FilterOp::Lt(v)
            | FilterOp::Lte(v) => is_plain_scalar(v),
        }
    }
}

fn is_plain_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// A single predicate (field + operation)
#[derive(Debug, Clone)]
pub struct Predicate {
    /// Dot path
    pub field: String,
    /// Comparison
    pub op: FilterOp,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// Create an equality predicate
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq(value))
    }

    /// Returns true if the index table can answer this predicate.
    ///
    /// Paths with an `id` segment are never indexed, so they always scan.
    pub fn is_indexable(&self) -> bool {
        self.op.indexable() && !self.field.split('.').any(|segment| segment == "id")
    }
}

/// Parsed structured criteria, all predicates combined with AND
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub predicates: Vec<Predicate>,
}

impl Criteria {
    /// Parses a criteria document. `null` and `{}` match everything.
    pub fn parse(value: &Value) -> QueryResult<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(QueryError::InvalidFilter(format!(
                    "criteria must be an object, got {}",
                    other
                )))
            }
        };

        let mut predicates = Vec::new();
        for (field, condition) in map {
            if field.starts_with('$') {
                return Err(QueryError::UnsupportedOperator(field.clone()));
            }
            if field.is_empty() {
                return Err(QueryError::InvalidFilter("empty field path".into()));
            }
            parse_condition(field, condition, &mut predicates)?;
        }

        Ok(Self { predicates })
    }

    /// Returns true if no predicate is present
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Returns true if any predicate must be evaluated in memory
    pub fn requires_full_scan(&self) -> bool {
        self.predicates.iter().any(|p| !p.is_indexable())
    }
}

fn parse_condition(field: &str, condition: &Value, out: &mut Vec<Predicate>) -> QueryResult<()> {
    let ops = match condition {
        Value::Object(map) if !map.is_empty() => map,
        other => {
            out.push(Predicate::eq(field, other.clone()));
            return Ok(());
        }
    };

    let operator_keys = ops.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        out.push(Predicate::eq(field, condition.clone()));
        return Ok(());
    }
    if operator_keys != ops.len() {
        return Err(QueryError::InvalidFilter(format!(
            "condition on '{}' mixes operators and plain keys",
            field
        )));
    }

    for (operator, operand) in ops {
        let op = match operator.as_str() {
            "$eq" => FilterOp::Eq(operand.clone()),
            "$ne" => FilterOp::Ne(operand.clone()),
            "$gt" => FilterOp::Gt(operand.clone()),
            "$gte" => FilterOp::Gte(operand.clone()),
            "$lt" => FilterOp::Lt(operand.clone()),
            "$lte" => FilterOp::Lte(operand.clone()),
            "$in" => FilterOp::In(as_list(operand)),
            "$nin" => FilterOp::Nin(as_list(operand)),
            "$exists" => FilterOp::Exists(parse_exists(field, operand)?),
            "$regex" => FilterOp::Regex(parse_regex(operand, ops.get("$options"))?),
            "$options" if ops.contains_key("$regex") => continue,
            other => return Err(QueryError::UnsupportedOperator(other.to_string())),
        };
        out.push(Predicate::new(field, op));
    }

    Ok(())
}

fn as_list(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        single => vec![single.clone()],
    }
}

fn parse_exists(field: &str, operand: &Value) -> QueryResult<bool> {
    match operand {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map_or(false, |f| f != 0.0)),
        _ => Err(QueryError::InvalidFilter(format!(
            "$exists on '{}' expects a boolean",
            field
        ))),
    }
}

fn parse_regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| QueryError::InvalidFilter("$regex expects a string pattern".into()))?;

    let mut builder = RegexBuilder::new(pattern);
    if let Some(options) = options {
        let flags = options
            .as_str()
            .ok_or_else(|| QueryError::InvalidFilter("$options expects a string".into()))?;
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(QueryError::InvalidFilter(format!(
                        "unknown $options flag '{}'",
                        other
                    )))
                }
            };
        }
    }

    builder.build().map_err(|e| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
