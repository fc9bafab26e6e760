//! Pipeline stages
//!
//! A pipeline is parsed completely before any document is touched; execution
//! then runs each stage over the whole in-memory sequence, strictly in order.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::cursor::{ResultSorter, SortSpec};
use crate::document::{get_path, set_path, Document, ID_FIELD};
use crate::query::{Criteria, PredicateMatcher, QueryError, QueryResult};

use super::accumulator::Accumulator;
use super::expression::Expr;

/// `$project` treatment of one field
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `1` / `true`
    Include,
    /// `0` / `false`
    Exclude,
    /// `"$path"` or an expression object
    Compute(Expr),
}

/// One pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Criteria),
    Unwind { path: String, preserve_empty: bool },
    Group { key: Expr, fields: Vec<(String, Accumulator)> },
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    Project(Vec<(String, Projection)>),
}

impl Stage {
    /// Stage name as written in the pipeline
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Unwind { .. } => "$unwind",
            Stage::Group { .. } => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Skip(_) => "$skip",
            Stage::Limit(_) => "$limit",
            Stage::Project(_) => "$project",
        }
    }

    /// Parses `{"$stage": body}`
    pub fn parse(stage: &Value) -> QueryResult<Self> {
        let map = stage
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| invalid("each stage must be an object with exactly one key"))?;
        let (name, body) = map
            .iter()
            .next()
            .ok_or_else(|| invalid("empty stage"))?;

        match name.as_str() {
            "$match" => Criteria::parse(body)
                .map(Stage::Match)
                .map_err(|e| invalid(format!("$match: {}", e))),
            "$unwind" => parse_unwind(body),
            "$group" => parse_group(body),
            "$sort" => SortSpec::parse_list(body)
                .map(Stage::Sort)
                .map_err(|e| invalid(format!("$sort: {}", e))),
            "$skip" => parse_count(name, body).map(Stage::Skip),
            "$limit" => parse_count(name, body).map(Stage::Limit),
            "$project" => parse_project(body),
            other => Err(invalid(format!("unknown stage '{}'", other))),
        }
    }

    /// Runs the stage over the current sequence
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        match self {
            Stage::Match(criteria) => docs
                .into_iter()
                .filter(|d| PredicateMatcher::matches(d, criteria))
                .collect(),
            Stage::Unwind { path, preserve_empty } => unwind(docs, path, *preserve_empty),
            Stage::Group { key, fields } => group(&docs, key, fields),
            Stage::Sort(keys) => {
                let mut docs = docs;
                ResultSorter::sort(&mut docs, keys);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Project(fields) => docs.iter().map(|d| project(d, fields)).collect(),
        }
    }
}

/// Ordered list of stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Parses a JSON array of stages
    pub fn from_json(pipeline: &Value) -> QueryResult<Self> {
        let stages = pipeline
            .as_array()
            .ok_or_else(|| invalid("pipeline must be an array of stages"))?
            .iter()
            .map(Stage::parse)
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Executes every stage in order
    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        self.stages.iter().fold(docs, |acc, stage| stage.apply(acc))
    }
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidPipeline(message.into())
}

fn field_ref(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix('$'))
        .filter(|p| !p.is_empty())
}

fn parse_unwind(body: &Value) -> QueryResult<Stage> {
    let (path, preserve_empty) = match body {
        Value::String(_) => (field_ref(body), false),
        Value::Object(map) => {
            let preserve = match map.get("preserveNullAndEmptyArrays") {
                None => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => return Err(invalid("$unwind: preserveNullAndEmptyArrays must be a boolean")),
            };
            (map.get("path").and_then(field_ref), preserve)
        }
        _ => (None, false),
    };

    let path = path.ok_or_else(|| invalid("$unwind expects a \"$field\" path"))?;
    Ok(Stage::Unwind {
        path: path.to_string(),
        preserve_empty,
    })
}

fn parse_group(body: &Value) -> QueryResult<Stage> {
    let map = body
        .as_object()
        .ok_or_else(|| invalid("$group expects an object"))?;
    let key = map
        .get(ID_FIELD)
        .ok_or_else(|| invalid("$group requires an _id"))?;

    let mut fields = Vec::new();
    for (name, spec) in map {
        if name == ID_FIELD {
            continue;
        }
        fields.push((name.clone(), Accumulator::parse(name, spec)?));
    }

    Ok(Stage::Group {
        key: Expr::parse(key)?,
        fields,
    })
}

fn parse_count(name: &str, body: &Value) -> QueryResult<usize> {
    body.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| invalid(format!("{} expects a non-negative integer", name)))
}

fn parse_project(body: &Value) -> QueryResult<Stage> {
    let map = body
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| invalid("$project expects a non-empty object"))?;

    let mut fields = Vec::with_capacity(map.len());
    for (name, spec) in map {
        let projection = match spec {
            Value::Bool(true) => Projection::Include,
            Value::Bool(false) => Projection::Exclude,
            Value::Number(n) if n.as_f64() == Some(0.0) => Projection::Exclude,
            Value::Number(n) if n.as_f64() == Some(1.0) => Projection::Include,
            Value::String(_) | Value::Object(_) => Projection::Compute(Expr::parse(spec)?),
            other => {
                return Err(invalid(format!(
                    "$project value for '{}' must be 0, 1, a field reference or an expression, got {}",
                    name, other
                )))
            }
        };
        fields.push((name.clone(), projection));
    }

    Ok(Stage::Project(fields))
}

fn unwind(docs: Vec<Document>, path: &str, preserve_empty: bool) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let items = match get_path(&doc, path) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.clone()),
            _ => None,
        };
        match items {
            Some(items) => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            None if preserve_empty => out.push(doc),
            None => {}
        }
    }
    out
}

fn group(docs: &[Document], key: &Expr, fields: &[(String, Accumulator)]) -> Vec<Document> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups = Vec::new();

    for doc in docs {
        let key_value = key.eval(doc);
        let slot_key = key_value.to_string();
        let slot = match slots.get(&slot_key) {
            Some(&i) => i,
            None => {
                let states: Vec<_> = fields.iter().map(|(_, acc)| acc.start()).collect();
                groups.push((key_value, states));
                slots.insert(slot_key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let (_, states) = &mut groups[slot];
        for ((_, acc), state) in fields.iter().zip(states.iter_mut()) {
            acc.feed(state, doc);
        }
    }

    groups
        .into_iter()
        .map(|(key_value, states)| {
            let mut out = Map::new();
            out.insert(ID_FIELD.to_string(), key_value);
            for ((name, _), state) in fields.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

fn project(doc: &Document, fields: &[(String, Projection)]) -> Document {
    let mut out = Map::new();
    for (name, projection) in fields {
        match projection {
            Projection::Include => {
                if let Some(value) = get_path(doc, name) {
                    set_path(&mut out, name, value.clone());
                }
            }
            Projection::Exclude => {}
            Projection::Compute(expr) => set_path(&mut out, name, expr.eval(doc)),
        }
    }
    out
}
