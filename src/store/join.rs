//! Join
//!
//! Bulk-fetch-then-map: one pass over the local results to collect distinct
//! key values, one `$in` query against the foreign collection, then every
//! local document gets the matching foreign documents attached. The cost does
//! not grow with one foreign query per local document.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::document::{encode_scalar, get_path, set_path, Document};
use crate::observability::{log_event_with_fields, Event};
use crate::query::Filter;

use super::collection::Collection;
use super::errors::StoreResult;

/// What an unmatched local document receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// `null`
    Inner,
    /// `[]`
    Left,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::Inner => "inner",
            JoinMode::Left => "left",
        }
    }

    fn unmatched(&self) -> Value {
        match self {
            JoinMode::Inner => Value::Null,
            JoinMode::Left => Value::Array(Vec::new()),
        }
    }
}

impl Collection {
    /// Attaches foreign documents whose `foreign_field` equals the local
    /// document's `local_field` under `as_field`
    pub fn join(
        &self,
        filter: impl Into<Filter>,
        foreign: &Collection,
        local_field: &str,
        foreign_field: &str,
        mode: JoinMode,
        as_field: &str,
    ) -> StoreResult<Vec<Document>> {
        let locals = self.find(filter)?.to_vec();

        let mut seen = HashSet::new();
        let keys: Vec<Value> = locals
            .iter()
            .filter_map(|doc| get_path(doc, local_field))
            .filter(|value| {
                encode_scalar(value).map_or(false, |encoded| seen.insert(encoded))
            })
            .cloned()
            .collect();

        let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
        if !keys.is_empty() {
            let matches = foreign
                .find(json!({ foreign_field: { "$in": keys } }))?
                .to_vec();
            for doc in matches {
                if let Some(key) = get_path(&doc, foreign_field).and_then(encode_scalar) {
                    by_key.entry(key).or_default().push(Value::Object(doc));
                }
            }
        }

        let mut matched = 0usize;
        let out: Vec<Document> = locals
            .into_iter()
            .map(|mut doc| {
                let attached = get_path(&doc, local_field)
                    .and_then(encode_scalar)
                    .and_then(|key| by_key.get(&key))
                    .map(|docs| Value::Array(docs.clone()));
                let value = match attached {
                    Some(docs) => {
                        matched += 1;
                        docs
                    }
                    None => mode.unmatched(),
                };
                set_path(&mut doc, as_field, value);
                doc
            })
            .collect();

        let local = out.len().to_string();
        let matched = matched.to_string();
        log_event_with_fields(
            Event::JoinComplete,
            &[
                ("foreign", foreign.name()),
                ("local", self.name()),
                ("local_docs", &local),
                ("matched", &matched),
                ("mode", mode.as_str()),
            ],
        );
        Ok(out)
    }
}
