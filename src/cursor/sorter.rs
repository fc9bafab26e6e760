//! Multi-key sorting
//!
//! Sorts by each key in turn with the numeric-aware comparator; ties fall
//! through to the next key and finally to the original order (stable sort).

use serde_json::Value;

use crate::document::{compare_values, get_path, Document};
use crate::query::{QueryError, QueryResult};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Dot path to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses `{"field": 1, "other": -1}` into an ordered key list
    pub fn parse_list(spec: &Value) -> QueryResult<Vec<SortSpec>> {
        let map = spec
            .as_object()
            .ok_or_else(|| QueryError::InvalidFilter("sort must be an object".into()))?;

        map.iter()
            .map(|(field, direction)| match direction.as_i64() {
                Some(1) => Ok(SortSpec::asc(field.as_str())),
                Some(-1) => Ok(SortSpec::desc(field.as_str())),
                _ => Err(QueryError::InvalidFilter(format!(
                    "sort direction for '{}' must be 1 or -1",
                    field
                ))),
            })
            .collect()
    }
}

/// Sorts documents
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts documents according to the sort keys. Stable.
    pub fn sort(documents: &mut [Document], keys: &[SortSpec]) {
        if keys.is_empty() {
            return;
        }

        documents.sort_by(|a, b| {
            for key in keys {
                let ordering = compare_values(get_path(a, &key.field), get_path(b, &key.field));
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_doc(id: &str, age: Value) -> Document {
        json!({"_id": id, "age": age}).as_object().cloned().unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_sort_ascending() {
        let mut docs = vec![make_doc("c", json!(30)), make_doc("a", json!(20)), make_doc("b", json!(25))];
        ResultSorter::sort(&mut docs, &[SortSpec::asc("age")]);
        assert_eq!(ids(&docs), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_descending() {
        let mut docs = vec![make_doc("c", json!(30)), make_doc("a", json!(20)), make_doc("b", json!(25))];
        ResultSorter::sort(&mut docs, &[SortSpec::desc("age")]);
        assert_eq!(ids(&docs), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_numeric_strings() {
        let mut docs = vec![make_doc("ten", json!("10")), make_doc("nine", json!("9"))];
        ResultSorter::sort(&mut docs, &[SortSpec::asc("age")]);
        assert_eq!(ids(&docs), vec!["nine", "ten"]);
    }

    #[test]
    fn test_sort_stable() {
        let mut docs = vec![make_doc("a", json!(25)), make_doc("b", json!(25)), make_doc("c", json!(25))];
        ResultSorter::sort(&mut docs, &[SortSpec::asc("age")]);
        assert_eq!(ids(&docs), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_secondary_key_breaks_ties() {
        let mut docs = vec![
            json!({"_id": "1", "city": "B", "age": 30}),
            json!({"_id": "2", "city": "A", "age": 40}),
            json!({"_id": "3", "city": "B", "age": 20}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect::<Vec<_>>();

        ResultSorter::sort(&mut docs, &[SortSpec::asc("city"), SortSpec::desc("age")]);
        assert_eq!(ids(&docs), vec!["2", "1", "3"]);
    }

    #[test]
    fn test_parse_list() {
        let keys = SortSpec::parse_list(&json!({"age": 1, "name": -1})).unwrap();
        assert_eq!(keys, vec![SortSpec::asc("age"), SortSpec::desc("name")]);
        assert!(SortSpec::parse_list(&json!({"age": 2})).is_err());
    }
}
