//! Cursor over a materialized result set
//!
//! Builders may be called in any order; evaluation always runs
//! filter → sort → skip → limit. `count()` reports the size of that final
//! page, so it always equals `to_vec().len()`.
//!
//! Terminal operations work on copies: calling them repeatedly yields the
//! same result and never mutates the candidate documents.

mod sorter;

pub use sorter::{ResultSorter, SortDirection, SortSpec};

use std::fmt;

use serde_json::Value;

use crate::document::Document;
use crate::query::{PredicateFn, QueryResult};

/// Lazy view over candidate documents
pub struct Cursor {
    documents: Vec<Document>,
    filter: Option<PredicateFn>,
    sort: Vec<SortSpec>,
    skip: usize,
    limit: Option<usize>,
}

impl Cursor {
    /// Wraps candidate documents in their original order
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            filter: None,
            sort: Vec::new(),
            skip: 0,
            limit: None,
        }
    }

    /// Secondary predicate, applied before sorting
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Sort keys, most significant first
    pub fn sort(mut self, keys: impl IntoIterator<Item = SortSpec>) -> Self {
        self.sort = keys.into_iter().collect();
        self
    }

    /// Sort keys from `{"field": 1, "other": -1}`
    pub fn sort_by(self, spec: &Value) -> QueryResult<Self> {
        let keys = SortSpec::parse_list(spec)?;
        Ok(self.sort(keys))
    }

    /// Number of leading documents to drop
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Maximum number of documents to return
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Size of the final page
    pub fn count(&self) -> usize {
        self.apply_all().len()
    }

    /// Final ordered page
    pub fn to_vec(&self) -> Vec<Document> {
        self.apply_all()
    }

    /// First document of the final page
    pub fn first(&self) -> Option<Document> {
        self.apply_all().into_iter().next()
    }

    /// Calls `f` on every document of the final page
    pub fn each<F: FnMut(&Document)>(&self, mut f: F) {
        for doc in &self.apply_all() {
            f(doc);
        }
    }

    /// Number of candidates before any cursor stage
    pub fn candidate_count(&self) -> usize {
        self.documents.len()
    }

    fn apply_all(&self) -> Vec<Document> {
        let mut out: Vec<Document> = match &self.filter {
            Some(predicate) => self
                .documents
                .iter()
                .filter(|doc| predicate(doc))
                .cloned()
                .collect(),
            None => self.documents.clone(),
        };

        ResultSorter::sort(&mut out, &self.sort);

        let take = self.limit.unwrap_or(usize::MAX);
        out.into_iter().skip(self.skip).take(take).collect()
    }
}

impl IntoIterator for Cursor {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.apply_all().into_iter()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("candidates", &self.documents.len())
            .field("filtered", &self.filter.is_some())
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}
