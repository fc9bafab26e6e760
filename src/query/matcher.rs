//! In-memory predicate evaluation
//!
//! Used by the full-scan plan and by the `$match` aggregation stage. Scalar
//! comparisons go through the canonical encoding so that a criteria returns
//! the same documents whether it runs against the index table or here.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{compare_encoded, encode_scalar, get_path, Document};

use super::filter::{Criteria, FilterOp, Predicate};

/// Evaluates predicates against documents
pub struct PredicateMatcher;

impl PredicateMatcher {
    /// Checks if a document matches all predicates (AND semantics)
    pub fn matches(document: &Document, criteria: &Criteria) -> bool {
        criteria
            .predicates
            .iter()
            .all(|pred| Self::matches_predicate(document, pred))
    }

    /// Checks if a document matches a single predicate
    pub fn matches_predicate(document: &Document, predicate: &Predicate) -> bool {
        let actual = get_path(document, &predicate.field);

        match &predicate.op {
            FilterOp::Eq(expected) => eq_match(actual, expected),
            FilterOp::Ne(expected) => ne_match(actual, expected),
            FilterOp::Gt(bound) => cmp_match(actual, bound, |o| o == Ordering::Greater),
            FilterOp::Gte(bound) => cmp_match(actual, bound, |o| o != Ordering::Less),
            FilterOp::Lt(bound) => cmp_match(actual, bound, |o| o == Ordering::Less),
            FilterOp::Lte(bound) => cmp_match(actual, bound, |o| o != Ordering::Greater),
            FilterOp::In(values) => values.iter().any(|v| eq_match(actual, v)),
            FilterOp::Nin(values) => {
                let candidate = if values.iter().all(|v| encode_scalar(v).is_some()) {
                    actual.and_then(encode_scalar).is_some()
                } else {
                    present(actual)
                };
                candidate && !values.iter().any(|v| eq_match(actual, v))
            }
            FilterOp::Exists(expected) => present(actual) == *expected,
            FilterOp::Regex(re) => matches!(actual, Some(Value::String(s)) if re.is_match(s)),
        }
    }
}

fn present(actual: Option<&Value>) -> bool {
    !matches!(actual, None | Some(Value::Null))
}

fn eq_match(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(a), e) => match (encode_scalar(a), encode_scalar(e)) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a == e,
            _ => false,
        },
    }
}

/// Against a scalar, only scalar fields qualify, mirroring "has an index row"
fn ne_match(actual: Option<&Value>, expected: &Value) -> bool {
    match encode_scalar(expected) {
        Some(e) => actual.and_then(encode_scalar).map_or(false, |a| a != e),
        None => present(actual) && !eq_match(actual, expected),
    }
}

fn cmp_match(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let actual = match actual.and_then(encode_scalar) {
        Some(a) => a,
        None => return false,
    };
    match encode_scalar(bound) {
        Some(b) => accept(compare_encoded(&actual, &b)),
        None => false,
    }
}
