//! Field-level update operators

use serde_json::{Number, Value};

use crate::document::{get_path, set_path, unset_path, Document};

/// One field-level change
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Deep-set a value, creating intermediate maps
    Set { path: String, value: Value },
    /// Deep-delete a leaf
    Unset { path: String },
    /// Add a numeric delta, starting from 0 when absent
    Inc { path: String, delta: Number },
    /// Append to a list, creating it when absent
    Push { path: String, value: Value },
}

impl UpdateOp {
    /// Target path
    pub fn path(&self) -> &str {
        match self {
            UpdateOp::Set { path, .. }
            | UpdateOp::Unset { path }
            | UpdateOp::Inc { path, .. }
            | UpdateOp::Push { path, .. } => path,
        }
    }

    /// Applies the change in place
    pub fn apply(&self, doc: &mut Document) {
        match self {
            UpdateOp::Set { path, value } => set_path(doc, path, value.clone()),
            UpdateOp::Unset { path } => {
                unset_path(doc, path);
            }
            UpdateOp::Inc { path, delta } => {
                let next = match get_path(doc, path) {
                    None => Some(delta.clone()),
                    Some(Value::Number(current)) => add_numbers(current, delta),
                    // Non-numeric existing value
                    Some(_) => None,
                };
                if let Some(n) = next {
                    set_path(doc, path, Value::Number(n));
                }
            }
            UpdateOp::Push { path, value } => match get_path(doc, path) {
                None => set_path(doc, path, Value::Array(vec![value.clone()])),
                Some(Value::Array(items)) => {
                    let mut items = items.clone();
                    items.push(value.clone());
                    set_path(doc, path, Value::Array(items));
                }
                Some(_) => {}
            },
        }
    }
}

/// Integer arithmetic when both sides are integers and the sum fits,
/// float arithmetic otherwise
fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}
