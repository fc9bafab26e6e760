//! Canonical scalar encoding and ordering
//!
//! Index rows store values as text. Every component that compares values
//! (compiled SQL through `doc_cmp`, the in-memory matcher, the cursor and
//! `$sort`) goes through `compare_encoded`, so all paths agree:
//!
//! - both operands parse as finite numbers: numeric comparison
//! - otherwise: byte-lexicographic comparison

use std::cmp::Ordering;

use serde_json::{Number, Value};

/// Encodes a scalar into its canonical index form.
///
/// Returns None for null, maps and lists.
pub fn encode_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
        Value::Number(n) => Some(encode_number(n)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn encode_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// Returns true if the string reads as a finite number
pub fn is_numeric_str(s: &str) -> bool {
    parse_numeric(s).is_some()
}

fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Numeric view of a value: numbers and numeric-looking strings
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Compares two encoded values with the numeric-aware rule
pub fn compare_encoded(a: &str, b: &str) -> Ordering {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Compares two optional values for sorting.
///
/// Missing and null values encode as the empty string; maps and lists
/// encode as their JSON text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    compare_encoded(&sort_key(a), &sort_key(b))
}

fn sort_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v @ (Value::Array(_) | Value::Object(_))) => v.to_string(),
        Some(v) => encode_scalar(v).unwrap_or_default(),
    }
}
