//! Dot-path navigation over documents
//!
//! Path segments address map keys; a segment that parses as an unsigned
//! integer also addresses a list element (`tags.0`).

use serde_json::{Map, Value};

/// Resolves a dot path, returning None when any segment is missing
pub fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;

    for segment in segments {
        current = step(current, segment)?;
    }

    Some(current)
}

/// Sets the value at a dot path, creating intermediate maps.
///
/// A segment that indexes an existing list element writes through to that
/// element. A scalar intermediate is replaced by an empty map. A path that
/// meets a list with a non-index or out-of-range segment leaves the
/// document unchanged.
pub fn set_path(doc: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    if let Some((first, rest)) = segments.split_first() {
        let slot = doc.entry(first.to_string()).or_insert(Value::Null);
        set_in(slot, rest, value);
    }
}

fn set_in(current: &mut Value, segments: &[&str], value: Value) {
    let (segment, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *current = value;
            return;
        }
    };

    if let Value::Array(items) = current {
        if let Some(item) = segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            set_in(item, rest, value);
        }
        return;
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        let slot = map.entry(segment.to_string()).or_insert(Value::Null);
        set_in(slot, rest, value);
    }
}

/// Removes the leaf at a dot path. Missing paths are a no-op.
pub fn unset_path(doc: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments.split_last()?;
    if parents.is_empty() {
        return doc.shift_remove(*last);
    }

    let (first, middle) = parents.split_first()?;
    let mut current = doc.get_mut(*first)?;
    for segment in middle {
        current = step_mut(current, segment)?;
    }

    current.as_object_mut()?.shift_remove(*last)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}
