//! Aggregation Tests
//!
//! Tests for pipeline invariants over stored collections:
//! - Stages run strictly in pipeline order over the whole collection
//! - `$avg` over zero numeric inputs is null
//! - Groups are emitted in first-seen key order
//! - Malformed pipelines are rejected before any data is read

use litedoc::{Client, Collection};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn orders() -> (Client, Collection) {
    let client = Client::in_memory();
    let coll = client.database("shop").unwrap().collection("orders").unwrap();
    coll.insert_many(vec![
        json!({"customer": "eka", "city": "Jakarta", "price": 10, "qty": 2, "items": ["pen", "ink"]}),
        json!({"customer": "budi", "city": "Bandung", "price": 4, "qty": 5, "items": ["paper"]}),
        json!({"customer": "eka", "city": "Jakarta", "price": 7, "qty": 1, "items": []}),
        json!({"customer": "citra", "city": "Surabaya", "note": "no price"}),
    ])
    .unwrap();
    (client, coll)
}

fn values(docs: &[litedoc::Document], field: &str) -> Vec<Value> {
    docs.iter().map(|d| d.get(field).cloned().unwrap_or(Value::Null)).collect()
}

// =============================================================================
// Group Tests
// =============================================================================

/// Groups keep first-seen order and every accumulator finalizes.
#[test]
fn test_group_accumulators() {
    let (_client, coll) = orders();
    let out = coll
        .aggregate(&json!([
            {"$group": {
                "_id": "$customer",
                "orders": {"$sum": 1},
                "spent": {"$sum": {"$multiply": ["$price", "$qty"]}},
                "avg_price": {"$avg": "$price"},
                "cheapest": {"$min": "$price"},
                "dearest": {"$max": "$price"},
                "first_city": {"$first": "$city"},
                "prices": {"$push": "$price"}
            }}
        ]))
        .unwrap();

    assert_eq!(values(&out, "_id"), vec![json!("eka"), json!("budi"), json!("citra")]);

    let eka = &out[0];
    assert_eq!(eka["orders"], json!(2));
    assert_eq!(eka["spent"], json!(27));
    assert_eq!(eka["avg_price"], json!(8.5));
    assert_eq!(eka["cheapest"], json!(7));
    assert_eq!(eka["dearest"], json!(10));
    assert_eq!(eka["first_city"], json!("Jakarta"));
    assert_eq!(eka["prices"], json!([10, 7]));
}

/// `$avg` with no numeric input is null rather than a division error.
#[test]
fn test_avg_of_nothing_is_null() {
    let (_client, coll) = orders();
    let out = coll
        .aggregate(&json!([
            {"$match": {"customer": "citra"}},
            {"$group": {"_id": "$customer", "avg_price": {"$avg": "$price"}, "low": {"$min": "$price"}}}
        ]))
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["avg_price"], Value::Null);
    assert_eq!(out[0]["low"], Value::Null);
}

/// A literal group key folds the whole input into one group.
#[test]
fn test_group_all() {
    let (_client, coll) = orders();
    let out = coll
        .aggregate(&json!([{"$group": {"_id": null, "n": {"$sum": 1}, "qty": {"$sum": "$qty"}}}]))
        .unwrap();
    assert_eq!(out, vec![json!({"_id": null, "n": 4, "qty": 8}).as_object().cloned().unwrap()]);
}

/// Numeric strings count as numbers in accumulators and arithmetic.
#[test]
fn test_numeric_strings_in_group() {
    let client = Client::in_memory();
    let coll = client.database("shop").unwrap().collection("imports").unwrap();
    coll.insert_many(vec![
        json!({"sku": "a", "price": "10", "qty": "3"}),
        json!({"sku": "a", "price": 4, "qty": "2"}),
        json!({"sku": "a", "price": "free", "qty": 1}),
    ])
    .unwrap();

    let out = coll
        .aggregate(&json!([
            {"$group": {
                "_id": "$sku",
                "spent": {"$sum": {"$multiply": ["$price", "$qty"]}},
                "avg_price": {"$avg": "$price"},
                "units": {"$sum": "$qty"}
            }}
        ]))
        .unwrap();

    assert_eq!(out[0]["spent"], json!(38));
    assert_eq!(out[0]["avg_price"], json!(7.0));
    assert_eq!(out[0]["units"], json!(6));
}

/// An empty match feeds zero documents into `$group`.
#[test]
fn test_group_over_empty_input() {
    let (_client, coll) = orders();
    let out = coll
        .aggregate(&json!([
            {"$match": {"city": "Medan"}},
            {"$group": {"_id": "$city", "avg": {"$avg": "$price"}}}
        ]))
        .unwrap();
    assert!(out.is_empty());
}

// =============================================================================
// Unwind / Sort / Page / Project Tests
// =============================================================================

/// `$unwind` emits one document per element and drops empty lists.
#[test]
fn test_unwind() {
    let (_client, coll) = orders();
    let out = coll.aggregate(&json!([{"$unwind": "$items"}])).unwrap();
    assert_eq!(values(&out, "items"), vec![json!("pen"), json!("ink"), json!("paper")]);

    let kept = coll
        .aggregate(&json!([{"$unwind": {"path": "$items", "preserveNullAndEmptyArrays": true}}]))
        .unwrap();
    assert_eq!(kept.len(), 5);
}

/// Sort, skip, limit and project run in the order written.
#[test]
fn test_stage_order() {
    let (_client, coll) = orders();
    let out = coll
        .aggregate(&json!([
            {"$match": {"price": {"$exists": true}}},
            {"$sort": {"price": -1}},
            {"$skip": 1},
            {"$limit": 1},
            {"$project": {"customer": 1, "total": {"$multiply": ["$price", "$qty"]}}}
        ]))
        .unwrap();

    assert_eq!(out, vec![json!({"customer": "eka", "total": 7}).as_object().cloned().unwrap()]);
}

/// `$project` builds nested output from dot paths and drops `_id` unless asked.
#[test]
fn test_project_paths() {
    let client = Client::in_memory();
    let coll = client.database("app").unwrap().collection("people").unwrap();
    coll.insert(json!({"_id": "p1", "name": "Eka", "address": {"city": "Jakarta", "zip": "1"}})).unwrap();

    let out = coll
        .aggregate(&json!([{"$project": {"_id": 1, "address.city": 1, "name": 0}}]))
        .unwrap();
    assert_eq!(out[0], json!({"_id": "p1", "address": {"city": "Jakarta"}}).as_object().cloned().unwrap());
}

// =============================================================================
// Rejection Tests
// =============================================================================

/// Unknown stages and malformed bodies are pipeline errors.
#[test]
fn test_invalid_pipelines() {
    let (_client, coll) = orders();
    for pipeline in [
        json!({"$match": {}}),
        json!([{"$lookup": {}}]),
        json!([{"$limit": -1}]),
        json!([{"$group": {"n": {"$sum": 1}}}]),
        json!([{"$match": {}, "$limit": 1}]),
    ] {
        let err = coll.aggregate(&pipeline).unwrap_err();
        assert_eq!(err.code(), "DOC_PIPELINE_INVALID", "{}", pipeline);
    }
}
