//! Join and Relation Tests
//!
//! Tests for cross-collection invariants:
//! - left joins attach [] and inner joins attach null for unmatched documents
//! - one-to-many matches attach every foreign document
//! - relations upsert on (from_id, to_id) and are read per source collection
//! - user indexes are listed, enforced and dropped
//! - user index names never collide with built-in or other collections' indexes

use litedoc::{Client, Database, JoinMode};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn shop() -> (Client, Database) {
    let client = Client::in_memory();
    let db = client.database("shop").unwrap();

    let users = db.collection("users").unwrap();
    users
        .insert_many(vec![
            json!({"_id": "u1", "name": "Eka"}),
            json!({"_id": "u2", "name": "Budi"}),
            json!({"_id": "u3", "name": "Citra"}),
        ])
        .unwrap();

    let orders = db.collection("orders").unwrap();
    orders
        .insert_many(vec![
            json!({"_id": "o1", "user_id": "u1", "total": 10}),
            json!({"_id": "o2", "user_id": "u2", "total": 20}),
            json!({"_id": "o3", "user_id": "u1", "total": 30}),
        ])
        .unwrap();

    (client, db)
}

fn order_ids(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["_id"].as_str().unwrap())
        .collect()
}

// =============================================================================
// Join Tests
// =============================================================================

/// Left mode attaches an empty list to unmatched documents.
#[test]
fn test_left_join() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();
    let orders = db.collection("orders").unwrap();

    let out = users
        .join(json!({}), &orders, "_id", "user_id", JoinMode::Left, "orders")
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(order_ids(&out[0]["orders"]), vec!["o1", "o3"]);
    assert_eq!(order_ids(&out[1]["orders"]), vec!["o2"]);
    assert_eq!(out[2]["orders"], json!([]));
}

/// Inner mode attaches null to unmatched documents.
#[test]
fn test_inner_join() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();
    let orders = db.collection("orders").unwrap();

    let out = users
        .join(json!({"name": {"$ne": "Eka"}}), &orders, "_id", "user_id", JoinMode::Inner, "orders")
        .unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(order_ids(&out[0]["orders"]), vec!["o2"]);
    assert_eq!(out[1]["orders"], Value::Null);
}

/// Joining the other way round attaches the single owner, under a nested path.
#[test]
fn test_join_many_to_one_nested_as() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();
    let orders = db.collection("orders").unwrap();

    let out = orders
        .join(json!({"total": {"$gte": 20}}), &users, "user_id", "_id", JoinMode::Left, "meta.owner")
        .unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0]["meta"]["owner"][0]["name"], "Budi");
    assert_eq!(out[1]["meta"]["owner"][0]["name"], "Eka");
}

/// Local documents without the join field are unmatched.
#[test]
fn test_join_missing_local_field() {
    let (_client, db) = shop();
    let orders = db.collection("orders").unwrap();
    orders.insert(json!({"_id": "o4", "total": 1})).unwrap();
    let users = db.collection("users").unwrap();

    let out = orders
        .join(json!({"_id": "o4"}), &users, "user_id", "_id", JoinMode::Left, "owner")
        .unwrap();
    assert_eq!(out[0]["owner"], json!([]));
}

// =============================================================================
// Relation Tests
// =============================================================================

/// relate_to upserts on (from_id, to_id).
#[test]
fn test_relations_upsert() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();

    users.relate_to("u1", "orders", "o1").unwrap();
    users.relate_to("u1", "orders", "o3").unwrap();
    users.relate_to("u1", "archive", "o1").unwrap();

    let relations = users.get_relations("u1").unwrap();
    assert_eq!(relations.len(), 2);
    assert_eq!(relations[0].to_id, "o1");
    assert_eq!(relations[0].to_collection, "archive");
    assert_eq!(relations[1].to_id, "o3");
    assert!(relations.iter().all(|r| r.from_collection == "users"));
}

/// Relations are scoped to the source collection.
#[test]
fn test_relations_scoped_by_collection() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();
    let orders = db.collection("orders").unwrap();

    orders.relate_to("o1", "users", "u1").unwrap();
    assert!(users.get_relations("o1").unwrap().is_empty());
    assert_eq!(orders.get_relations("o1").unwrap().len(), 1);
}

/// A missing source document or empty id is rejected.
#[test]
fn test_relation_validation() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();

    let err = users.relate_to("ghost", "orders", "o1").unwrap_err();
    assert_eq!(err.code(), "DOC_STORE_INVALID_RELATION");

    let err = users.relate_to("u1", "orders", "").unwrap_err();
    assert_eq!(err.code(), "DOC_STORE_INVALID_RELATION");
}

// =============================================================================
// User Index Tests
// =============================================================================

/// A unique index rejects a second document with the same field value.
#[test]
fn test_unique_index_enforced() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();
    users.create_index("email", true).unwrap();

    users.update(json!({"_id": "u1"}), json!({"$set": {"email": "eka@example.com"}})).unwrap();
    let err = users
        .update(json!({"_id": "u2"}), json!({"$set": {"email": "eka@example.com"}}))
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert!(users.get("u2").unwrap().unwrap().get("email").is_none());
}

/// Indexes are listed without the built-in ones and drop idempotently.
#[test]
fn test_list_and_drop_indexes() {
    let (_client, db) = shop();
    let orders = db.collection("orders").unwrap();
    assert!(orders.list_indexes().unwrap().is_empty());

    orders.create_index("total", true).unwrap();
    orders.create_index("user_id", false).unwrap();

    let listed: Vec<(String, bool)> = orders
        .list_indexes()
        .unwrap()
        .into_iter()
        .map(|i| (i.field, i.unique))
        .collect();
    assert_eq!(listed, vec![("total".to_string(), true), ("user_id".to_string(), false)]);

    orders.drop_index("total").unwrap();
    orders.drop_index("total").unwrap();
    assert_eq!(orders.list_indexes().unwrap().len(), 1);
}

/// Index field names are restricted.
#[test]
fn test_index_field_validation() {
    let (_client, db) = shop();
    let orders = db.collection("orders").unwrap();
    for bad in ["", "a..b", "x'; DROP TABLE orders; --"] {
        assert_eq!(orders.create_index(bad, false).unwrap_err().code(), "DOC_STORE_INVALID_NAME");
    }
}

/// Store-managed fields cannot be indexed or dropped, so `_id` stays unique.
#[test]
fn test_reserved_fields_keep_builtin_indexes() {
    let (_client, db) = shop();
    let users = db.collection("users").unwrap();

    assert_eq!(users.create_index("_id", true).unwrap_err().code(), "DOC_STORE_INVALID_NAME");
    assert_eq!(users.drop_index("_id").unwrap_err().code(), "DOC_STORE_INVALID_NAME");

    let err = users.insert(json!({"_id": "u1"})).unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(users.count(json!({})).unwrap(), 3);
}

/// Fields named like built-in indexes get real indexes of their own.
#[test]
fn test_user_indexes_do_not_shadow_builtin_names() {
    let (_client, db) = shop();
    let orders = db.collection("orders").unwrap();
    orders.create_index("parent", false).unwrap();
    orders.create_index("field_value", false).unwrap();

    let fields: Vec<String> = orders.list_indexes().unwrap().into_iter().map(|i| i.field).collect();
    assert_eq!(fields.len(), 2);
    assert!(fields.contains(&"parent".to_string()));
    assert!(fields.contains(&"field_value".to_string()));
}

/// Collection and field names that concatenate alike get separate indexes.
#[test]
fn test_user_indexes_scoped_per_collection() {
    let (_client, db) = shop();
    let a = db.collection("a").unwrap();
    let a_b = db.collection("a_b").unwrap();

    a.create_index("b_c", true).unwrap();
    a_b.create_index("c", false).unwrap();

    assert_eq!(a.list_indexes().unwrap().len(), 1);
    assert_eq!(a_b.list_indexes().unwrap().len(), 1);
    assert!(a_b.list_indexes().unwrap()[0].name != a.list_indexes().unwrap()[0].name);

    a_b.insert(json!({"c": "same"})).unwrap();
    a_b.insert(json!({"c": "same"})).unwrap();
    assert_eq!(a_b.count(json!({"c": "same"})).unwrap(), 2);
}
