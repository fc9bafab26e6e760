//! Client Listener Tests
//!
//! Tests for cross-database update listeners and lookups:
//! - listeners fire once per touched document, after commit
//! - listeners are keyed by (database, collection)
//! - failed updates notify nobody
//! - cross-database lookups by descriptor
//! - cached lookups follow committed updates and removals
//! - migration copies all-or-nothing between databases

use litedoc::{Client, Filter};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// =============================================================================
// Helper Functions
// =============================================================================

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

fn recorder(client: &Client, db: &str, coll: &str, field: &'static str) -> (Seen, String) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = client
        .on_update(db, coll, move |id, doc| {
            sink.lock().unwrap().push((id.to_string(), doc.get(field).cloned().unwrap_or(Value::Null)));
        })
        .unwrap();
    (seen, id)
}

fn accounts_and_shop(client: &Client) {
    let users = client.database("accounts").unwrap().collection("users").unwrap();
    users
        .insert_many(vec![
            json!({"_id": "u1", "name": "Eka"}),
            json!({"_id": "u2", "name": "Budi"}),
        ])
        .unwrap();

    let orders = client.database("shop").unwrap().collection("orders").unwrap();
    orders
        .insert_many(vec![
            json!({"_id": "o1", "user_id": "u1", "courier_id": "c1", "total": 5}),
            json!({"_id": "o2", "user_id": "ghost", "total": 7}),
        ])
        .unwrap();

    client
        .database("logistics")
        .unwrap()
        .collection("couriers")
        .unwrap()
        .insert(json!({"_id": "c1", "name": "Kilat"}))
        .unwrap();
}

// =============================================================================
// Dispatch Tests
// =============================================================================

/// Each touched document is delivered with its committed content.
#[test]
fn test_listener_per_document() {
    let client = Client::in_memory();
    let tasks = client.database("app").unwrap().collection("tasks").unwrap();
    tasks
        .insert_many(vec![
            json!({"_id": "t1", "done": false}),
            json!({"_id": "t2", "done": false}),
            json!({"_id": "t3", "done": true}),
        ])
        .unwrap();
    let (seen, _) = recorder(&client, "app", "tasks", "done");

    tasks.update(json!({"done": false}), json!({"$set": {"done": true}})).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("t1".to_string(), json!(true)), ("t2".to_string(), json!(true))]
    );
}

/// A listener may read the store it is notified about.
#[test]
fn test_listener_can_read_back() {
    let client = Client::in_memory();
    let tasks = client.database("app").unwrap().collection("tasks").unwrap();
    tasks.insert(json!({"_id": "t1", "n": 1})).unwrap();

    let reads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reads);
    let reader = tasks.clone();
    client
        .on_update("app", "tasks", move |id, _| {
            let stored = reader.get(id).unwrap().unwrap();
            sink.lock().unwrap().push(stored["n"].clone());
        })
        .unwrap();

    tasks.update(json!({"_id": "t1"}), json!({"$inc": {"n": 1}})).unwrap();
    assert_eq!(*reads.lock().unwrap(), vec![json!(2)]);
}

/// Listeners only hear their own database and collection.
#[test]
fn test_listener_scoping() {
    let client = Client::in_memory();
    let a = client.database("a").unwrap().collection("items").unwrap();
    let b = client.database("b").unwrap().collection("items").unwrap();
    a.insert(json!({"_id": "x", "v": 1})).unwrap();
    b.insert(json!({"_id": "x", "v": 1})).unwrap();

    let (seen, _) = recorder(&client, "b", "items", "v");
    a.update(json!({}), json!({"$set": {"v": 2}})).unwrap();
    assert!(seen.lock().unwrap().is_empty());

    b.update(json!({}), json!({"$set": {"v": 3}})).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

/// Rolled-back updates and removed listeners deliver nothing.
#[test]
fn test_no_dispatch_without_commit() {
    let client = Client::in_memory();
    let users = client.database("app").unwrap().collection("users").unwrap();
    users.create_index("email", true).unwrap();
    users.insert(json!({"_id": "u1", "email": "a@x"})).unwrap();
    users.insert(json!({"_id": "u2", "email": "b@x"})).unwrap();
    let (seen, subscription) = recorder(&client, "app", "users", "email");

    assert!(users.update(json!({}), json!({"email": "same@x"})).is_err());
    assert!(seen.lock().unwrap().is_empty());

    assert!(client.remove_listener(&subscription));
    users.update(json!({"_id": "u1"}), json!({"email": "c@x"})).unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

/// Inserts and removals are not update events.
#[test]
fn test_insert_and_remove_are_silent() {
    let client = Client::in_memory();
    let users = client.database("app").unwrap().collection("users").unwrap();
    let (seen, _) = recorder(&client, "app", "users", "name");

    users.insert(json!({"name": "Eka"})).unwrap();
    users.remove(json!({"name": "Eka"})).unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

// =============================================================================
// Cross-Database Lookup Tests
// =============================================================================

/// get_many_related follows a "database:collection:field" descriptor.
#[test]
fn test_get_many_related_across_databases() {
    let client = Client::in_memory();
    let user_id = client
        .database("accounts")
        .unwrap()
        .collection("users")
        .unwrap()
        .insert(json!({"name": "Eka"}))
        .unwrap();
    let orders = client.database("shop").unwrap().collection("orders").unwrap();
    orders.insert(json!({"user_id": &user_id, "total": 5})).unwrap();
    orders.insert(json!({"user_id": "someone-else", "total": 9})).unwrap();

    let owner = client.get_document("accounts", "users", &user_id).unwrap().unwrap();
    assert_eq!(owner["name"], "Eka");

    let related = client.get_many_related(&user_id, "shop:orders:user_id").unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0]["total"], json!(5));
}

/// Malformed descriptors are rejected.
#[test]
fn test_bad_descriptors() {
    let client = Client::in_memory();
    for bad in ["shop", "shop:orders", "shop::user_id", "a:b:c:d"] {
        let err = client.get_many_related("u1", bad).unwrap_err();
        assert_eq!(err.code(), "DOC_STORE_INVALID_RELATION", "{}", bad);
    }
}

/// get_related resolves each id-valued field through "database.collection".
#[test]
fn test_get_related() {
    let client = Client::in_memory();
    accounts_and_shop(&client);
    let order = client.get_document("shop", "orders", "o1").unwrap().unwrap();

    let related = client
        .get_related(&order, &[("user_id", "accounts.users"), ("courier_id", "logistics.couriers"), ("coupon", "shop.coupons")])
        .unwrap();
    assert_eq!(related["user_id"]["name"], "Eka");
    assert_eq!(related["courier_id"]["name"], "Kilat");
    assert!(related.get("coupon").is_none());

    let orphan = client.get_document("shop", "orders", "o2").unwrap().unwrap();
    let related = client.get_related(&orphan, &[("user_id", "accounts.users")]).unwrap();
    assert_eq!(related["user_id"], Value::Null);

    let err = client.get_related(&order, &[("user_id", "accounts")]).unwrap_err();
    assert_eq!(err.code(), "DOC_STORE_INVALID_RELATION");
}

/// embed_data merges referenced documents into the source document.
#[test]
fn test_embed_data() {
    let client = Client::in_memory();
    accounts_and_shop(&client);

    let order = client
        .embed_data(
            "shop",
            "orders",
            "o1",
            &[("customer", "accounts:users:user_id"), ("courier", "logistics:couriers:courier_id")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(order["total"], json!(5));
    assert_eq!(order["customer"]["name"], "Eka");
    assert_eq!(order["courier"]["name"], "Kilat");

    assert!(client.embed_data("shop", "orders", "nope", &[]).unwrap().is_none());
    let err = client.embed_data("shop", "orders", "o1", &[("x", "accounts:users")]).unwrap_err();
    assert_eq!(err.code(), "DOC_STORE_INVALID_RELATION");
}

/// Preloaded documents are cached and stay current after updates and removals.
#[test]
fn test_preload_and_cache_coherence() {
    let client = Client::in_memory();
    accounts_and_shop(&client);
    let users = client.database("accounts").unwrap().collection("users").unwrap();

    assert_eq!(client.preload_documents("accounts", "users", &[]).unwrap(), 0);
    assert_eq!(client.preload_documents("accounts", "users", &["u1", "u2", "u9"]).unwrap(), 2);
    assert_eq!(client.cached_documents(), 2);

    users.update(json!({"_id": "u1"}), json!({"$set": {"name": "Eka Putra"}})).unwrap();
    let cached = client.get_document("accounts", "users", "u1").unwrap().unwrap();
    assert_eq!(cached["name"], "Eka Putra");

    users.remove(json!({"_id": "u2"})).unwrap();
    assert_eq!(client.cached_documents(), 1);
    assert!(client.get_document("accounts", "users", "u2").unwrap().is_none());

    client.clear_cache().unwrap();
    assert_eq!(client.cached_documents(), 0);
    assert!(client.get_document("accounts", "users", "u1").unwrap().is_some());
    assert_eq!(client.cached_documents(), 1);
}

// =============================================================================
// Migration Tests
// =============================================================================

/// migrate copies the filtered documents, keeping their `_id`.
#[test]
fn test_migrate_between_databases() {
    let client = Client::in_memory();
    let legacy = client.database("legacy").unwrap().collection("users").unwrap();
    legacy
        .insert_many(vec![
            json!({"_id": "u1", "plan": "pro"}),
            json!({"_id": "u2", "plan": "free"}),
            json!({"_id": "u3", "plan": "pro"}),
        ])
        .unwrap();

    assert_eq!(client.migrate("legacy", "current", "users", json!({"plan": "pro"})).unwrap(), 2);
    let current = client.database("current").unwrap().collection("users").unwrap();
    assert!(current.get("u1").unwrap().is_some());
    assert!(current.get("u2").unwrap().is_none());
    assert_eq!(legacy.count(json!({})).unwrap(), 3);

    let moved = client
        .migrate("legacy", "current", "users", Filter::predicate(|doc| doc["plan"] == "free"))
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(client.migrate("legacy", "current", "users", json!({"plan": "gold"})).unwrap(), 0);
}

/// A duplicate `_id` in the target rolls the whole migration back.
#[test]
fn test_migrate_is_all_or_nothing() {
    let client = Client::in_memory();
    let legacy = client.database("legacy").unwrap().collection("users").unwrap();
    legacy
        .insert_many(vec![json!({"_id": "u1"}), json!({"_id": "u2"})])
        .unwrap();
    let current = client.database("current").unwrap().collection("users").unwrap();
    current.insert(json!({"_id": "u2"})).unwrap();

    let err = client.migrate("legacy", "current", "users", json!({})).unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(current.count(json!({})).unwrap(), 1);
}
