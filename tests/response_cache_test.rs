//! Tests for [`ResponseCacheStore`], the context-scoped memory cache.

use std::time::Duration;

use reqstate::{ContextId, MethodDescriptor, ResponseCacheStore, Ttl};
use serde_json::json;

fn ctx(id: &str) -> ContextId {
    ContextId::new(id)
}

// =========================================================================
// Expiry
// =========================================================================

#[test]
fn set_then_get_returns_data() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("app"), &key, json!([1, 2]), Ttl::millis(1_000));

    assert_eq!(cache.get(&ctx("app"), &key), Some(json!([1, 2])));
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("app"), &key, json!("soon gone"), Ttl::millis(60_000));
    tokio::time::advance(Duration::from_millis(59_999)).await;
    assert!(cache.get(&ctx("app"), &key).is_some());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.get(&ctx("app"), &key), None);
}

#[tokio::test(start_paused = true)]
async fn infinite_entries_do_not_expire() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/config").key();

    cache.set(&ctx("app"), &key, json!({"theme": "dark"}), Ttl::Infinite);
    tokio::time::advance(Duration::from_secs(30 * 24 * 3600)).await;

    assert_eq!(cache.get(&ctx("app"), &key), Some(json!({"theme": "dark"})));
}

#[test]
fn disabled_ttl_stores_nothing() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("app"), &key, json!(1), Ttl::DISABLED);
    cache.set(&ctx("app"), &key, json!(2), Ttl::millis(0));

    assert_eq!(cache.get(&ctx("app"), &key), None);
}

#[test]
fn disabled_ttl_keeps_previous_entry() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("app"), &key, json!("old"), Ttl::millis(10_000));
    cache.set(&ctx("app"), &key, json!("new"), Ttl::DISABLED);

    assert_eq!(cache.get(&ctx("app"), &key), Some(json!("old")));
}

// =========================================================================
// Scoping and removal
// =========================================================================

#[test]
fn contexts_are_isolated() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/me").key();

    cache.set(&ctx("alice"), &key, json!("alice"), Ttl::Infinite);

    assert_eq!(cache.get(&ctx("bob"), &key), None);
    assert_eq!(cache.get(&ctx("alice"), &key), Some(json!("alice")));
}

#[test]
fn remove_is_idempotent() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("app"), &key, json!(1), Ttl::Infinite);
    cache.remove(&ctx("app"), &key);
    cache.remove(&ctx("app"), &key);

    assert!(!cache.contains(&ctx("app"), &key));
}

#[test]
fn peek_matches_get() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    assert_eq!(cache.peek(&ctx("app"), &key), None);
    cache.set(&ctx("app"), &key, json!("x"), Ttl::Infinite);
    assert_eq!(cache.peek(&ctx("app"), &key), cache.get(&ctx("app"), &key));
}

#[test]
fn clear_context_leaves_other_contexts() {
    let cache = ResponseCacheStore::new();
    let key = MethodDescriptor::get("/todos").key();

    cache.set(&ctx("a"), &key, json!("a"), Ttl::Infinite);
    cache.set(&ctx("b"), &key, json!("b"), Ttl::Infinite);
    cache.clear_context(&ctx("a"));

    assert_eq!(cache.get(&ctx("a"), &key), None);
    assert_eq!(cache.get(&ctx("b"), &key), Some(json!("b")));
}

// =========================================================================
// Method snapshots
// =========================================================================

#[test]
fn snapshot_returns_methods_written_with_set_for_method() {
    let cache = ResponseCacheStore::new();
    let todos = MethodDescriptor::get("/todos").param("page", 1);
    let users = MethodDescriptor::get("/users");

    cache.set_for_method(&ctx("app"), &todos, json!([]), Ttl::Infinite);
    cache.set_for_method(&ctx("app"), &users, json!([]), Ttl::Infinite);
    cache.set(&ctx("app"), &MethodDescriptor::get("/todos/raw").key(), json!(0), Ttl::Infinite);

    let matched = cache.snapshot_matching(&ctx("app"), |m| m.url.starts_with("/todos"));
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].key(), todos.key());
}

#[tokio::test(start_paused = true)]
async fn snapshot_skips_expired_entries() {
    let cache = ResponseCacheStore::new();
    let todos = MethodDescriptor::get("/todos");

    cache.set_for_method(&ctx("app"), &todos, json!([]), Ttl::millis(60_000));
    assert_eq!(cache.snapshot_matching(&ctx("app"), |_| true).len(), 1);
    tokio::time::advance(Duration::from_secs(61)).await;

    assert!(cache.snapshot_matching(&ctx("app"), |_| true).is_empty());
}
