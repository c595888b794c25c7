//! Live Subscription Tests
//!
//! Behavior of `OperationMode::Subscribe` on a paused clock:
//! - Emissions are coalesced (trailing edge, one window)
//! - Changes anywhere in the tree re-emit the whole settled value
//! - Cleanup detaches every listener exactly once
//! - Backend failures are reported without stopping other listeners

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time;

use docresolve::plan::{forest, Forest, QueryNode};
use docresolve::resolver::{Executor, Invocation, ResolveError};
use docresolve::store::{DocumentPath, MemoryStore, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

const WINDOW: Duration = Duration::from_millis(100);

fn leaf(name: &str) -> QueryNode {
    QueryNode::field(name).build().unwrap()
}

fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert("users", "u1", json!({"name": "Ada"})).unwrap();
    store.insert("posts", "a", json!({"title": "A", "author": "u1"})).unwrap();
    store.insert("posts", "b", json!({"title": "B", "author": "u1"})).unwrap();
    store
}

fn posts_plan() -> Forest {
    forest(vec![QueryNode::field("posts")
        .collection("posts")
        .child(leaf("title"))
        .child(
            QueryNode::field("author")
                .collection("users")
                .child(leaf("name"))
                .build()
                .unwrap(),
        )
        .child(
            QueryNode::field("comments")
                .subcollection("comments")
                .child(leaf("body"))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()])
}

fn subscribe(store: &MemoryStore, plan: &Forest) -> (Executor, Invocation) {
    let executor = Executor::new(Arc::new(store.clone()));
    let invocation = executor.subscribe(plan).unwrap();
    (executor, invocation)
}

// =============================================================================
// Coalescing
// =============================================================================

/// Nothing is delivered before the first window closes.
#[tokio::test(start_paused = true)]
async fn test_first_value_trails_window() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());

    time::sleep(WINDOW / 2).await;
    assert!(invocation.try_next().is_none());

    time::sleep(WINDOW).await;
    let value = invocation.try_next().unwrap().unwrap();
    assert_eq!(value["posts"].as_array().unwrap().len(), 2);
    assert_eq!(value["posts"][0]["author"], json!({"name": "Ada"}));
}

/// Two changes inside one window produce one emission with both.
#[tokio::test(start_paused = true)]
async fn test_burst_coalesced() {
    let store = seeded();
    let (executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();

    store.insert("posts", "c", json!({"title": "C"})).unwrap();
    time::sleep(WINDOW / 10).await;
    store.insert("posts", "d", json!({"title": "D"})).unwrap();
    time::sleep(WINDOW + WINDOW / 2).await;

    let value = invocation.try_next().unwrap().unwrap();
    assert_eq!(value["posts"].as_array().unwrap().len(), 4);
    assert!(invocation.try_next().is_none());

    // Both changes settled in the engine; only one reached the caller
    assert_eq!(executor.metrics().snapshot().values_emitted, 3);
}

// =============================================================================
// Change Propagation
// =============================================================================

/// A change to a foreign-key target re-emits the whole tree.
#[tokio::test(start_paused = true)]
async fn test_foreign_key_target_change() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();

    store.insert("users", "u1", json!({"name": "Ada L."})).unwrap();
    let value = invocation.next().await.unwrap().unwrap();

    assert_eq!(value["posts"][0]["author"], json!({"name": "Ada L."}));
    assert_eq!(value["posts"][1]["author"], json!({"name": "Ada L."}));
}

/// A subcollection update rebuilds only its own branch; listener count is
/// unchanged.
#[tokio::test(start_paused = true)]
async fn test_subcollection_update() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();
    let listeners = store.listener_count();

    store
        .set(
            DocumentPath::root("posts", "b").child("comments", "c1"),
            json!({"body": "hello"}),
        )
        .unwrap();
    let value = invocation.next().await.unwrap().unwrap();

    assert_eq!(value["posts"][0]["comments"], json!([]));
    assert_eq!(value["posts"][1]["comments"], json!([{"body": "hello"}]));
    assert_eq!(store.listener_count(), listeners);
}

/// A new parent snapshot replaces the previous child subscriptions.
#[tokio::test(start_paused = true)]
async fn test_parent_change_replaces_children() {
    let store = seeded();
    store.insert("users", "u2", json!({"name": "Grace"})).unwrap();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();
    let listeners = store.listener_count();

    store.insert("posts", "a", json!({"title": "A2", "author": "u2"})).unwrap();
    let value = invocation.next().await.unwrap().unwrap();

    assert_eq!(value["posts"][0]["title"], json!("A2"));
    assert_eq!(value["posts"][0]["author"], json!({"name": "Grace"}));
    assert_eq!(value["posts"][1]["author"], json!({"name": "Ada"}));
    assert_eq!(store.listener_count(), listeners);
}

/// Repeated updates on a default store leave no per-reference log behind.
#[tokio::test(start_paused = true)]
async fn test_long_subscription_keeps_no_served_log() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();

    for round in 0..5 {
        store
            .insert("users", "u1", json!({"name": format!("Ada {}", round)}))
            .unwrap();
        invocation.next().await.unwrap().unwrap();
    }

    assert!(store.served_references().is_empty());
}

// =============================================================================
// Failures
// =============================================================================

/// A listener failure is reported; other listeners keep emitting.
#[tokio::test(start_paused = true)]
async fn test_listener_failure_isolated() {
    let store = seeded();
    let plan = forest(vec![
        QueryNode::field("posts").collection("posts").child(leaf("title")).build().unwrap(),
        QueryNode::field("users").collection("users").child(leaf("name")).build().unwrap(),
    ]);
    let (_executor, mut invocation) = subscribe(&store, &plan);
    invocation.next().await.unwrap().unwrap();

    assert_eq!(
        store.fail_listeners("users", StoreError::Unavailable("users offline".into())),
        1
    );
    let err = invocation.next().await.unwrap().unwrap_err();
    assert_eq!(err, ResolveError::Backend(StoreError::Unavailable("users offline".into())));
    assert!(!invocation.is_closed());

    store.insert("posts", "c", json!({"title": "C"})).unwrap();
    let value = invocation.next().await.unwrap().unwrap();
    assert_eq!(value["posts"].as_array().unwrap().len(), 3);
    assert_eq!(value["users"], json!([{"name": "Ada"}]));
}

/// A fatal error inside an open window is the last item; the buffered value
/// from before the failure is never delivered.
#[tokio::test(start_paused = true)]
async fn test_fatal_error_ends_stream() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());

    // The first settled value is buffered, its window still open
    time::sleep(WINDOW / 10).await;
    assert!(invocation.try_next().is_none());

    store
        .insert("posts", "a", json!({"title": "A", "author": {"x": 1}}))
        .unwrap();

    let err = invocation.next().await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code(), "RESOLVE_REFERENCE_CONSTRUCTION");
    assert!(invocation.next().await.is_none());
    assert!(invocation.is_closed());
    assert_eq!(store.listener_count(), 0);
}

// =============================================================================
// Cleanup
// =============================================================================

/// Cleanup detaches every listener, once, and ends the stream.
#[tokio::test(start_paused = true)]
async fn test_cleanup_idempotent() {
    let store = seeded();
    let (executor, mut invocation) = subscribe(&store, &posts_plan());
    invocation.next().await.unwrap().unwrap();
    assert!(store.listener_count() > 0);

    let handle = invocation.handle();
    handle.cleanup();
    handle.cleanup();
    invocation.cleanup();

    assert_eq!(store.listener_count(), 0);
    let metrics = executor.metrics().snapshot();
    assert_eq!(metrics.listeners_attached, metrics.listeners_detached);
    assert_eq!(executor.metrics().active_listeners(), 0);

    store.insert("posts", "z", json!({"title": "Z"})).unwrap();
    assert!(invocation.next().await.is_none());
}

/// Cleanup before the first window closes suppresses the pending value.
#[tokio::test(start_paused = true)]
async fn test_cleanup_before_first_emission() {
    let store = seeded();
    let (_executor, mut invocation) = subscribe(&store, &posts_plan());

    invocation.cleanup();
    time::sleep(WINDOW * 2).await;

    assert!(invocation.next().await.is_none());
    assert_eq!(store.listener_count(), 0);
}

/// Dropping the invocation cleans it up.
#[tokio::test(start_paused = true)]
async fn test_drop_cleans_up() {
    let store = seeded();
    let (_executor, invocation) = subscribe(&store, &posts_plan());
    assert!(store.listener_count() > 0);

    drop(invocation);
    assert_eq!(store.listener_count(), 0);
}
