//! One-shot Resolution Tests
//!
//! End-to-end behavior of `OperationMode::Query` against the in-memory store:
//! - Composition of collections, subcollections and foreign keys
//! - Reference sharing between structurally identical nodes
//! - Completion gating and error reporting

use std::sync::Arc;

use serde_json::{json, Value};

use docresolve::plan::{forest, forest_from_json, Filter, FilterOp, OrderBy, QueryNode};
use docresolve::resolver::{Executor, OperationMode, ResolveError};
use docresolve::store::{DocumentPath, MemoryStore, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn leaf(name: &str) -> QueryNode {
    QueryNode::field(name).build().unwrap()
}

fn blog() -> MemoryStore {
    let store = MemoryStore::recording();
    store.insert("users", "u1", json!({"name": "Ada"})).unwrap();
    store.insert("users", "u2", json!({"name": "Grace"})).unwrap();
    store
        .insert("posts", "a", json!({"title": "A", "author": "u1", "published": true, "rank": 2}))
        .unwrap();
    store
        .insert("posts", "b", json!({"title": "B", "author": "u2", "published": false, "rank": 1}))
        .unwrap();
    store
        .set(
            DocumentPath::root("posts", "a").child("comments", "c1"),
            json!({"body": "first", "by": "u2"}),
        )
        .unwrap();
    store
}

fn executor(store: &MemoryStore) -> Executor {
    Executor::new(Arc::new(store.clone()))
}

// =============================================================================
// Composition
// =============================================================================

/// A collection node yields normalized records.
#[tokio::test]
async fn test_collection_records_normalized() {
    let store = MemoryStore::new();
    store.insert("posts", "a", json!({"title": "A"})).unwrap();

    let plan = forest(vec![QueryNode::field("posts")
        .collection("posts")
        .children([leaf("id"), leaf("title"), leaf("__typename")])
        .build()
        .unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(
        value,
        json!({"posts": [{"id": "a", "title": "A", "__typename": "posts"}]})
    );
}

/// Without children the full normalized record is placed.
#[tokio::test]
async fn test_childless_collection_places_records() {
    let store = blog();
    let plan = forest(vec![QueryNode::field("users").collection("users").build().unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(
        value["users"],
        json!([
            {"id": "u1", "name": "Ada", "__typename": "users"},
            {"id": "u2", "name": "Grace", "__typename": "users"}
        ])
    );
}

/// Foreign keys, subcollections and nested foreign keys compose into one tree.
#[tokio::test]
async fn test_full_tree() {
    let store = blog();
    let plan = forest(vec![QueryNode::field("posts")
        .collection("posts")
        .order_by(OrderBy::desc("rank"))
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
                .child(
                    QueryNode::field("by")
                        .collection("users")
                        .child(leaf("name"))
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(
        value,
        json!({"posts": [
            {
                "title": "A",
                "author": {"name": "Ada"},
                "comments": [{"body": "first", "by": {"name": "Grace"}}]
            },
            {
                "title": "B",
                "author": {"name": "Grace"},
                "comments": []
            }
        ]})
    );
}

/// Each id of a foreign-key list resolves in place; unknown ids become null.
#[tokio::test]
async fn test_foreign_key_list_with_gaps() {
    let store = blog();
    store
        .insert("teams", "t1", json!({"members": ["u1", "nobody", null, "u2"]}))
        .unwrap();

    let plan = forest(vec![QueryNode::field("teams")
        .collection("teams")
        .child(
            QueryNode::field("members")
                .collection("users")
                .child(leaf("name"))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(
        value["teams"][0]["members"],
        json!([{"name": "Ada"}, null, null, {"name": "Grace"}])
    );
}

/// A post without an author field yields null, not an error.
#[tokio::test]
async fn test_dangling_foreign_key() {
    let store = MemoryStore::new();
    store.insert("posts", "a", json!({"title": "A"})).unwrap();

    let plan = forest(vec![QueryNode::field("posts")
        .collection("posts")
        .child(QueryNode::field("author").collection("users").build().unwrap())
        .build()
        .unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(value, json!({"posts": [{"author": null}]}));
}

/// Constraints narrow the backend query.
#[tokio::test]
async fn test_constraints_applied() {
    let store = blog();
    let plan = forest(vec![QueryNode::field("posts")
        .collection("posts")
        .filter(Filter::new("published", FilterOp::Eq, json!(true)))
        .child(leaf("title"))
        .build()
        .unwrap()]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(value, json!({"posts": [{"title": "A"}]}));
}

/// Plans loaded from JSON resolve the same way.
#[tokio::test]
async fn test_json_plan() {
    let store = blog();
    let plan = forest_from_json(
        r#"[{
            "name": "posts",
            "alias": "latest",
            "collection": "posts",
            "variables": {"order": ["rank", "asc"], "limit": 1},
            "children": [{"name": "title"}]
        }]"#,
    )
    .unwrap();

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(value, json!({"latest": [{"title": "B"}]}));
}

// =============================================================================
// Parent Values
// =============================================================================

/// A forest without fetch nodes settles during `execute`.
#[tokio::test]
async fn test_no_fetch_forest_emits_immediately() {
    let store = MemoryStore::new();
    let plan = forest(vec![
        leaf("a"),
        QueryNode::field("b").alias("bee").build().unwrap(),
        QueryNode::field("meta").child(leaf("x")).build().unwrap(),
    ]);

    let mut invocation = executor(&store)
        .execute(
            &plan,
            Some(json!({"a": 1, "b": [1, 2], "meta": {"x": true, "y": false}})),
            OperationMode::Query,
        )
        .unwrap();

    let value = invocation.try_next().unwrap().unwrap();
    assert_eq!(value, json!({"a": 1, "bee": [1, 2], "meta": {"x": true}}));
    assert!(invocation.is_closed());
}

/// Nested objects map over arrays and pass null through.
#[tokio::test]
async fn test_nested_object_over_array_and_null() {
    let store = MemoryStore::new();
    let plan = forest(vec![
        QueryNode::field("items").child(leaf("x")).build().unwrap(),
        QueryNode::field("missing").child(leaf("x")).build().unwrap(),
    ]);

    let mut invocation = executor(&store)
        .execute(
            &plan,
            Some(json!({"items": [{"x": 1, "y": 2}, null, {"y": 3}]})),
            OperationMode::Query,
        )
        .unwrap();

    let value = invocation.next().await.unwrap().unwrap();
    assert_eq!(
        value,
        json!({"items": [{"x": 1}, null, {"x": null}], "missing": null})
    );
}

// =============================================================================
// Reference Sharing
// =============================================================================

/// Structurally identical siblings use one reference handle.
#[tokio::test]
async fn test_sibling_nodes_share_reference() {
    let store = blog();
    let plan = forest(vec![
        QueryNode::field("posts").collection("posts").alias("first").build().unwrap(),
        QueryNode::field("posts").collection("posts").alias("second").build().unwrap(),
    ]);

    let executor = executor(&store);
    let value = executor.query(&plan).await.unwrap();
    assert_eq!(value["first"], value["second"]);

    let served = store.served_references();
    assert_eq!(served.len(), 2);
    assert!(Arc::ptr_eq(&served[0], &served[1]));

    let metrics = executor.metrics().snapshot();
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_hits, 1);
}

/// Different constraints mean different references.
#[tokio::test]
async fn test_distinct_constraints_not_shared() {
    let store = blog();
    let plan = forest(vec![
        QueryNode::field("posts").collection("posts").alias("one").limit(1).build().unwrap(),
        QueryNode::field("posts").collection("posts").alias("two").limit(2).build().unwrap(),
    ]);

    let value = executor(&store).query(&plan).await.unwrap();
    assert_eq!(value["one"].as_array().unwrap().len(), 1);
    assert_eq!(value["two"].as_array().unwrap().len(), 2);

    let served = store.served_references();
    assert!(!Arc::ptr_eq(&served[0], &served[1]));
}

// =============================================================================
// Failures
// =============================================================================

/// A failed fetch rejects the query.
#[tokio::test]
async fn test_fetch_failure_rejects() {
    let store = blog();
    store.fail_fetches(Some(StoreError::PermissionDenied("posts".into())));

    let plan = forest(vec![QueryNode::field("posts").collection("posts").build().unwrap()]);
    let err = executor(&store).query(&plan).await.unwrap_err();

    assert_eq!(err.code(), "RESOLVE_BACKEND");
    assert!(!err.is_fatal());
}

/// A subcollection at the root has no parent document.
#[tokio::test]
async fn test_root_subcollection_rejected() {
    let store = blog();
    let plan = forest(vec![QueryNode::field("comments")
        .subcollection("comments")
        .build()
        .unwrap()]);

    let err = executor(&store)
        .execute(&plan, None, OperationMode::Query)
        .unwrap_err();
    assert!(matches!(err, ResolveError::ReferenceConstruction(_)));
}

/// A foreign-key value that cannot name a document is fatal.
#[tokio::test]
async fn test_unusable_foreign_key() {
    let store = MemoryStore::new();
    store.insert("posts", "a", json!({"author": {"nested": true}})).unwrap();

    let plan = forest(vec![QueryNode::field("posts")
        .collection("posts")
        .child(QueryNode::field("author").collection("users").build().unwrap())
        .build()
        .unwrap()]);

    let err = executor(&store).query(&plan).await.unwrap_err();
    assert!(err.is_fatal());
}

/// Cleanup after a one-shot has finished is a no-op.
#[tokio::test]
async fn test_cleanup_after_completion() {
    let store = blog();
    let plan = forest(vec![QueryNode::field("posts").collection("posts").build().unwrap()]);

    let mut invocation = executor(&store)
        .execute(&plan, None, OperationMode::Query)
        .unwrap();
    let value: Value = invocation.next().await.unwrap().unwrap();
    assert_eq!(value["posts"].as_array().unwrap().len(), 2);

    let handle = invocation.handle();
    handle.cleanup();
    handle.cleanup();
    assert!(invocation.next().await.is_none());
}
