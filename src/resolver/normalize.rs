//! Document normalization
//!
//! Turns a backend document snapshot into the record shape placed in the
//! output tree. Only documents obtained from a fetch or listener go through
//! here; values copied from a parent object are left alone.

use serde_json::{Map, Value};

use super::config::ResolverConfig;
use crate::plan::QueryNode;
use crate::store::DocumentSnapshot;

/// Key the document id is written under
pub const ID_FIELD: &str = "id";

/// Converts raw snapshots into output records
#[derive(Debug, Clone)]
pub struct Normalizer {
    type_field: String,
    original_id_field: String,
    fallback_type: String,
}

impl Normalizer {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            type_field: config.type_field.clone(),
            original_id_field: config.original_id_field.clone(),
            fallback_type: config.fallback_type.clone(),
        }
    }

    /// Returns `None` when the document has no data.
    ///
    /// The record is a shallow copy of the data with:
    /// - `id` set to the document id, a stored non-null `id` moved to the
    ///   original-id key
    /// - the type field set to the node's collection (or subcollection)
    pub fn normalize(&self, document: &DocumentSnapshot, node: &QueryNode) -> Option<Map<String, Value>> {
        let mut record = document.data()?.clone();

        if let Some(stored) = record.get(ID_FIELD).filter(|v| !v.is_null()).cloned() {
            record.insert(self.original_id_field.clone(), stored);
        }
        record.insert(ID_FIELD.to_string(), Value::String(document.id().to_string()));

        let type_name = node.source().unwrap_or(self.fallback_type.as_str()).to_string();
        record.insert(self.type_field.clone(), Value::String(type_name));

        Some(record)
    }

    /// Normalizes into a JSON value, `null` for missing documents
    pub fn to_value(&self, document: &DocumentSnapshot, node: &QueryNode) -> Value {
        self.normalize(document, node)
            .map(Value::Object)
            .unwrap_or(Value::Null)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentPath;
    use serde_json::json;

    fn snapshot(collection: &str, id: &str, body: Value) -> DocumentSnapshot {
        DocumentSnapshot::new(
            DocumentPath::root(collection, id),
            body.as_object().cloned().unwrap(),
        )
    }

    fn node(collection: &str) -> QueryNode {
        QueryNode::field(collection).collection(collection).build().unwrap()
    }

    #[test]
    fn test_sets_id_and_type() {
        let record = Normalizer::default()
            .normalize(&snapshot("posts", "a", json!({"title": "A"})), &node("posts"))
            .unwrap();

        assert_eq!(
            Value::Object(record),
            json!({"id": "a", "title": "A", "__typename": "posts"})
        );
    }

    #[test]
    fn test_preserves_stored_id() {
        let record = Normalizer::default()
            .normalize(&snapshot("posts", "a", json!({"id": 42})), &node("posts"))
            .unwrap();

        assert_eq!(record["id"], json!("a"));
        assert_eq!(record["__original_id"], json!(42));
    }

    #[test]
    fn test_null_stored_id_not_preserved() {
        let record = Normalizer::default()
            .normalize(&snapshot("posts", "a", json!({"id": null})), &node("posts"))
            .unwrap();

        assert!(!record.contains_key("__original_id"));
    }

    #[test]
    fn test_missing_document_is_none() {
        let missing = DocumentSnapshot::missing(DocumentPath::root("posts", "x"));
        assert!(Normalizer::default().normalize(&missing, &node("posts")).is_none());
        assert_eq!(Normalizer::default().to_value(&missing, &node("posts")), Value::Null);
    }

    #[test]
    fn test_subcollection_type_and_fallback() {
        let comments = QueryNode::field("comments")
            .subcollection("comments")
            .build()
            .unwrap();
        let record = Normalizer::default()
            .normalize(&snapshot("comments", "c1", json!({})), &comments)
            .unwrap();
        assert_eq!(record["__typename"], json!("comments"));

        let plain = QueryNode::field("x").build().unwrap();
        let record = Normalizer::default()
            .normalize(&snapshot("things", "t", json!({})), &plain)
            .unwrap();
        assert_eq!(record["__typename"], json!("_"));
    }

    #[test]
    fn test_configured_keys() {
        let config = ResolverConfig {
            type_field: "kind".into(),
            original_id_field: "stored_id".into(),
            ..Default::default()
        };
        let record = Normalizer::new(&config)
            .normalize(&snapshot("posts", "a", json!({"id": "old"})), &node("posts"))
            .unwrap();
        assert_eq!(record["kind"], json!("posts"));
        assert_eq!(record["stored_id"], json!("old"));
    }
}
