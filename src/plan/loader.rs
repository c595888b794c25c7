//! JSON plan loading
//!
//! Accepts the plan shape emitted by the external plan builder:
//!
//! ```json
//! [{ "name": "posts", "collection": "posts",
//!    "variables": { "order": ["createdAt", "desc"], "limit": 10,
//!                   "where": [["published", "==", true]] },
//!    "children": [{ "name": "title" }] }]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::ast::{FieldPath, Filter, FilterOp, OrderBy, SortDirection};
use super::errors::{PlanError, PlanResult};
use super::node::{forest, Forest, QueryNode};

/// Serialized constraint block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanVariables {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub limit_to_last: Option<u32>,
    #[serde(default)]
    pub order: Option<(String, SortDirection)>,
    #[serde(default, rename = "where")]
    pub filters: Option<Vec<(String, FilterOp, Value)>>,
}

/// Serialized plan node
#[derive(Debug, Clone, Deserialize)]
pub struct PlanNode {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub subcollection: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<PlanNode>>,
    #[serde(default)]
    pub variables: Option<PlanVariables>,
}

impl PlanNode {
    /// Converts into a validated [`QueryNode`]
    pub fn into_node(self) -> PlanResult<QueryNode> {
        let mut builder = QueryNode::field(self.name);
        if let Some(alias) = self.alias {
            builder = builder.alias(alias);
        }
        if let Some(collection) = self.collection {
            builder = builder.collection(collection);
        }
        if let Some(subcollection) = self.subcollection {
            builder = builder.subcollection(subcollection);
        }
        if let Some(variables) = self.variables {
            if let Some((field, direction)) = variables.order {
                builder = builder.order_by(OrderBy { field, direction });
            }
            for (field, op, value) in variables.filters.unwrap_or_default() {
                builder = builder.filter(Filter::new(FieldPath::from(field), op, value));
            }
            if let Some(limit) = variables.limit {
                builder = builder.limit(limit);
            }
            if let Some(limit) = variables.limit_to_last {
                builder = builder.limit_to_last(limit);
            }
        }
        for child in self.children.unwrap_or_default() {
            builder = builder.child(child.into_node()?);
        }
        builder.build()
    }
}

/// Parses a JSON array of plan nodes
pub fn forest_from_json(json: &str) -> PlanResult<Forest> {
    let nodes: Vec<PlanNode> =
        serde_json::from_str(json).map_err(|e| PlanError::Malformed(format!("Invalid JSON: {}", e)))?;
    let nodes = nodes
        .into_iter()
        .map(PlanNode::into_node)
        .collect::<PlanResult<Vec<_>>>()?;
    Ok(forest(nodes))
}

/// Loads a plan file
pub fn forest_from_file(path: &Path) -> PlanResult<Forest> {
    let content = fs::read_to_string(path).map_err(|e| {
        PlanError::Malformed(format!("Failed to read {}: {}", path.display(), e))
    })?;
    forest_from_json(&content)
}
