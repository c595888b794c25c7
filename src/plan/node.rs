//! Query node model
//!
//! A plan is a forest of [`QueryNode`]s. Nodes are immutable once built and
//! are shared read-only (behind [`Forest`]) by every resolution of the plan,
//! including repeated passes of a live subscription.

use std::sync::Arc;

use serde::Serialize;

use super::ast::{Constraints, Filter, OrderBy};
use super::errors::{PlanError, PlanResult};

/// An ordered, shareable list of sibling nodes
pub type Forest = Arc<[QueryNode]>;

/// Collects nodes into a [`Forest`]
pub fn forest(nodes: impl IntoIterator<Item = QueryNode>) -> Forest {
    nodes.into_iter().collect::<Vec<_>>().into()
}

/// What the engine has to do for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Copied verbatim from the parent value
    Leaf,
    /// Nested object; children read from the same parent value
    Object,
    /// Top-level collection query, or a foreign-key dereference when a
    /// parent document is in scope
    Collection,
    /// Collection nested under the parent document
    Subcollection,
}

impl NodeKind {
    /// Returns true if the node reads from the database
    pub fn is_fetch(&self) -> bool {
        matches!(self, NodeKind::Collection | NodeKind::Subcollection)
    }
}

/// One field of the plan tree
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    name: String,
    alias: String,
    collection: Option<String>,
    subcollection: Option<String>,
    children: Option<Forest>,
    constraints: Option<Constraints>,
    structural_key: String,
}

/// Shape serialized into the structural key. Alias and children are left
/// out so differently-aliased siblings share one backend reference.
#[derive(Serialize)]
struct Shape<'a> {
    name: &'a str,
    collection: Option<&'a str>,
    subcollection: Option<&'a str>,
    constraints: Option<&'a Constraints>,
}

impl QueryNode {
    /// Starts building a node for the given source field
    pub fn field(name: impl Into<String>) -> QueryNodeBuilder {
        QueryNodeBuilder::new(name)
    }

    /// Source field identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output key
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn subcollection(&self) -> Option<&str> {
        self.subcollection.as_deref()
    }

    /// Child nodes, `None` for a leaf
    pub fn children(&self) -> Option<&Forest> {
        self.children.as_ref()
    }

    pub fn constraints(&self) -> Option<&Constraints> {
        self.constraints.as_ref()
    }

    /// Deterministic serialization of the node's own shape
    pub fn structural_key(&self) -> &str {
        &self.structural_key
    }

    /// Collection name if set, otherwise the subcollection name
    pub fn source(&self) -> Option<&str> {
        self.collection().or(self.subcollection())
    }

    pub fn kind(&self) -> NodeKind {
        match (&self.collection, &self.subcollection, &self.children) {
            (Some(_), _, _) => NodeKind::Collection,
            (None, Some(_), _) => NodeKind::Subcollection,
            (None, None, Some(_)) => NodeKind::Object,
            (None, None, None) => NodeKind::Leaf,
        }
    }
}

/// Builder for [`QueryNode`]
#[derive(Debug, Clone)]
pub struct QueryNodeBuilder {
    name: String,
    alias: Option<String>,
    collection: Option<String>,
    subcollection: Option<String>,
    children: Vec<QueryNode>,
    constraints: Constraints,
}

impl QueryNodeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            collection: None,
            subcollection: None,
            children: Vec::new(),
            constraints: Constraints::default(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn subcollection(mut self, subcollection: impl Into<String>) -> Self {
        self.subcollection = Some(subcollection.into());
        self
    }

    pub fn child(mut self, child: QueryNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = QueryNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.constraints.order = Some(order);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.constraints.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.constraints.limit = Some(limit);
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.constraints.limit_to_last = Some(limit);
        self
    }

    /// Validates the node and computes its structural key
    pub fn build(self) -> PlanResult<QueryNode> {
        if self.collection.is_some() && self.subcollection.is_some() {
            return Err(PlanError::ConflictingSource(self.name));
        }

        let constraints = if self.constraints.is_empty() {
            None
        } else {
            if self.collection.is_none() && self.subcollection.is_none() {
                return Err(PlanError::ConstraintsWithoutSource(self.name));
            }
            for filter in &self.constraints.filters {
                if filter.op.takes_list() && !filter.value.is_array() {
                    return Err(PlanError::ListOperandRequired {
                        node: self.name.clone(),
                        field: filter.field.to_string(),
                        op: filter.op.to_string(),
                    });
                }
            }
            Some(self.constraints)
        };

        let structural_key = serde_json::to_string(&Shape {
            name: &self.name,
            collection: self.collection.as_deref(),
            subcollection: self.subcollection.as_deref(),
            constraints: constraints.as_ref(),
        })
        .map_err(|e| PlanError::Malformed(format!("Cannot serialize node shape: {}", e)))?;

        let children = if self.children.is_empty() {
            None
        } else {
            Some(forest(self.children))
        };

        Ok(QueryNode {
            alias: self.alias.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            collection: self.collection,
            subcollection: self.subcollection,
            children,
            constraints,
            structural_key,
        })
    }
}
