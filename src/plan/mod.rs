//! Query plan model
//!
//! The engine consumes a forest of immutable [`QueryNode`]s produced by an
//! external plan builder. Each node is one of:
//!
//! - a scalar leaf copied from the parent value
//! - a nested object whose children read the same parent value
//! - a collection fetch (top-level query, or foreign-key dereference when a
//!   parent document is in scope)
//! - a subcollection fetch under the parent document

mod ast;
mod errors;
mod loader;
mod node;

pub use ast::{Constraints, FieldPath, Filter, FilterOp, OrderBy, SortDirection, DOCUMENT_ID_FIELD};
pub use errors::{PlanError, PlanResult};
pub use loader::{forest_from_file, forest_from_json, PlanNode, PlanVariables};
pub use node::{forest, Forest, NodeKind, QueryNode, QueryNodeBuilder};
