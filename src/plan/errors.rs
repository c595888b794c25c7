//! Plan error types

use thiserror::Error;

/// Result type for plan construction
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised while building or loading a query plan
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Node names both a collection and a subcollection
    #[error("Node '{0}' sets both a collection and a subcollection")]
    ConflictingSource(String),

    /// Constraints on a node that never fetches anything
    #[error("Node '{0}' has constraints but no collection or subcollection")]
    ConstraintsWithoutSource(String),

    /// List operator used with a non-list operand
    #[error("Filter '{field} {op}' on node '{node}' requires a list operand")]
    ListOperandRequired {
        node: String,
        field: String,
        op: String,
    },

    /// Plan document could not be decoded
    #[error("Malformed plan: {0}")]
    Malformed(String),
}

impl PlanError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::ConflictingSource(_) => "PLAN_CONFLICTING_SOURCE",
            PlanError::ConstraintsWithoutSource(_) => "PLAN_CONSTRAINTS_WITHOUT_SOURCE",
            PlanError::ListOperandRequired { .. } => "PLAN_LIST_OPERAND_REQUIRED",
            PlanError::Malformed(_) => "PLAN_MALFORMED",
        }
    }
}
