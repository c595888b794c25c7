//! # Resolver Errors
//!
//! Structural errors (bad plan, missing parent context, snapshot of the
//! wrong shape) are fatal: they are never retried and abort the whole
//! invocation. Backend errors are not: in live mode they are reported and
//! the other subscriptions keep running.

use std::fmt;

use thiserror::Error;

use crate::plan::PlanError;
use crate::store::StoreError;

/// Result type for resolver operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Severity levels for resolver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed, other work is unaffected
    Error,
    /// The invocation must stop
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Resolver errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// Required parent or document context missing while building a
    /// backend reference
    #[error("Cannot build reference: {0}")]
    ReferenceConstruction(String),

    /// Backend returned a document where a result set was expected, or the
    /// reverse
    #[error("Unexpected snapshot for '{node}': expected {expected}, got {found}")]
    UnexpectedSnapshotShape {
        node: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Fetch or listener failure reported by the backend
    #[error("Backend error: {0}")]
    Backend(#[from] StoreError),

    /// Plan violates the node invariants
    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invocation ended without producing a value
    #[error("Invocation closed before a value was produced")]
    Closed,
}

impl ResolveError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::ReferenceConstruction(_) => "RESOLVE_REFERENCE_CONSTRUCTION",
            ResolveError::UnexpectedSnapshotShape { .. } => "RESOLVE_UNEXPECTED_SNAPSHOT_SHAPE",
            ResolveError::Backend(_) => "RESOLVE_BACKEND",
            ResolveError::InvalidPlan(_) => "RESOLVE_INVALID_PLAN",
            ResolveError::Config(_) => "RESOLVE_CONFIG",
            ResolveError::Closed => "RESOLVE_CLOSED",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            ResolveError::ReferenceConstruction(_)
            | ResolveError::UnexpectedSnapshotShape { .. }
            | ResolveError::InvalidPlan(_) => Severity::Fatal,
            ResolveError::Backend(_) | ResolveError::Config(_) | ResolveError::Closed => {
                Severity::Error
            }
        }
    }

    /// Returns whether this error ends the invocation
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
