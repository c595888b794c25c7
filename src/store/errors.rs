//! # Store Errors
//!
//! Failures reported by a document database backend.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Caller may not read this reference
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Reference or operand rejected by the backend
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Addressed entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "STORE_UNAVAILABLE",
            StoreError::PermissionDenied(_) => "STORE_PERMISSION_DENIED",
            StoreError::InvalidArgument(_) => "STORE_INVALID_ARGUMENT",
            StoreError::NotFound(_) => "STORE_NOT_FOUND",
            StoreError::Internal(_) => "STORE_INTERNAL",
        }
    }
}
