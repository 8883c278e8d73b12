//! Error types for ifmgr operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Transient
//! external failures are usually absorbed at the call site (sentinel return
//! plus a warn log); only datastore transaction failures propagate to the
//! listener, which logs them and keeps processing independent events.

use thiserror::Error;

/// Result type alias for ifmgr operations.
pub type IfmResult<T> = Result<T, IfmError>;

/// Errors that can occur during ifmgr operations.
#[derive(Debug, Clone, Error)]
pub enum IfmError {
    /// Datastore read or transaction-submit failure.
    #[error("Datastore operation failed: {operation}: {message}")]
    Datastore {
        /// The operation that failed (e.g. "read", "submit").
        operation: String,
        /// Error message.
        message: String,
    },

    /// External RPC service call failed or returned an unsuccessful result.
    #[error("RPC to {service} failed: {message}")]
    Rpc {
        /// The service that was called (e.g. "aliveness-monitor").
        service: String,
        /// Error message.
        message: String,
    },

    /// Id allocation or release failed.
    #[error("Id allocation failed for '{key}' in pool '{pool}': {message}")]
    IdAllocation {
        /// The id pool.
        pool: String,
        /// The allocation key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Expected entry not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// What kind of entity was looked up.
        entity: String,
        /// The key that missed.
        key: String,
    },

    /// Structural conflict (e.g. a second trunk child under one parent).
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl IfmError {
    /// Creates a datastore error.
    pub fn datastore(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Datastore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an RPC error.
    pub fn rpc(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates an id-allocation error.
    pub fn id_allocation(
        pool: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::IdAllocation {
            pool: pool.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition that the
    /// next relevant event is expected to heal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IfmError::Datastore { .. } | IfmError::Rpc { .. })
    }
}
