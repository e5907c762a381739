//! Error types for the memory store.

use thiserror::Error;

/// Unified error type for memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Input rejected before any mutation (empty query, importance out of
    /// range, unknown type). Operations raising this have no side effects.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing store failure, tagged with the operation that hit it.
    #[error("Storage error during {operation}: {message}")]
    Storage {
        /// The logical operation that failed (store, recall, prune, ...)
        operation: String,
        /// Underlying driver message
        message: String,
    },

    /// The store rejected a concurrent write. Retriable by the caller;
    /// the engine itself never queues or retries.
    #[error("Store busy: {0}")]
    Busy(String),

    /// Target memory does not exist or has been purged.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MemoryError {
    /// Wrap a driver-level message with operation context.
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        MemoryError::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the operation verbatim.
    pub fn is_retriable(&self) -> bool {
        matches!(self, MemoryError::Busy(_))
    }
}

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_carries_operation() {
        let err = MemoryError::storage("prune", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "Storage error during prune: disk I/O error"
        );
    }

    #[test]
    fn test_only_busy_is_retriable() {
        assert!(MemoryError::Busy("database is locked".into()).is_retriable());
        assert!(!MemoryError::NotFound("mem_x".into()).is_retriable());
        assert!(!MemoryError::Validation("empty query".into()).is_retriable());
    }
}
