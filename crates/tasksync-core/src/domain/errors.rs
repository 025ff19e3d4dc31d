//! Domain error types
//!
//! Validation failures and invalid state transitions raised by the
//! domain model itself, as distinct from `SyncError` (the tagged
//! run-time error surface engines report through).

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid backend id (e.g. empty string)
    #[error("Invalid backend id: {0}")]
    InvalidBackendId(String),

    /// Invalid task gid
    #[error("Invalid task gid: {0}")]
    InvalidTaskGid(String),

    /// Invalid content hash format (expected 64-char hex)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A `SyncItem`'s `backendIds`/`versions`/`lastSyncTimes` maps disagree
    /// on which backend ids they cover.
    #[error("inconsistent SyncItem: {0}")]
    InconsistentSyncItem(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidBackendId("empty".to_string());
        assert_eq!(err.to_string(), "Invalid backend id: empty");

        let err = DomainError::InvalidState {
            from: "Pending".to_string(),
            to: "Completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Pending to Completed"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidTaskGid("x".to_string());
        let err2 = DomainError::InvalidTaskGid("x".to_string());
        let err3 = DomainError::InvalidTaskGid("y".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
