//! The tagged error surface engines report through (§7).
//!
//! Distinct from `domain::errors::DomainError` (construction-time
//! validation failures): `SyncError` is what crosses the public API
//! boundary, carries a stable `kind()`, and is what ends up in a
//! `SyncResult`'s `errors` list.

use thiserror::Error;

/// The six error kinds the contract requires to be preserved across the
/// API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Conflict,
    Backend,
    Cancelled,
    Unknown,
}

use serde::{Deserialize, Serialize};

/// A tagged sync error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict error: {0}")]
    Conflict(String),

    #[error("backend error ({backend}): {message}")]
    Backend { backend: String, message: String },

    #[error("sync cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(_) => ErrorKind::Network,
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Conflict(_) => ErrorKind::Conflict,
            SyncError::Backend { .. } => ErrorKind::Backend,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Wraps an adapter-reported `anyhow::Error` as a `SyncError`,
    /// categorizing it by a substring heuristic on the failure's message
    /// when the adapter did not tag its own error, per §7.
    pub fn from_backend_error(backend: &str, err: anyhow::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("network")
            || lowered.contains("timeout")
            || lowered.contains("connection")
            || lowered.contains("dns")
        {
            SyncError::Network(message)
        } else if lowered.contains("validation") || lowered.contains("invalid") {
            SyncError::Validation(message)
        } else if lowered.contains("conflict") {
            SyncError::Conflict(message)
        } else {
            SyncError::Backend {
                backend: backend.to_string(),
                message,
            }
        }
    }
}
