//! Errors raised by the Sync-State Store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("sync item not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("domain error: {0}")]
    Domain(#[from] tasksync_core::domain::DomainError),
}
