//! `SyncResult`: the envelope returned to the caller (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tasksync_core::config::SyncDirection;
use tasksync_core::domain::SyncConflict;
use tasksync_core::errors::{ErrorKind, SyncError};

/// Per-run counters. `items_checked` counts every change the detector
/// produced, before filtering; the idempotence property (§8) requires a
/// clean second run to leave every counter but this one at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub items_checked: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub items_deleted: u64,
    pub items_skipped: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub tags_created: u64,
    pub sections_created: u64,
}

/// A serializable summary of a `SyncError`, used inside `SyncResult`
/// since the error enum itself carries no `Serialize` impl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SyncError> for SyncErrorRecord {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// The envelope every engine returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub direction: SyncDirection,
    pub backends: Vec<String>,
    pub stats: SyncStats,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<SyncErrorRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl SyncResult {
    /// Builds the finished envelope from a run's accumulated state.
    /// `success` is true iff `errors` is empty, per §7's user-visible
    /// failure rule — callers must still inspect `stats`.
    pub fn finish(
        direction: SyncDirection,
        backends: Vec<String>,
        stats: SyncStats,
        conflicts: Vec<SyncConflict>,
        errors: Vec<SyncErrorRecord>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            success: errors.is_empty(),
            direction,
            backends,
            stats,
            conflicts,
            duration_ms: (completed_at - started_at).num_milliseconds(),
            errors,
            started_at,
            completed_at,
        }
    }
}
