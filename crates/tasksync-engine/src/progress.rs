//! Progress reporting and the pluggable callback surface (§6's
//! `callbacks: {onProgress, onConflict, onError}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tasksync_core::domain::SyncConflict;
use tasksync_core::errors::SyncError;

/// The phase names and percentage bands are literal per §4.5/§4.6/§4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    DetectingChanges,
    ResolvingConflicts,
    Syncing,
    Finalizing,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::DetectingChanges => "detecting-changes",
            Phase::ResolvingConflicts => "resolving-conflicts",
            Phase::Syncing => "syncing",
            Phase::Finalizing => "finalizing",
        }
    }
}

/// One progress update, emitted at phase transitions and after every
/// processed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percentage: u8,
    pub items_processed: usize,
    pub items_total: usize,
}

/// The caller-supplied hook surface for a sync run.
///
/// A default no-op implementation is provided so callers only override
/// the hooks they need; `on_conflict` returning `None` means "no manual
/// resolution supplied" (the `Manual` strategy then fails with
/// `ResolverError::ManualResolutionRequired`).
pub trait SyncCallbacks: Send + Sync {
    fn on_progress(&self, _event: &ProgressEvent) {}
    fn on_conflict(&self, _conflict: &SyncConflict) -> Option<Value> {
        None
    }
    fn on_error(&self, _error: &SyncError) {}
}

/// The default callback set: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl SyncCallbacks for NoopCallbacks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_strings_match_the_contract() {
        assert_eq!(Phase::DetectingChanges.as_str(), "detecting-changes");
        assert_eq!(Phase::ResolvingConflicts.as_str(), "resolving-conflicts");
        assert_eq!(Phase::Syncing.as_str(), "syncing");
        assert_eq!(Phase::Finalizing.as_str(), "finalizing");
    }

    #[test]
    fn noop_callbacks_accept_every_hook() {
        let callbacks = NoopCallbacks;
        callbacks.on_progress(&ProgressEvent {
            phase: Phase::Syncing,
            percentage: 50,
            items_processed: 1,
            items_total: 2,
        });
        assert!(callbacks.on_conflict(&SyncConflict::new("f", vec![], tasksync_core::domain::ConflictStrategy::Merge)).is_none());
    }
}
