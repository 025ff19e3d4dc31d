//! `SyncConflict`: a disagreement between backends about the value of one
//! syncable field on one sync identity, plus the strategies used to
//! resolve it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::BackendId;

/// The configured strategy for resolving a `SyncConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    SourceWins,
    TargetWins,
    LastWriteWins,
    FirstWriteWins,
    Manual,
    Merge,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictStrategy::SourceWins => "source-wins",
            ConflictStrategy::TargetWins => "target-wins",
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::FirstWriteWins => "first-write-wins",
            ConflictStrategy::Manual => "manual",
            ConflictStrategy::Merge => "merge",
        };
        write!(f, "{s}")
    }
}

/// How a conflict was ultimately resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub chosen_value: Value,
    pub chosen_backend: Option<BackendId>,
    pub resolved_at: DateTime<Utc>,
}

/// A field-level disagreement between two or more backends for the same
/// sync identity.
///
/// `values` preserves the insertion order of the backends that were
/// compared: strategies that pick "the first" or "the second" value rely
/// on this order, not on any particular backend identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub field: String,
    pub values: Vec<(BackendId, Value)>,
    pub detected_at: DateTime<Utc>,
    pub strategy: ConflictStrategy,
    pub resolved: bool,
    pub resolution: Option<ConflictResolution>,
}

impl SyncConflict {
    pub fn new(field: impl Into<String>, values: Vec<(BackendId, Value)>, strategy: ConflictStrategy) -> Self {
        Self {
            field: field.into(),
            values,
            detected_at: Utc::now(),
            strategy,
            resolved: false,
            resolution: None,
        }
    }

    /// The competing value map, for callers that want `O(1)` lookup by
    /// backend instead of the ordered `Vec`.
    pub fn values_by_backend(&self) -> BTreeMap<BackendId, Value> {
        self.values.iter().cloned().collect()
    }

    /// Stamps this conflict as resolved with the chosen value.
    ///
    /// Idempotent: a conflict that is already resolved is left unchanged,
    /// mirroring the consuming-builder style used elsewhere in this
    /// domain for resolution records.
    pub fn mark_resolved(mut self, chosen_value: Value, chosen_backend: Option<BackendId>) -> Self {
        if self.resolved {
            return self;
        }
        self.resolution = Some(ConflictResolution {
            chosen_value,
            chosen_backend,
            resolved_at: Utc::now(),
        });
        self.resolved = true;
        self
    }
}
