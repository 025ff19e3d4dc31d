//! `ItemChange`: the ephemeral record produced by the Change Detector and
//! consumed by the engines. Never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::BackendId;

/// The attributes considered syncable for update detection and
/// propagation (§4.3). Field names match this crate's `Task` struct
/// fields, not the on-disk camelCase contract: `ItemChange` is ephemeral
/// and never persisted, so there is no wire format to match.
pub const SYNCABLE_FIELDS: &[&str] = &[
    "name",
    "notes",
    "completed",
    "due_on",
    "start_on",
    "assignee",
    "tags",
    "parent",
    "priority",
    "is_milestone",
];

/// The kind of change detected for a task on one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// One detected change to a task on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub item_id: String,
    pub change_type: ChangeType,
    pub source_backend: BackendId,
    /// Field names considered "potentially changed" for an update, or the
    /// exact delta when `detect_field_changes` was used.
    #[serde(default)]
    pub changed_fields: Option<Vec<String>>,
    /// Only populated when the caller retained the prior value (two-way
    /// and N-way, which re-fetch both sides). `None` for one-way updates
    /// and always `None` for deletes, per §4.3/§9's information-loss note.
    #[serde(default)]
    pub old_values: Option<Value>,
    #[serde(default)]
    pub new_values: Option<Value>,
    pub detected_at: DateTime<Utc>,
}

impl ItemChange {
    pub fn new(item_id: impl Into<String>, change_type: ChangeType, source_backend: BackendId) -> Self {
        Self {
            item_id: item_id.into(),
            change_type,
            source_backend,
            changed_fields: None,
            old_values: None,
            new_values: None,
            detected_at: Utc::now(),
        }
    }

    pub fn with_changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = Some(fields);
        self
    }

    pub fn with_new_values(mut self, value: Value) -> Self {
        self.new_values = Some(value);
        self
    }

    pub fn with_old_values(mut self, value: Value) -> Self {
        self.old_values = Some(value);
        self
    }
}

/// Partitions changes by their `change_type`.
pub fn group_changes_by_type(
    changes: &[ItemChange],
) -> (Vec<&ItemChange>, Vec<&ItemChange>, Vec<&ItemChange>) {
    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut deleted = Vec::new();
    for change in changes {
        match change.change_type {
            ChangeType::Created => created.push(change),
            ChangeType::Updated => updated.push(change),
            ChangeType::Deleted => deleted.push(change),
        }
    }
    (created, updated, deleted)
}

/// Selects changes detected strictly after `after`.
pub fn filter_changes_by_time<'a>(
    changes: &'a [ItemChange],
    after: DateTime<Utc>,
) -> Vec<&'a ItemChange> {
    changes.iter().filter(|c| c.detected_at > after).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(s: &str) -> BackendId {
        BackendId::new(s).unwrap()
    }

    #[test]
    fn group_changes_by_type_partitions_correctly() {
        let changes = vec![
            ItemChange::new("1", ChangeType::Created, backend("a")),
            ItemChange::new("2", ChangeType::Updated, backend("a")),
            ItemChange::new("3", ChangeType::Deleted, backend("a")),
            ItemChange::new("4", ChangeType::Created, backend("a")),
        ];
        let (created, updated, deleted) = group_changes_by_type(&changes);
        assert_eq!(created.len(), 2);
        assert_eq!(updated.len(), 1);
        assert_eq!(deleted.len(), 1);
    }

    #[test]
    fn filter_changes_by_time_excludes_earlier_entries() {
        let cutoff = Utc::now();
        let mut late = ItemChange::new("1", ChangeType::Created, backend("a"));
        late.detected_at = cutoff + chrono::Duration::seconds(1);
        let changes = vec![late.clone()];
        let filtered = filter_changes_by_time(&changes, cutoff);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0], &late);
    }
}
