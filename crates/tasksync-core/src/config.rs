//! Configuration module for the sync core.
//!
//! Provides typed configuration structs that map to the YAML
//! configuration surface described in the on-disk contract, with
//! loading, validation, and sane defaults for programmatic use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::conflict::ConflictStrategy;

/// Reconciliation direction for a sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    OneWay,
    TwoWay,
    NWay,
}

/// A filter applied to detected changes before they propagate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncFilter {
    /// Only propagate tasks whose `completed` matches, if set.
    pub completed: Option<bool>,
    /// Only propagate tasks carrying at least one of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Only propagate tasks belonging to one of these sections (by name).
    #[serde(default)]
    pub sections: Vec<String>,
    /// Only propagate tasks assigned to one of these assignee gids.
    #[serde(default)]
    pub assignees: Vec<String>,
    /// Only propagate changes detected after this time.
    pub modified_after: Option<chrono::DateTime<chrono::Utc>>,
}

/// The recognized sync configuration surface (§6).
///
/// `direction` and `conflict_strategy` are required by the contract;
/// everything else has a permissive default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    #[serde(default)]
    pub sync_tags: bool,
    #[serde(default)]
    pub sync_sections: bool,
    #[serde(default)]
    pub sync_subtasks: bool,
    #[serde(default)]
    pub sync_comments: bool,
    #[serde(default)]
    pub sync_attachments: bool,
    #[serde(default)]
    pub sync_dependencies: bool,
    #[serde(default)]
    pub sync_time_entries: bool,
    #[serde(default)]
    pub sync_custom_fields: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub filter: SyncFilter,
}

fn default_batch_size() -> u32 {
    100
}

impl SyncConfig {
    /// A minimal config: the two required fields, everything else at its
    /// permissive default.
    pub fn new(direction: SyncDirection, conflict_strategy: ConflictStrategy) -> Self {
        Self {
            direction,
            conflict_strategy,
            sync_tags: false,
            sync_sections: false,
            sync_subtasks: false,
            sync_comments: false,
            sync_attachments: false,
            sync_dependencies: false,
            sync_time_entries: false,
            sync_custom_fields: false,
            dry_run: false,
            batch_size: default_batch_size(),
            filter: SyncFilter::default(),
        }
    }

    /// Loads a `SyncConfig` from a YAML document on disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_permissive_defaults() {
        let cfg = SyncConfig::new(SyncDirection::TwoWay, ConflictStrategy::Merge);
        assert!(!cfg.dry_run);
        assert!(!cfg.sync_tags);
        assert_eq!(cfg.batch_size, 100);
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
direction: two-way
conflict_strategy: last-write-wins
sync_tags: true
"#;
        let cfg: SyncConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.direction, SyncDirection::TwoWay);
        assert_eq!(cfg.conflict_strategy, ConflictStrategy::LastWriteWins);
        assert!(cfg.sync_tags);
        assert!(!cfg.sync_sections);
    }
}
