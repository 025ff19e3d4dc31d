//! Change Detector (§4.3): classifies what changed on a backend since the
//! last sync, by comparing content hashes against the Sync-State Store's
//! recorded versions.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, instrument};

use tasksync_core::domain::{BackendId, ChangeType, ContentHash, ItemChange, SyncItem, Task, SYNCABLE_FIELDS};
use tasksync_core::ports::BackendAdapter;

use crate::equality::values_equal;
use crate::hash::content_hash;

/// Stateless: holds no backend handles of its own, so one instance serves
/// every sync pair.
#[derive(Debug, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classifies every task currently visible on `adapter` against the
    /// `known_items` recorded for that backend: a task with no known
    /// `SyncItem` slot is `Created`, a task whose content hash no longer
    /// matches the recorded version is `Updated`, and a known backend id
    /// with no matching current task is `Deleted`.
    #[instrument(skip(self, adapter, known_items), fields(backend = adapter.backend_id()))]
    pub async fn detect_changes(
        &self,
        adapter: &dyn BackendAdapter,
        known_items: &[SyncItem],
    ) -> anyhow::Result<Vec<ItemChange>> {
        let backend = BackendId::new(adapter.backend_id())?;
        let current_tasks = adapter.list_tasks().await?;

        let mut known_by_gid: HashMap<&str, &ContentHash> = HashMap::new();
        for item in known_items {
            if let (Some(gid), Some(hash)) = (item.backend_item_id(&backend), item.versions().get(&backend)) {
                known_by_gid.insert(gid, hash);
            }
        }

        let mut changes = Vec::new();
        let mut seen_gids = std::collections::HashSet::new();

        for task in &current_tasks {
            seen_gids.insert(task.gid.as_str());
            let new_hash = content_hash(task);
            let new_values = serde_json::to_value(task)?;
            match known_by_gid.get(task.gid.as_str()) {
                None => {
                    changes.push(
                        ItemChange::new(task.gid.clone(), ChangeType::Created, backend.clone())
                            .with_new_values(new_values),
                    );
                }
                Some(known_hash) if **known_hash != new_hash => {
                    changes.push(
                        ItemChange::new(task.gid.clone(), ChangeType::Updated, backend.clone())
                            .with_new_values(new_values)
                            .with_changed_fields(SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect()),
                    );
                }
                Some(_) => {}
            }
        }

        for gid in known_by_gid.keys() {
            if !seen_gids.contains(gid) {
                changes.push(ItemChange::new((*gid).to_string(), ChangeType::Deleted, backend.clone()));
            }
        }

        debug!(changes = changes.len(), "detected changes");
        Ok(changes)
    }

    /// Precise field-level diff between a known prior task and its current
    /// state, used by the two-way and N-way engines wherever a prior value
    /// is available (§9, resolved: falls back to the coarse syncable-field
    /// union only where one-way's create-or-unknown path has no prior
    /// value to diff against).
    ///
    /// Restricted to `SYNCABLE_FIELDS`: `gid` and other backend-local
    /// identity fields necessarily differ between two backends' copies of
    /// the same item and would otherwise show up as a spurious conflict.
    pub fn detect_field_changes(old: &Task, new: &Task) -> anyhow::Result<Vec<String>> {
        let old_value = serde_json::to_value(old)?;
        let new_value = serde_json::to_value(new)?;
        let (Value::Object(old_map), Value::Object(new_map)) = (old_value, new_value) else {
            return Ok(Vec::new());
        };

        let mut fields: Vec<String> = SYNCABLE_FIELDS
            .iter()
            .map(|f| f.to_string())
            .filter(|key| {
                let old_field = old_map.get(key).unwrap_or(&Value::Null);
                let new_field = new_map.get(key).unwrap_or(&Value::Null);
                !values_equal(old_field, new_field)
            })
            .collect();
        fields.sort();
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tasksync_core::domain::{Section, Tag, TaskPatch};
    use tokio::sync::Mutex;

    use super::*;

    struct StubAdapter {
        id: &'static str,
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl BackendAdapter for StubAdapter {
        fn backend_id(&self) -> &str {
            self.id
        }

        async fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
            Ok(self.tasks.lock().await.clone())
        }

        async fn get_task(&self, gid: &str) -> anyhow::Result<Option<Task>> {
            Ok(self.tasks.lock().await.iter().find(|t| t.gid == gid).cloned())
        }

        async fn create_task(&self, _seed: TaskPatch) -> anyhow::Result<Task> {
            unimplemented!()
        }

        async fn update_task(&self, _gid: &str, _patch: TaskPatch) -> anyhow::Result<Task> {
            unimplemented!()
        }

        async fn delete_task(&self, _gid: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
            Ok(Vec::new())
        }

        async fn create_tag(&self, _name: &str) -> anyhow::Result<Tag> {
            unimplemented!()
        }

        async fn list_sections(&self) -> anyhow::Result<Vec<Section>> {
            Ok(Vec::new())
        }

        async fn create_section(&self, _name: &str) -> anyhow::Result<Section> {
            unimplemented!()
        }
    }

    fn backend() -> BackendId {
        BackendId::new("asana").unwrap()
    }

    #[tokio::test]
    async fn new_task_with_no_known_slot_is_created() {
        let adapter = StubAdapter {
            id: "asana",
            tasks: Mutex::new(vec![Task::new("t1", "New")]),
        };
        let changes = ChangeDetector::new().detect_changes(&adapter, &[]).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Created);
    }

    #[tokio::test]
    async fn task_with_changed_hash_is_updated() {
        let task = Task::new("t1", "Original");
        let backend_ids = [(backend(), "t1".to_string())].into_iter().collect();
        let versions = [(backend(), content_hash(&task))].into_iter().collect();
        let known = SyncItem::new(backend_ids, versions).unwrap();

        let mut changed = task.clone();
        changed.completed = true;
        let adapter = StubAdapter {
            id: "asana",
            tasks: Mutex::new(vec![changed]),
        };

        let changes = ChangeDetector::new()
            .detect_changes(&adapter, std::slice::from_ref(&known))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Updated);
    }

    #[tokio::test]
    async fn task_with_unchanged_hash_produces_no_change() {
        let task = Task::new("t1", "Original");
        let backend_ids = [(backend(), "t1".to_string())].into_iter().collect();
        let versions = [(backend(), content_hash(&task))].into_iter().collect();
        let known = SyncItem::new(backend_ids, versions).unwrap();

        let adapter = StubAdapter {
            id: "asana",
            tasks: Mutex::new(vec![task]),
        };

        let changes = ChangeDetector::new()
            .detect_changes(&adapter, std::slice::from_ref(&known))
            .await
            .unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn missing_known_task_is_deleted() {
        let task = Task::new("t1", "Gone");
        let backend_ids = [(backend(), "t1".to_string())].into_iter().collect();
        let versions = [(backend(), content_hash(&task))].into_iter().collect();
        let known = SyncItem::new(backend_ids, versions).unwrap();

        let adapter = StubAdapter {
            id: "asana",
            tasks: Mutex::new(vec![]),
        };

        let changes = ChangeDetector::new()
            .detect_changes(&adapter, std::slice::from_ref(&known))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Deleted);
    }

    #[test]
    fn detect_field_changes_reports_only_differing_fields() {
        let old = Task::new("t1", "Same name");
        let mut new = old.clone();
        new.completed = true;
        new.notes = Some("added".to_string());

        let fields = ChangeDetector::detect_field_changes(&old, &new).unwrap();
        assert!(fields.contains(&"completed".to_string()));
        assert!(fields.contains(&"notes".to_string()));
        assert!(!fields.contains(&"name".to_string()));
    }
}
