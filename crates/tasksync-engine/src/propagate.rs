//! Single-change propagation: the create/update/delete mechanics shared
//! by every engine's one-sided paths (§4.5 steps 3a-3c; reused by
//! two-way and N-way wherever a change on one backend has no competing
//! change to reconcile against).

use std::collections::BTreeMap;

use tasksync_conflict::hash::content_hash;
use tasksync_core::domain::{BackendId, ChangeType, ItemChange, Task};
use tasksync_core::ports::BackendAdapter;
use tasksync_state::SyncStateStore;

use crate::patch::{diff_patch, followup_patch, seed_patch};
use crate::result::SyncStats;

/// Propagates one backend's detected change onto another and keeps the
/// Sync-State Store in step. Stateless beyond the handles it borrows, so
/// one instance is cheap to build per direction per run.
pub struct Propagator<'a> {
    pub source: &'a dyn BackendAdapter,
    pub target: &'a dyn BackendAdapter,
    pub store: &'a SyncStateStore,
    pub dry_run: bool,
}

impl<'a> Propagator<'a> {
    pub async fn propagate(
        &self,
        change: &ItemChange,
        source_backend: &BackendId,
        target_backend: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        match change.change_type {
            ChangeType::Created => self.process_created(change, source_backend, target_backend, stats).await,
            ChangeType::Updated => self.process_updated(change, source_backend, target_backend, stats).await,
            ChangeType::Deleted => self.process_deleted(change, source_backend, target_backend, stats).await,
        }
    }

    pub async fn process_created(
        &self,
        change: &ItemChange,
        source_backend: &BackendId,
        target_backend: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        if self
            .store
            .find_sync_item_by_backend_id(source_backend, &change.item_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let source_task: Task = serde_json::from_value(
            change
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: created change missing new_values"))?,
        )?;

        if self.dry_run {
            stats.items_created += 1;
            return Ok(());
        }

        let created = self.target.create_task(seed_patch(&source_task)).await?;
        let followup = followup_patch(&source_task);
        let final_target_task = if followup.is_empty() {
            created
        } else {
            self.target.update_task(&created.gid, followup).await?
        };

        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(source_backend.clone(), change.item_id.clone());
        backend_ids.insert(target_backend.clone(), final_target_task.gid.clone());
        let mut versions = BTreeMap::new();
        versions.insert(source_backend.clone(), content_hash(&source_task));
        versions.insert(target_backend.clone(), content_hash(&final_target_task));

        self.store.create_sync_item(backend_ids, versions).await?;
        stats.items_created += 1;
        Ok(())
    }

    pub async fn process_updated(
        &self,
        change: &ItemChange,
        source_backend: &BackendId,
        target_backend: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        let Some(item) = self
            .store
            .find_sync_item_by_backend_id(source_backend, &change.item_id)
            .await?
        else {
            return self.process_created(change, source_backend, target_backend, stats).await;
        };

        let desired: Task = serde_json::from_value(
            change
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: updated change missing new_values"))?,
        )?;

        if self.dry_run {
            stats.items_updated += 1;
            return Ok(());
        }

        let target_id = item
            .backend_item_id(target_backend)
            .ok_or_else(|| anyhow::anyhow!("backend error: sync item missing target slot"))?
            .to_string();
        let current_target = self
            .target
            .get_task(&target_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("backend error: target task {target_id} no longer exists"))?;

        let fields = change.changed_fields.clone().unwrap_or_default();
        let patch = diff_patch(&current_target, &desired, &fields);

        let final_target_task = if patch.is_empty() {
            current_target
        } else {
            self.target.update_task(&target_id, patch).await?
        };

        let mut updated_item = item.clone();
        updated_item.bump_version(source_backend, content_hash(&desired));
        updated_item.bump_version(target_backend, content_hash(&final_target_task));
        self.store.update_sync_item(updated_item.sync_id(), updated_item).await?;
        stats.items_updated += 1;
        Ok(())
    }

    pub async fn process_deleted(
        &self,
        change: &ItemChange,
        source_backend: &BackendId,
        target_backend: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        let Some(item) = self
            .store
            .find_sync_item_by_backend_id(source_backend, &change.item_id)
            .await?
        else {
            return Ok(());
        };

        if self.dry_run {
            stats.items_deleted += 1;
            return Ok(());
        }

        if let Some(target_id) = item.backend_item_id(target_backend) {
            self.target.delete_task(target_id).await?;
        }
        self.store.delete_sync_item(item.sync_id()).await?;
        stats.items_deleted += 1;
        Ok(())
    }
}
