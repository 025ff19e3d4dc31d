//! Two-Way Sync Engine (§4.6): reconciles two backends' concurrent
//! changes against one shared Sync-State Store, resolving field-level
//! conflicts under the configured strategy.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tasksync_conflict::hash::content_hash;
use tasksync_conflict::{merge_items, ChangeDetector, ConflictResolver};
use tasksync_core::config::{SyncConfig, SyncDirection};
use tasksync_core::domain::{
    BackendId, ChangeType, ConflictStrategy, ItemChange, SyncConflict, SyncItem, Task, SYNCABLE_FIELDS,
};
use tasksync_core::errors::SyncError;
use tasksync_core::ports::BackendAdapter;
use tasksync_state::SyncStateStore;

use crate::patch::{diff_patch, followup_patch, seed_patch};
use crate::filter::passes_filter;
use crate::progress::{Phase, ProgressEvent, SyncCallbacks};
use crate::propagate::Propagator;
use crate::result::{SyncErrorRecord, SyncResult, SyncStats};
use crate::taxonomy::{sync_sections_union, sync_tags_union};

/// One pairing slot: up to one change per side, plus the `SyncItem`
/// already linking them, if any.
#[derive(Default)]
struct Pair {
    change_a: Option<ItemChange>,
    change_b: Option<ItemChange>,
    item: Option<SyncItem>,
}

/// Whether two tasks look like the same real-world item, ignoring the
/// backend-local `gid` each necessarily carries its own value for. Used
/// only to pair up genuinely-new items across both backends on a first
/// run (§8's boundary behaviour), never for change detection proper.
pub(crate) fn tasks_match_for_adoption(a: &Task, b: &Task) -> bool {
    let mut a_tags = a.tags.clone();
    a_tags.sort();
    let mut b_tags = b.tags.clone();
    b_tags.sort();
    a.name == b.name
        && a.notes == b.notes
        && a.completed == b.completed
        && a.due_on == b.due_on
        && a.start_on == b.start_on
        && a.assignee == b.assignee
        && a_tags == b_tags
        && a.parent == b.parent
        && a.priority == b.priority
        && a.is_milestone == b.is_milestone
}

fn find_adoption_index(pairs: &[Pair], change_b: &ItemChange) -> Option<usize> {
    if change_b.change_type != ChangeType::Created {
        return None;
    }
    let desired_b: Task = serde_json::from_value(change_b.new_values.clone()?).ok()?;
    pairs.iter().position(|p| {
        p.item.is_none()
            && p.change_b.is_none()
            && p.change_a.as_ref().is_some_and(|ca| {
                ca.change_type == ChangeType::Created
                    && ca
                        .new_values
                        .as_ref()
                        .and_then(|v| serde_json::from_value::<Task>(v.clone()).ok())
                        .is_some_and(|task_a| tasks_match_for_adoption(&task_a, &desired_b))
            })
    })
}

pub struct TwoWayEngine<'a> {
    a: &'a dyn BackendAdapter,
    b: &'a dyn BackendAdapter,
    store: &'a SyncStateStore,
    config: SyncConfig,
    callbacks: Arc<dyn SyncCallbacks>,
    detector: ChangeDetector,
    resolver: ConflictResolver,
}

impl<'a> TwoWayEngine<'a> {
    pub fn new(
        a: &'a dyn BackendAdapter,
        b: &'a dyn BackendAdapter,
        store: &'a SyncStateStore,
        config: SyncConfig,
        callbacks: Arc<dyn SyncCallbacks>,
    ) -> Self {
        let resolver = ConflictResolver::new(config.conflict_strategy);
        Self {
            a,
            b,
            store,
            config,
            callbacks,
            detector: ChangeDetector::new(),
            resolver,
        }
    }

    fn report(&self, phase: Phase, percentage: u8, processed: usize, total: usize) {
        self.callbacks.on_progress(&ProgressEvent {
            phase,
            percentage,
            items_processed: processed,
            items_total: total,
        });
    }

    #[instrument(skip(self, cancellation), fields(a = self.a.backend_id(), b = self.b.backend_id()))]
    pub async fn run(&self, cancellation: &CancellationToken) -> SyncResult {
        let started_at = Utc::now();
        let backends = vec![self.a.backend_id().to_string(), self.b.backend_id().to_string()];
        let mut stats = SyncStats::default();
        let mut errors = Vec::new();
        let mut conflicts_out = Vec::new();

        let (backend_a, backend_b) = match (BackendId::new(self.a.backend_id()), BackendId::new(self.b.backend_id())) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                errors.push(SyncErrorRecord::from(&SyncError::Validation(e.to_string())));
                return SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at);
            }
        };

        self.report(Phase::DetectingChanges, 0, 0, 0);
        let (known_a, known_b) = match tokio::try_join!(
            self.store.get_sync_items_by_backend(&backend_a),
            self.store.get_sync_items_by_backend(&backend_b)
        ) {
            Ok(pair) => pair,
            Err(err) => {
                let sync_err = SyncError::Backend {
                    backend: backend_a.to_string(),
                    message: err.to_string(),
                };
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at);
            }
        };

        let (changes_a, changes_b) = match tokio::try_join!(
            self.detector.detect_changes(self.a, &known_a),
            self.detector.detect_changes(self.b, &known_b)
        ) {
            Ok(pair) => pair,
            Err(err) => {
                let sync_err = SyncError::from_backend_error(backend_a.as_str(), err);
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at);
            }
        };

        let changes_a: Vec<ItemChange> = changes_a.into_iter().filter(|c| passes_filter(c, &self.config.filter)).collect();
        let changes_b: Vec<ItemChange> = changes_b.into_iter().filter(|c| passes_filter(c, &self.config.filter)).collect();
        stats.items_checked = (changes_a.len() + changes_b.len()) as u64;

        let pairs = match self.build_pairs(changes_a, changes_b, &backend_a, &backend_b).await {
            Ok(pairs) => pairs,
            Err(err) => {
                let sync_err = SyncError::from_backend_error(backend_a.as_str(), err);
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at);
            }
        };

        let total = pairs.len();
        self.report(Phase::ResolvingConflicts, 25, 0, total);
        self.report(Phase::Syncing, 50, 0, total);

        for (index, pair) in pairs.into_iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!("two-way sync cancelled");
                errors.push(SyncErrorRecord::from(&SyncError::Cancelled));
                return SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at);
            }

            if let Err(err) = self
                .reconcile_pair(pair, &backend_a, &backend_b, &mut stats, &mut conflicts_out)
                .await
            {
                let sync_err = SyncError::from_backend_error(backend_b.as_str(), err);
                self.callbacks.on_error(&sync_err);
                errors.push(SyncErrorRecord::from(&sync_err));
                stats.items_skipped += 1;
            }

            let percentage = 50 + if total == 0 { 50 } else { (((index + 1) * 40) / total) as u8 };
            self.report(Phase::Syncing, percentage.min(90), index + 1, total);
        }

        if self.config.sync_tags {
            match sync_tags_union(&[self.a, self.b]).await {
                Ok(created) => stats.tags_created += created,
                Err(err) => errors.push(SyncErrorRecord::from(&SyncError::from_backend_error(backend_b.as_str(), err))),
            }
        }
        if self.config.sync_sections {
            match sync_sections_union(&[self.a, self.b]).await {
                Ok(created) => stats.sections_created += created,
                Err(err) => errors.push(SyncErrorRecord::from(&SyncError::from_backend_error(backend_b.as_str(), err))),
            }
        }

        self.report(Phase::Finalizing, 100, total, total);
        info!(
            items_created = stats.items_created,
            items_updated = stats.items_updated,
            items_deleted = stats.items_deleted,
            conflicts_detected = stats.conflicts_detected,
            "two-way sync finished"
        );
        SyncResult::finish(SyncDirection::TwoWay, backends, stats, conflicts_out, errors, started_at)
    }

    /// Groups each side's changes by the `SyncItem` that already links
    /// them (or by backend-local gid when unlinked), adopting genuinely
    /// new same-content creates from both sides into one pair instead of
    /// letting them propagate as duplicates.
    async fn build_pairs(
        &self,
        changes_a: Vec<ItemChange>,
        changes_b: Vec<ItemChange>,
        backend_a: &BackendId,
        backend_b: &BackendId,
    ) -> anyhow::Result<Vec<Pair>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut pairs: Vec<Pair> = Vec::new();

        for change in changes_a {
            let item = self.store.find_sync_item_by_backend_id(backend_a, &change.item_id).await?;
            let key = match &item {
                Some(found) => format!("sync:{}", found.sync_id()),
                None => format!("a:{}", change.item_id),
            };
            let idx = *index
                .entry(key)
                .or_insert_with(|| {
                    pairs.push(Pair::default());
                    pairs.len() - 1
                });
            if pairs[idx].item.is_none() {
                pairs[idx].item = item;
            }
            pairs[idx].change_a = Some(change);
        }

        for change in changes_b {
            let item = self.store.find_sync_item_by_backend_id(backend_b, &change.item_id).await?;
            let idx = if let Some(found) = &item {
                let key = format!("sync:{}", found.sync_id());
                *index.entry(key).or_insert_with(|| {
                    pairs.push(Pair::default());
                    pairs.len() - 1
                })
            } else if let Some(existing) = find_adoption_index(&pairs, &change) {
                existing
            } else {
                let key = format!("b:{}", change.item_id);
                *index.entry(key).or_insert_with(|| {
                    pairs.push(Pair::default());
                    pairs.len() - 1
                })
            };
            if pairs[idx].item.is_none() {
                pairs[idx].item = item;
            }
            pairs[idx].change_b = Some(change);
        }

        Ok(pairs)
    }

    async fn reconcile_pair(
        &self,
        pair: Pair,
        backend_a: &BackendId,
        backend_b: &BackendId,
        stats: &mut SyncStats,
        conflicts_out: &mut Vec<SyncConflict>,
    ) -> anyhow::Result<()> {
        match (pair.change_a, pair.change_b) {
            (Some(change_a), None) => {
                let propagator = Propagator {
                    source: self.a,
                    target: self.b,
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                propagator.propagate(&change_a, backend_a, backend_b, stats).await
            }
            (None, Some(change_b)) => {
                let propagator = Propagator {
                    source: self.b,
                    target: self.a,
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                propagator.propagate(&change_b, backend_b, backend_a, stats).await
            }
            (Some(change_a), Some(change_b)) => {
                self.reconcile_both(change_a, change_b, pair.item, backend_a, backend_b, stats, conflicts_out).await
            }
            (None, None) => Ok(()),
        }
    }

    async fn reconcile_both(
        &self,
        change_a: ItemChange,
        change_b: ItemChange,
        item: Option<SyncItem>,
        backend_a: &BackendId,
        backend_b: &BackendId,
        stats: &mut SyncStats,
        conflicts_out: &mut Vec<SyncConflict>,
    ) -> anyhow::Result<()> {
        match (change_a.change_type, change_b.change_type, item) {
            (ChangeType::Deleted, ChangeType::Deleted, Some(item)) => {
                self.store.delete_sync_item(item.sync_id()).await?;
                stats.items_deleted += 1;
                Ok(())
            }
            (ChangeType::Deleted, ChangeType::Updated, Some(item)) | (ChangeType::Updated, ChangeType::Deleted, Some(item)) => {
                self.reconcile_delete_vs_update(change_a, change_b, item, backend_a, backend_b, stats).await
            }
            (ChangeType::Updated, ChangeType::Updated, Some(item)) => {
                self.reconcile_both_updates(change_a, change_b, item, backend_a, backend_b, stats, conflicts_out).await
            }
            (ChangeType::Created, ChangeType::Created, None) => {
                self.reconcile_adopted_create(change_a, change_b, backend_a, backend_b, stats).await
            }
            (change_a_type, change_b_type, item) => {
                warn!(?change_a_type, ?change_b_type, "two-way pairing reached an unexpected combination, propagating each side independently");
                let forward = Propagator {
                    source: self.a,
                    target: self.b,
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                let reverse = Propagator {
                    source: self.b,
                    target: self.a,
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                let _ = item;
                forward.propagate(&change_a, backend_a, backend_b, stats).await?;
                reverse.propagate(&change_b, backend_b, backend_a, stats).await
            }
        }
    }

    async fn reconcile_delete_vs_update(
        &self,
        change_a: ItemChange,
        change_b: ItemChange,
        item: SyncItem,
        backend_a: &BackendId,
        backend_b: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        let (deleted_backend, deleted_adapter, update_change, updated_backend, updated_adapter) = if change_a.change_type == ChangeType::Deleted {
            (backend_a, self.a, change_b, backend_b, self.b)
        } else {
            (backend_b, self.b, change_a, backend_a, self.a)
        };

        if self.config.dry_run {
            if self.config.conflict_strategy == ConflictStrategy::SourceWins {
                stats.items_deleted += 1;
            } else {
                stats.items_updated += 1;
            }
            return Ok(());
        }

        if self.config.conflict_strategy == ConflictStrategy::SourceWins {
            if let Some(target_id) = item.backend_item_id(updated_backend) {
                updated_adapter.delete_task(target_id).await?;
            }
            self.store.delete_sync_item(item.sync_id()).await?;
            stats.items_deleted += 1;
            return Ok(());
        }

        let desired: Task = serde_json::from_value(
            update_change
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: updated change missing new_values"))?,
        )?;
        let recreated = deleted_adapter.create_task(seed_patch(&desired)).await?;
        let followup = followup_patch(&desired);
        let final_task = if followup.is_empty() {
            recreated
        } else {
            deleted_adapter.update_task(&recreated.gid, followup).await?
        };

        let mut updated_item = item;
        updated_item.set_backend_slot(deleted_backend.clone(), final_task.gid.clone(), content_hash(&final_task));
        updated_item.bump_version(updated_backend, content_hash(&desired));
        self.store.update_sync_item(updated_item.sync_id(), updated_item).await?;
        stats.items_updated += 1;
        Ok(())
    }

    async fn reconcile_both_updates(
        &self,
        change_a: ItemChange,
        change_b: ItemChange,
        item: SyncItem,
        backend_a: &BackendId,
        backend_b: &BackendId,
        stats: &mut SyncStats,
        conflicts_out: &mut Vec<SyncConflict>,
    ) -> anyhow::Result<()> {
        let task_a: Task = serde_json::from_value(
            change_a
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: updated change missing new_values"))?,
        )?;
        let task_b: Task = serde_json::from_value(
            change_b
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: updated change missing new_values"))?,
        )?;

        if self.config.dry_run {
            stats.items_updated += 1;
            return Ok(());
        }

        let mut fields = ChangeDetector::detect_field_changes(&task_a, &task_b)?;
        if fields.is_empty() {
            fields = SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect();
        }

        let value_a = serde_json::to_value(&task_a)?;
        let value_b = serde_json::to_value(&task_b)?;
        let (Value::Object(obj_a), Value::Object(obj_b)) = (&value_a, &value_b) else {
            return Err(anyhow::anyhow!("validation error: task did not serialize to an object"));
        };

        let mut values_by_field: BTreeMap<String, Vec<(BackendId, Value)>> = BTreeMap::new();
        for field in &fields {
            let va = obj_a.get(field).cloned().unwrap_or(Value::Null);
            let vb = obj_b.get(field).cloned().unwrap_or(Value::Null);
            values_by_field.insert(field.clone(), vec![(backend_a.clone(), va), (backend_b.clone(), vb)]);
        }

        let detected = self.resolver.detect_conflicts(&values_by_field);
        stats.conflicts_detected += detected.len() as u64;

        let mut merged = merge_items(&value_a, &value_b, backend_a, backend_b);
        for conflict in detected {
            let manual = self.callbacks.on_conflict(&conflict);
            let resolved = self.resolver.resolve(conflict, backend_a, manual)?;
            if let (Value::Object(map), Some(resolution)) = (&mut merged, &resolved.resolution) {
                map.insert(resolved.field.clone(), resolution.chosen_value.clone());
            }
            stats.conflicts_resolved += 1;
            conflicts_out.push(resolved);
        }

        let reconciled: Task = serde_json::from_value(merged)?;
        let patch_a = diff_patch(&task_a, &reconciled, &fields);
        let patch_b = diff_patch(&task_b, &reconciled, &fields);

        let final_a = if patch_a.is_empty() {
            task_a.clone()
        } else {
            self.a.update_task(&task_a.gid, patch_a).await?
        };
        let final_b = if patch_b.is_empty() {
            task_b.clone()
        } else {
            self.b.update_task(&task_b.gid, patch_b).await?
        };

        let mut updated_item = item;
        updated_item.bump_version(backend_a, content_hash(&final_a));
        updated_item.bump_version(backend_b, content_hash(&final_b));
        updated_item.set_has_conflicts(false);
        self.store.update_sync_item(updated_item.sync_id(), updated_item).await?;
        stats.items_updated += 1;
        Ok(())
    }

    async fn reconcile_adopted_create(
        &self,
        change_a: ItemChange,
        change_b: ItemChange,
        backend_a: &BackendId,
        backend_b: &BackendId,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        let task_a: Task = serde_json::from_value(
            change_a
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: created change missing new_values"))?,
        )?;
        let task_b: Task = serde_json::from_value(
            change_b
                .new_values
                .clone()
                .ok_or_else(|| anyhow::anyhow!("validation error: created change missing new_values"))?,
        )?;

        if self.config.dry_run {
            stats.items_created += 1;
            return Ok(());
        }

        if !tasks_match_for_adoption(&task_a, &task_b) {
            let fields: Vec<String> = SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect();
            let patch = diff_patch(&task_b, &task_a, &fields);
            if !patch.is_empty() {
                self.b.update_task(&task_b.gid, patch).await?;
            }
        }

        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(backend_a.clone(), task_a.gid.clone());
        backend_ids.insert(backend_b.clone(), task_b.gid.clone());
        let mut versions = BTreeMap::new();
        versions.insert(backend_a.clone(), content_hash(&task_a));
        versions.insert(backend_b.clone(), content_hash(&task_b));
        self.store.create_sync_item(backend_ids, versions).await?;
        stats.items_created += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tasksync_core::domain::ConflictStrategy;

    use super::*;
    use crate::progress::NoopCallbacks;
    use crate::testing::InMemoryAdapter;

    fn config(strategy: ConflictStrategy) -> SyncConfig {
        SyncConfig::new(SyncDirection::TwoWay, strategy)
    }

    fn store(dir: &std::path::Path) -> SyncStateStore {
        SyncStateStore::open(dir, [&BackendId::new("a").unwrap(), &BackendId::new("b").unwrap()])
    }

    #[tokio::test]
    async fn first_run_adopts_matching_independent_creates_without_duplicating() {
        let a = InMemoryAdapter::new("a");
        a.seed_task(Task::new("a1", "Shared task")).await;
        let b = InMemoryAdapter::new("b");
        b.seed_task(Task::new("b1", "Shared task")).await;
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());

        let engine = TwoWayEngine::new(&a, &b, &state, config(ConflictStrategy::LastWriteWins), Arc::new(NoopCallbacks));
        let result = engine.run(&CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.stats.items_created, 1);
        assert_eq!(a.task_count().await, 1);
        assert_eq!(b.task_count().await, 1);
    }

    #[tokio::test]
    async fn only_one_side_changed_propagates_one_way_without_conflict() {
        let a = InMemoryAdapter::new("a");
        a.seed_task(Task::new("a1", "Only on A")).await;
        let b = InMemoryAdapter::new("b");
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());

        let engine = TwoWayEngine::new(&a, &b, &state, config(ConflictStrategy::LastWriteWins), Arc::new(NoopCallbacks));
        let result = engine.run(&CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.stats.items_created, 1);
        assert_eq!(result.stats.conflicts_detected, 0);
        assert_eq!(b.task_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_edits_under_last_write_wins_produce_one_conflict_record() {
        let a = InMemoryAdapter::new("a");
        a.seed_task(Task::new("a1", "Original")).await;
        let b = InMemoryAdapter::new("b");
        b.seed_task(Task::new("b1", "Original")).await;
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());
        let engine = TwoWayEngine::new(&a, &b, &state, config(ConflictStrategy::LastWriteWins), Arc::new(NoopCallbacks));
        engine.run(&CancellationToken::new()).await;

        a.update_task(
            "a1",
            tasksync_core::domain::TaskPatch {
                name: Some("Renamed on A".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        b.update_task(
            "b1",
            tasksync_core::domain::TaskPatch {
                name: Some("Renamed on B".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let result = engine.run(&CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(result.stats.items_updated, 1);
        assert_eq!(result.stats.conflicts_detected, 1);
        assert_eq!(result.stats.conflicts_resolved, 1);

        let a_tasks = a.list_tasks().await.unwrap();
        let b_tasks = b.list_tasks().await.unwrap();
        assert_eq!(a_tasks[0].name, "Renamed on B");
        assert_eq!(b_tasks[0].name, "Renamed on B");
    }

    #[tokio::test]
    async fn tag_union_backfills_both_sides() {
        let a = InMemoryAdapter::new("a");
        a.seed_tag("urgent").await;
        let b = InMemoryAdapter::new("b");
        b.seed_tag("billing").await;
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());
        let mut cfg = config(ConflictStrategy::LastWriteWins);
        cfg.sync_tags = true;
        let engine = TwoWayEngine::new(&a, &b, &state, cfg, Arc::new(NoopCallbacks));

        let result = engine.run(&CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(result.stats.tags_created, 2);
    }
}
