//! N-Way Sync Engine (§4.7): reconciles an arbitrary number of backends
//! against one shared Sync-State Store. Generalizes the Two-Way Sync
//! Engine's pairing and conflict resolution across N participants, with
//! deterministic `BackendId`-lexicographic ordering wherever a tie must
//! be broken (§4.7/§9, resolved).

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

use crate::filter::passes_filter;
use crate::patch::{diff_patch, followup_patch, seed_patch};
use crate::progress::{Phase, ProgressEvent, SyncCallbacks};
use crate::propagate::Propagator;
use crate::result::{SyncErrorRecord, SyncResult, SyncStats};
use crate::taxonomy::{sync_sections_union, sync_tags_union};
use crate::two_way::tasks_match_for_adoption;

/// Every backend's change for one sync identity (or candidate identity),
/// keyed by backend for deterministic, lexicographically-ordered
/// iteration.
#[derive(Default)]
struct NPair {
    changes: BTreeMap<BackendId, ItemChange>,
    item: Option<SyncItem>,
}

/// Looks for a pair `backend`'s newly-created task can join by content
/// match: either another genuinely-new item independently created on
/// other backends, or a backend joining an already-synced identity whose
/// other member(s) changed in this same round (§4.7, "mix of creates and
/// updates"). Excludes pairs `backend` is already part of.
fn find_adoption_index(pairs: &[NPair], backend: &BackendId, change: &ItemChange) -> Option<usize> {
    if change.change_type != ChangeType::Created {
        return None;
    }
    let desired: Task = serde_json::from_value(change.new_values.clone()?).ok()?;
    pairs.iter().position(|p| {
        !p.changes.contains_key(backend)
            && p.changes.values().any(|c| {
                c.new_values
                    .as_ref()
                    .and_then(|v| serde_json::from_value::<Task>(v.clone()).ok())
                    .is_some_and(|t| tasks_match_for_adoption(&t, &desired))
            })
    })
}

pub struct NWayEngine<'a> {
    backends: BTreeMap<BackendId, &'a dyn BackendAdapter>,
    store: &'a SyncStateStore,
    config: SyncConfig,
    callbacks: Arc<dyn SyncCallbacks>,
    detector: ChangeDetector,
    resolver: ConflictResolver,
}

impl<'a> NWayEngine<'a> {
    /// # Errors
    /// Returns an error if fewer than two distinct backends are supplied,
    /// or if any `backend_id()` fails `BackendId` validation.
    pub fn new(
        backends: Vec<&'a dyn BackendAdapter>,
        store: &'a SyncStateStore,
        config: SyncConfig,
        callbacks: Arc<dyn SyncCallbacks>,
    ) -> anyhow::Result<Self> {
        let mut map = BTreeMap::new();
        for adapter in backends {
            let id = BackendId::new(adapter.backend_id())?;
            map.insert(id, adapter);
        }
        if map.len() < 2 {
            return Err(anyhow::anyhow!("validation error: N-way sync requires at least two backends"));
        }
        let resolver = ConflictResolver::new(config.conflict_strategy);
        Ok(Self {
            backends: map,
            store,
            config,
            callbacks,
            detector: ChangeDetector::new(),
            resolver,
        })
    }

    fn adapter(&self, backend: &BackendId) -> &'a dyn BackendAdapter {
        *self.backends.get(backend).expect("backend participates in this run")
    }

    fn report(&self, phase: Phase, percentage: u8, processed: usize, total: usize) {
        self.callbacks.on_progress(&ProgressEvent {
            phase,
            percentage,
            items_processed: processed,
            items_total: total,
        });
    }

    #[instrument(skip(self, cancellation))]
    pub async fn run(&self, cancellation: &CancellationToken) -> SyncResult {
        let started_at = Utc::now();
        let backend_names: Vec<String> = self.backends.keys().map(BackendId::to_string).collect();
        let mut stats = SyncStats::default();
        let mut errors = Vec::new();
        let mut conflicts_out = Vec::new();

        self.report(Phase::DetectingChanges, 0, 0, 0);

        let detections = futures::future::join_all(self.backends.iter().map(|(backend, adapter)| {
            let backend = backend.clone();
            let adapter = *adapter;
            async move {
                let known = self
                    .store
                    .get_sync_items_by_backend(&backend)
                    .await
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                let changes = self.detector.detect_changes(adapter, &known).await?;
                Ok::<(BackendId, Vec<ItemChange>), anyhow::Error>((backend, changes))
            }
        }))
        .await;

        let mut per_backend = Vec::with_capacity(detections.len());
        for detection in detections {
            match detection {
                Ok(pair) => per_backend.push(pair),
                Err(err) => {
                    let sync_err = SyncError::from_backend_error("n-way", err);
                    errors.push(SyncErrorRecord::from(&sync_err));
                    return SyncResult::finish(SyncDirection::NWay, backend_names, stats, conflicts_out, errors, started_at);
                }
            }
        }

        let per_backend: Vec<(BackendId, Vec<ItemChange>)> = per_backend
            .into_iter()
            .map(|(backend, changes)| {
                let filtered = changes.into_iter().filter(|c| passes_filter(c, &self.config.filter)).collect();
                (backend, filtered)
            })
            .collect();
        stats.items_checked = per_backend.iter().map(|(_, changes)| changes.len() as u64).sum();

        let pairs = match self.build_pairs(per_backend).await {
            Ok(pairs) => pairs,
            Err(err) => {
                let sync_err = SyncError::from_backend_error("n-way", err);
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::NWay, backend_names, stats, conflicts_out, errors, started_at);
            }
        };

        let total = pairs.len();
        self.report(Phase::ResolvingConflicts, 25, 0, total);
        self.report(Phase::Syncing, 50, 0, total);

        for (index, pair) in pairs.into_iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!("n-way sync cancelled");
                errors.push(SyncErrorRecord::from(&SyncError::Cancelled));
                return SyncResult::finish(SyncDirection::NWay, backend_names, stats, conflicts_out, errors, started_at);
            }

            if let Err(err) = self.reconcile_pair(pair, &mut stats, &mut conflicts_out).await {
                let sync_err = SyncError::from_backend_error("n-way", err);
                self.callbacks.on_error(&sync_err);
                errors.push(SyncErrorRecord::from(&sync_err));
                stats.items_skipped += 1;
            }

            let percentage = 50 + if total == 0 { 40 } else { (((index + 1) * 40) / total) as u8 };
            self.report(Phase::Syncing, percentage.min(90), index + 1, total);
        }

        let adapters: Vec<&dyn BackendAdapter> = self.backends.values().copied().collect();
        if self.config.sync_tags {
            match sync_tags_union(&adapters).await {
                Ok(created) => stats.tags_created += created,
                Err(err) => errors.push(SyncErrorRecord::from(&SyncError::from_backend_error("n-way", err))),
            }
        }
        if self.config.sync_sections {
            match sync_sections_union(&adapters).await {
                Ok(created) => stats.sections_created += created,
                Err(err) => errors.push(SyncErrorRecord::from(&SyncError::from_backend_error("n-way", err))),
            }
        }

        self.report(Phase::Finalizing, 100, total, total);
        info!(
            backends = backend_names.len(),
            items_created = stats.items_created,
            items_updated = stats.items_updated,
            items_deleted = stats.items_deleted,
            conflicts_detected = stats.conflicts_detected,
            "n-way sync finished"
        );
        SyncResult::finish(SyncDirection::NWay, backend_names, stats, conflicts_out, errors, started_at)
    }

    async fn build_pairs(&self, per_backend: Vec<(BackendId, Vec<ItemChange>)>) -> anyhow::Result<Vec<NPair>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut pairs: Vec<NPair> = Vec::new();

        for (backend, changes) in per_backend {
            for change in changes {
                let item = self.store.find_sync_item_by_backend_id(&backend, &change.item_id).await?;
                let idx = if let Some(found) = &item {
                    let key = format!("sync:{}", found.sync_id());
                    *index.entry(key).or_insert_with(|| {
                        pairs.push(NPair::default());
                        pairs.len() - 1
                    })
                } else if let Some(existing) = find_adoption_index(&pairs, &backend, &change) {
                    existing
                } else {
                    let key = format!("{backend}:{}", change.item_id);
                    *index.entry(key).or_insert_with(|| {
                        pairs.push(NPair::default());
                        pairs.len() - 1
                    })
                };
                if pairs[idx].item.is_none() {
                    pairs[idx].item = item;
                }
                pairs[idx].changes.insert(backend.clone(), change);
            }
        }

        Ok(pairs)
    }

    async fn reconcile_pair(&self, pair: NPair, stats: &mut SyncStats, conflicts_out: &mut Vec<SyncConflict>) -> anyhow::Result<()> {
        let NPair { changes, item } = pair;

        if changes.len() == 1 {
            let (source_backend, change) = changes.into_iter().next().expect("exactly one change");
            for target_backend in self.backends.keys() {
                if *target_backend == source_backend {
                    continue;
                }
                let propagator = Propagator {
                    source: self.adapter(&source_backend),
                    target: self.adapter(target_backend),
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                propagator.propagate(&change, &source_backend, target_backend, stats).await?;
            }
            return Ok(());
        }

        let all_deleted = changes.values().all(|c| c.change_type == ChangeType::Deleted);
        let all_created = changes.values().all(|c| c.change_type == ChangeType::Created);
        let any_deleted = changes.values().any(|c| c.change_type == ChangeType::Deleted);
        let any_updated = changes.values().any(|c| c.change_type == ChangeType::Updated);

        if all_deleted {
            if let Some(item) = item {
                self.store.delete_sync_item(item.sync_id()).await?;
            }
            stats.items_deleted += 1;
            return Ok(());
        }

        if all_created && item.is_none() {
            return self.reconcile_all_created(changes, stats).await;
        }

        if any_deleted && any_updated {
            return self.reconcile_delete_mixed_with_update(changes, item, stats).await;
        }

        if !any_deleted {
            return self.reconcile_updates_and_new_backends(changes, item, stats, conflicts_out).await;
        }

        warn!("n-way pairing reached deletes mixed with creates, propagating each change independently");
        for (source_backend, change) in changes {
            for target_backend in self.backends.keys() {
                if *target_backend == source_backend {
                    continue;
                }
                let propagator = Propagator {
                    source: self.adapter(&source_backend),
                    target: self.adapter(target_backend),
                    store: self.store,
                    dry_run: self.config.dry_run,
                };
                propagator.propagate(&change, &source_backend, target_backend, stats).await?;
            }
        }
        Ok(())
    }

    /// All-creates: a genuinely new item appearing independently on every
    /// backend with no `SyncItem` yet. Adopts the lexicographically-first
    /// backend's content as canonical, reconciling any backend whose copy
    /// disagrees before binding one `SyncItem` across all of them.
    async fn reconcile_all_created(&self, changes: BTreeMap<BackendId, ItemChange>, stats: &mut SyncStats) -> anyhow::Result<()> {
        let mut tasks: BTreeMap<BackendId, Task> = BTreeMap::new();
        for (backend, change) in &changes {
            let task: Task = serde_json::from_value(
                change
                    .new_values
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("validation error: created change missing new_values"))?,
            )?;
            tasks.insert(backend.clone(), task);
        }

        if self.config.dry_run {
            stats.items_created += 1;
            return Ok(());
        }

        let fields: Vec<String> = SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect();
        let (canonical_backend, canonical_task) = tasks.iter().next().map(|(b, t)| (b.clone(), t.clone())).expect("at least one change");

        let mut finals: BTreeMap<BackendId, Task> = BTreeMap::new();
        finals.insert(canonical_backend.clone(), canonical_task.clone());
        for (backend, task) in &tasks {
            if *backend == canonical_backend {
                continue;
            }
            if tasks_match_for_adoption(&canonical_task, task) {
                finals.insert(backend.clone(), task.clone());
                continue;
            }
            let patch = diff_patch(task, &canonical_task, &fields);
            let final_task = if patch.is_empty() {
                task.clone()
            } else {
                self.adapter(backend).update_task(&task.gid, patch).await?
            };
            finals.insert(backend.clone(), final_task);
        }

        let mut backend_ids = BTreeMap::new();
        let mut versions = BTreeMap::new();
        for (backend, task) in &finals {
            backend_ids.insert(backend.clone(), task.gid.clone());
            versions.insert(backend.clone(), content_hash(task));
        }
        self.store.create_sync_item(backend_ids, versions).await?;
        stats.items_created += 1;
        Ok(())
    }

    /// Delete-mixed-with-update: `source-wins` honours the deletion
    /// everywhere only when the lexicographically-first backend's own
    /// change in this round was the delete; otherwise (including under
    /// `source-wins` when that backend instead updated) the surviving
    /// update(s) are folded into one canonical value and re-created on
    /// every backend that deleted it.
    async fn reconcile_delete_mixed_with_update(
        &self,
        changes: BTreeMap<BackendId, ItemChange>,
        item: Option<SyncItem>,
        stats: &mut SyncStats,
    ) -> anyhow::Result<()> {
        let Some(mut item) = item else { return Ok(()) };

        let deleted_backends: Vec<BackendId> = changes
            .iter()
            .filter(|(_, c)| c.change_type == ChangeType::Deleted)
            .map(|(b, _)| b.clone())
            .collect();
        let mut updated: Vec<(BackendId, Task)> = Vec::new();
        for (backend, change) in &changes {
            if change.change_type != ChangeType::Updated {
                continue;
            }
            let task: Task = serde_json::from_value(
                change
                    .new_values
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("validation error: updated change missing new_values"))?,
            )?;
            updated.push((backend.clone(), task));
        }

        // `changes` iterates in BackendId-lexicographic order (§4.7/§9,
        // resolved); source-wins honours whichever change came from that
        // first backend, delete or update, rather than deleting outright.
        let first_backend_deleted = changes
            .iter()
            .next()
            .is_some_and(|(_, c)| c.change_type == ChangeType::Deleted);
        let delete_wins = self.config.conflict_strategy == ConflictStrategy::SourceWins && first_backend_deleted;

        if self.config.dry_run {
            if delete_wins {
                stats.items_deleted += 1;
            } else {
                stats.items_updated += 1;
            }
            return Ok(());
        }

        if delete_wins {
            for (backend, _) in &updated {
                if let Some(target_id) = item.backend_item_id(backend) {
                    self.adapter(backend).delete_task(target_id).await?;
                }
            }
            self.store.delete_sync_item(item.sync_id()).await?;
            stats.items_deleted += 1;
            return Ok(());
        }

        let mut desired = updated[0].1.clone();
        for (backend, task) in updated.iter().skip(1) {
            let current = serde_json::to_value(&desired)?;
            let next = serde_json::to_value(task)?;
            desired = serde_json::from_value(merge_items(&current, &next, &updated[0].0, backend))?;
        }

        for backend in &deleted_backends {
            let recreated = self.adapter(backend).create_task(seed_patch(&desired)).await?;
            let followup = followup_patch(&desired);
            let final_task = if followup.is_empty() {
                recreated
            } else {
                self.adapter(backend).update_task(&recreated.gid, followup).await?
            };
            item.set_backend_slot(backend.clone(), final_task.gid.clone(), content_hash(&final_task));
        }
        for (backend, _) in &updated {
            item.bump_version(backend, content_hash(&desired));
        }
        self.store.update_sync_item(item.sync_id(), item).await?;
        stats.items_updated += 1;
        Ok(())
    }

    /// All-updates, and the mix-of-creates-and-updates case where a
    /// backend is joining an already-synced identity for the first time:
    /// resolves field conflicts among the backends that already shared a
    /// prior slot, then brings every participating backend (including the
    /// new one) to the reconciled value.
    async fn reconcile_updates_and_new_backends(
        &self,
        changes: BTreeMap<BackendId, ItemChange>,
        item: Option<SyncItem>,
        stats: &mut SyncStats,
        conflicts_out: &mut Vec<SyncConflict>,
    ) -> anyhow::Result<()> {
        let Some(mut item) = item else { return Ok(()) };

        let mut tasks: BTreeMap<BackendId, Task> = BTreeMap::new();
        for (backend, change) in &changes {
            let task: Task = serde_json::from_value(
                change
                    .new_values
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("validation error: change missing new_values"))?,
            )?;
            tasks.insert(backend.clone(), task);
        }

        if self.config.dry_run {
            stats.items_updated += 1;
            return Ok(());
        }

        let changed_backends: Vec<BackendId> = tasks.keys().cloned().collect();
        let mut fields: Vec<String> = Vec::new();
        for i in 0..changed_backends.len() {
            for j in (i + 1)..changed_backends.len() {
                let diff =
                    ChangeDetector::detect_field_changes(&tasks[&changed_backends[i]], &tasks[&changed_backends[j]])?;
                for field in diff {
                    if !fields.contains(&field) {
                        fields.push(field);
                    }
                }
            }
        }
        if fields.is_empty() {
            fields = SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect();
        }

        let known_backends: Vec<BackendId> = tasks
            .keys()
            .filter(|b| item.backend_item_id(b).is_some())
            .cloned()
            .collect();

        let mut values_by_field: BTreeMap<String, Vec<(BackendId, Value)>> = BTreeMap::new();
        for field in &fields {
            let mut values = Vec::new();
            for backend in &known_backends {
                let Value::Object(map) = serde_json::to_value(&tasks[backend])? else {
                    continue;
                };
                values.push((backend.clone(), map.get(field).cloned().unwrap_or(Value::Null)));
            }
            if values.len() > 1 {
                values_by_field.insert(field.clone(), values);
            }
        }

        let detected = self.resolver.detect_conflicts(&values_by_field);
        stats.conflicts_detected += detected.len() as u64;

        let source = known_backends.first().cloned();
        let mut resolved_fields: BTreeMap<String, Value> = BTreeMap::new();
        for conflict in detected {
            let manual = self.callbacks.on_conflict(&conflict);
            let resolve_against = source.clone().unwrap_or_else(|| conflict.values[0].0.clone());
            let resolved = self.resolver.resolve(conflict, &resolve_against, manual)?;
            if let Some(resolution) = &resolved.resolution {
                resolved_fields.insert(resolved.field.clone(), resolution.chosen_value.clone());
            }
            stats.conflicts_resolved += 1;
            conflicts_out.push(resolved);
        }

        let backends_sorted: Vec<BackendId> = tasks.keys().cloned().collect();
        let mut merged_value = serde_json::to_value(&tasks[&backends_sorted[0]])?;
        for backend in backends_sorted.iter().skip(1) {
            let next = serde_json::to_value(&tasks[backend])?;
            merged_value = merge_items(&merged_value, &next, &backends_sorted[0], backend);
        }
        if let Value::Object(map) = &mut merged_value {
            for (field, value) in resolved_fields {
                map.insert(field, value);
            }
        }
        let reconciled: Task = serde_json::from_value(merged_value)?;

        // Write the reconciled record to every known slot (§4.7 edge
        // cases), not just backends that changed this round: an untouched
        // member must still pick up a peer's or a joining backend's update.
        let mut all_backends: Vec<BackendId> = item.backend_ids().keys().cloned().collect();
        for backend in tasks.keys() {
            if !all_backends.contains(backend) {
                all_backends.push(backend.clone());
            }
        }

        for backend in &all_backends {
            let current = match tasks.get(backend) {
                Some(task) => task.clone(),
                None => {
                    let gid = item
                        .backend_item_id(backend)
                        .expect("all_backends only holds known slots or this round's changed backends")
                        .to_string();
                    match self.adapter(backend).get_task(&gid).await? {
                        Some(task) => task,
                        None => continue,
                    }
                }
            };
            let patch = diff_patch(&current, &reconciled, &fields);
            let final_task = if patch.is_empty() {
                current
            } else {
                self.adapter(backend).update_task(&current.gid, patch).await?
            };
            item.set_backend_slot(backend.clone(), final_task.gid.clone(), content_hash(&final_task));
        }
        item.set_has_conflicts(false);
        self.store.update_sync_item(item.sync_id(), item).await?;
        stats.items_updated += 1;
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
        SyncConfig::new(SyncDirection::NWay, strategy)
    }

    fn store(dir: &std::path::Path) -> SyncStateStore {
        SyncStateStore::open(
            dir,
            [
                &BackendId::new("alpha").unwrap(),
                &BackendId::new("beta").unwrap(),
                &BackendId::new("gamma").unwrap(),
            ],
        )
    }

    #[tokio::test]
    async fn single_backend_change_fans_out_to_every_other_backend() {
        let alpha = InMemoryAdapter::new("alpha");
        alpha.seed_task(Task::new("a1", "Only on alpha")).await;
        let beta = InMemoryAdapter::new("beta");
        let gamma = InMemoryAdapter::new("gamma");
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());

        let engine = NWayEngine::new(
            vec![&alpha, &beta, &gamma],
            &state,
            config(ConflictStrategy::LastWriteWins),
            Arc::new(NoopCallbacks),
        )
        .unwrap();

        let result = engine.run(&CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(beta.task_count().await, 1);
        assert_eq!(gamma.task_count().await, 1);
    }

    #[tokio::test]
    async fn matching_independent_creates_across_three_backends_adopt_into_one_identity() {
        let alpha = InMemoryAdapter::new("alpha");
        alpha.seed_task(Task::new("a1", "Shared")).await;
        let beta = InMemoryAdapter::new("beta");
        beta.seed_task(Task::new("b1", "Shared")).await;
        let gamma = InMemoryAdapter::new("gamma");
        gamma.seed_task(Task::new("g1", "Shared")).await;
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());

        let engine = NWayEngine::new(
            vec![&alpha, &beta, &gamma],
            &state,
            config(ConflictStrategy::LastWriteWins),
            Arc::new(NoopCallbacks),
        )
        .unwrap();

        let result = engine.run(&CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(result.stats.items_created, 1);
        assert_eq!(alpha.task_count().await, 1);
        assert_eq!(beta.task_count().await, 1);
        assert_eq!(gamma.task_count().await, 1);
    }

    #[tokio::test]
    async fn new_backend_joining_an_existing_identity_receives_its_current_value() {
        let alpha = InMemoryAdapter::new("alpha");
        alpha.seed_task(Task::new("a1", "Original")).await;
        let beta = InMemoryAdapter::new("beta");
        beta.seed_task(Task::new("b1", "Original")).await;
        let gamma = InMemoryAdapter::new("gamma");
        let dir = tempfile::tempdir().unwrap();
        let state = store(dir.path());

        let first = NWayEngine::new(
            vec![&alpha, &beta, &gamma],
            &state,
            config(ConflictStrategy::LastWriteWins),
            Arc::new(NoopCallbacks),
        )
        .unwrap();
        first.run(&CancellationToken::new()).await;

        alpha
            .update_task(
                "a1",
                tasksync_core::domain::TaskPatch {
                    name: Some("Renamed everywhere".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        gamma.seed_task(Task::new("g1", "Renamed everywhere")).await;

        let second = NWayEngine::new(
            vec![&alpha, &beta, &gamma],
            &state,
            config(ConflictStrategy::LastWriteWins),
            Arc::new(NoopCallbacks),
        )
        .unwrap();
        let result = second.run(&CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(gamma.task_count().await, 1);
    }

    #[test]
    fn new_rejects_fewer_than_two_backends() {
        let alpha = InMemoryAdapter::new("alpha");
        let dir = tempfile::tempdir().unwrap();
        let backends: Vec<&dyn BackendAdapter> = vec![&alpha];
        let store = SyncStateStore::open(dir.path(), [&BackendId::new("alpha").unwrap()]);
        let result = NWayEngine::new(backends, &store, config(ConflictStrategy::Merge), Arc::new(NoopCallbacks));
        assert!(result.is_err());
    }
}
