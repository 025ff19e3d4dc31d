//! One-Way Sync Engine (§4.5): source → target propagation with state
//! update.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tasksync_conflict::ChangeDetector;
use tasksync_core::config::{SyncConfig, SyncDirection};
use tasksync_core::domain::{BackendId, ItemChange};
use tasksync_core::errors::SyncError;
use tasksync_core::ports::BackendAdapter;
use tasksync_state::SyncStateStore;

use crate::filter::passes_filter;
use crate::progress::{Phase, ProgressEvent, SyncCallbacks};
use crate::propagate::Propagator;
use crate::result::{SyncErrorRecord, SyncResult, SyncStats};
use crate::taxonomy::{sync_sections_one_way, sync_tags_one_way};

/// Propagates source's detected changes onto target and keeps the
/// Sync-State Store in step. One instance serves one run.
pub struct OneWayEngine<'a> {
    source: &'a dyn BackendAdapter,
    target: &'a dyn BackendAdapter,
    store: &'a SyncStateStore,
    config: SyncConfig,
    callbacks: Arc<dyn SyncCallbacks>,
    detector: ChangeDetector,
}

impl<'a> OneWayEngine<'a> {
    pub fn new(
        source: &'a dyn BackendAdapter,
        target: &'a dyn BackendAdapter,
        store: &'a SyncStateStore,
        config: SyncConfig,
        callbacks: Arc<dyn SyncCallbacks>,
    ) -> Self {
        Self {
            source,
            target,
            store,
            config,
            callbacks,
            detector: ChangeDetector::new(),
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

    #[instrument(skip(self, cancellation), fields(source = self.source.backend_id(), target = self.target.backend_id()))]
    pub async fn run(&self, cancellation: &CancellationToken) -> SyncResult {
        let started_at = Utc::now();
        let backends = vec![self.source.backend_id().to_string(), self.target.backend_id().to_string()];
        let mut stats = SyncStats::default();
        let mut errors = Vec::new();

        let (source_backend, target_backend) = match (
            BackendId::new(self.source.backend_id()),
            BackendId::new(self.target.backend_id()),
        ) {
            (Ok(s), Ok(t)) => (s, t),
            (Err(e), _) | (_, Err(e)) => {
                errors.push(SyncErrorRecord::from(&SyncError::Validation(e.to_string())));
                return SyncResult::finish(SyncDirection::OneWay, backends, stats, vec![], errors, started_at);
            }
        };

        self.report(Phase::DetectingChanges, 0, 0, 0);
        let known = match self.store.get_sync_items_by_backend(&source_backend).await {
            Ok(items) => items,
            Err(err) => {
                let sync_err = SyncError::Backend {
                    backend: source_backend.to_string(),
                    message: err.to_string(),
                };
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::OneWay, backends, stats, vec![], errors, started_at);
            }
        };

        let changes = match self.detector.detect_changes(self.source, &known).await {
            Ok(changes) => changes,
            Err(err) => {
                let sync_err = SyncError::from_backend_error(source_backend.as_str(), err);
                errors.push(SyncErrorRecord::from(&sync_err));
                return SyncResult::finish(SyncDirection::OneWay, backends, stats, vec![], errors, started_at);
            }
        };

        let filtered: Vec<ItemChange> = changes.into_iter().filter(|c| passes_filter(c, &self.config.filter)).collect();
        stats.items_checked = filtered.len() as u64;
        let total = filtered.len();

        let propagator = Propagator {
            source: self.source,
            target: self.target,
            store: self.store,
            dry_run: self.config.dry_run,
        };

        self.report(Phase::Syncing, 0, 0, total);
        for (index, change) in filtered.iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!("one-way sync cancelled");
                errors.push(SyncErrorRecord::from(&SyncError::Cancelled));
                return SyncResult::finish(SyncDirection::OneWay, backends, stats, vec![], errors, started_at);
            }

            if let Err(err) = propagator.propagate(change, &source_backend, &target_backend, &mut stats).await {
                let sync_err = SyncError::from_backend_error(target_backend.as_str(), err);
                self.callbacks.on_error(&sync_err);
                errors.push(SyncErrorRecord::from(&sync_err));
                stats.items_skipped += 1;
            }

            let percentage = if total == 0 { 100 } else { ((index + 1) * 100 / total) as u8 };
            self.report(Phase::Syncing, percentage, index + 1, total);
        }

        if self.config.sync_tags {
            match sync_tags_one_way(self.source, self.target).await {
                Ok(created) => stats.tags_created += created,
                Err(err) => {
                    errors.push(SyncErrorRecord::from(&SyncError::from_backend_error(target_backend.as_str(), err)))
                }
            }
        }
        if self.config.sync_sections {
            match sync_sections_one_way(self.source, self.target).await {
                Ok(created) => stats.sections_created += created,
                Err(err) => {
                    errors.push(SyncErrorRecord::from(&SyncError::from_backend_error(target_backend.as_str(), err)))
                }
            }
        }

        self.report(Phase::Finalizing, 100, total, total);
        info!(
            items_created = stats.items_created,
            items_updated = stats.items_updated,
            items_deleted = stats.items_deleted,
            "one-way sync finished"
        );
        SyncResult::finish(SyncDirection::OneWay, backends, stats, vec![], errors, started_at)
    }
}
