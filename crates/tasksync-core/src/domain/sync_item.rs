//! The cross-backend identity anchor: `SyncItem`, and its `IdMapping`
//! projection for fast lookups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BackendId, ContentHash, SyncId};

/// A cross-backend sync identity.
///
/// Invariants (enforced by the constructors, not re-checked on every
/// getter): every key in `backend_ids` also appears in `versions` and
/// `last_sync_times`; `sync_id` never changes once assigned;
/// `updated_at` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    sync_id: SyncId,
    backend_ids: BTreeMap<BackendId, String>,
    versions: BTreeMap<BackendId, ContentHash>,
    last_sync_times: BTreeMap<BackendId, DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    has_conflicts: bool,
}

impl SyncItem {
    /// Creates a new `SyncItem` binding the given backend ids to their
    /// current content hashes, stamping `created_at`/`updated_at`/every
    /// `last_sync_times` entry to now.
    ///
    /// # Errors
    /// Returns `DomainError::InconsistentSyncItem` if `backend_ids` and
    /// `versions` do not cover exactly the same set of backends.
    pub fn new(
        backend_ids: BTreeMap<BackendId, String>,
        versions: BTreeMap<BackendId, ContentHash>,
    ) -> Result<Self, DomainError> {
        if backend_ids.keys().ne(versions.keys()) {
            return Err(DomainError::InconsistentSyncItem(
                "backend_ids and versions must cover the same backends".to_string(),
            ));
        }
        let now = Utc::now();
        let last_sync_times = backend_ids.keys().cloned().map(|b| (b, now)).collect();
        Ok(Self {
            sync_id: SyncId::new(),
            backend_ids,
            versions,
            last_sync_times,
            created_at: now,
            updated_at: now,
            has_conflicts: false,
        })
    }

    /// Reconstructs a `SyncItem` from its persisted on-disk fields, without
    /// re-deriving the sync id or timestamps. Used by the Sync-State Store
    /// when loading `sync-items.jsonl`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        sync_id: SyncId,
        backend_ids: BTreeMap<BackendId, String>,
        versions: BTreeMap<BackendId, ContentHash>,
        last_sync_times: BTreeMap<BackendId, DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        has_conflicts: bool,
    ) -> Self {
        Self {
            sync_id,
            backend_ids,
            versions,
            last_sync_times,
            created_at,
            updated_at,
            has_conflicts,
        }
    }

    pub fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    pub fn backend_ids(&self) -> &BTreeMap<BackendId, String> {
        &self.backend_ids
    }

    pub fn versions(&self) -> &BTreeMap<BackendId, ContentHash> {
        &self.versions
    }

    pub fn last_sync_times(&self) -> &BTreeMap<BackendId, DateTime<Utc>> {
        &self.last_sync_times
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn has_conflicts(&self) -> bool {
        self.has_conflicts
    }

    /// The backend-local task id for the given backend, if this identity
    /// has a slot on that backend.
    pub fn backend_item_id(&self, backend: &BackendId) -> Option<&str> {
        self.backend_ids.get(backend).map(String::as_str)
    }

    pub fn set_has_conflicts(&mut self, value: bool) {
        self.has_conflicts = value;
        self.touch();
    }

    /// Binds (or rebinds) a backend slot: sets its item id, version hash,
    /// and last-sync time, adding the backend if it was not already
    /// present. Per §4.2, changing `backend_ids` requires the caller
    /// (the Sync-State Store) to regenerate `IdMapping` rows afterward.
    pub fn set_backend_slot(&mut self, backend: BackendId, item_id: String, version: ContentHash) {
        let now = Utc::now();
        self.backend_ids.insert(backend.clone(), item_id);
        self.versions.insert(backend.clone(), version);
        self.last_sync_times.insert(backend, now);
        self.touch();
    }

    /// Bumps only the recorded version/last-sync-time for a backend that
    /// already has a slot; does not add a new backend.
    pub fn bump_version(&mut self, backend: &BackendId, version: ContentHash) {
        if self.backend_ids.contains_key(backend) {
            self.versions.insert(backend.clone(), version);
            self.last_sync_times.insert(backend.clone(), Utc::now());
            self.touch();
        }
    }

    /// Removes a backend slot entirely (e.g. the item was deleted there
    /// and the delete-semantics policy preserves the SyncItem for the
    /// remaining backends).
    pub fn remove_backend_slot(&mut self, backend: &BackendId) {
        self.backend_ids.remove(backend);
        self.versions.remove(backend);
        self.last_sync_times.remove(backend);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A projection of one `SyncItem`'s `backend_ids` entry pair, kept for
/// fast `(source, source_id) -> target_id` lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    pub sync_id: SyncId,
    pub source_backend: BackendId,
    pub source_id: String,
    pub target_backend: BackendId,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
}

impl IdMapping {
    /// Derives every ordered-pair mapping row for a `SyncItem`: for N
    /// populated backend slots, `N * (N - 1)` rows (both directions, all
    /// pairs), per §3's mapping-completeness invariant.
    pub fn derive_all(item: &SyncItem) -> Vec<IdMapping> {
        let now = Utc::now();
        let slots: Vec<(&BackendId, &String)> = item.backend_ids().iter().collect();
        let mut rows = Vec::with_capacity(slots.len().saturating_sub(1) * slots.len());
        for &(source_backend, source_id) in &slots {
            for &(target_backend, target_id) in &slots {
                if source_backend == target_backend {
                    continue;
                }
                rows.push(IdMapping {
                    sync_id: item.sync_id(),
                    source_backend: source_backend.clone(),
                    source_id: source_id.clone(),
                    target_backend: target_backend.clone(),
                    target_id: target_id.clone(),
                    created_at: now,
                    last_verified_at: now,
                });
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(b: u8) -> ContentHash {
        ContentHash::new(format!("{:02x}", b).repeat(32)).unwrap()
    }

    #[test]
    fn new_rejects_mismatched_backend_sets() {
        let a = BackendId::new("a").unwrap();
        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(a.clone(), "1".to_string());
        let versions = BTreeMap::new();
        assert!(SyncItem::new(backend_ids, versions).is_err());
    }

    #[test]
    fn new_populates_last_sync_times_for_every_backend() {
        let a = BackendId::new("a").unwrap();
        let b = BackendId::new("b").unwrap();
        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(a.clone(), "1".to_string());
        backend_ids.insert(b.clone(), "2".to_string());
        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), hash(1));
        versions.insert(b.clone(), hash(2));

        let item = SyncItem::new(backend_ids, versions).unwrap();
        assert_eq!(item.last_sync_times().len(), 2);
        assert!(!item.has_conflicts());
    }

    #[test]
    fn derive_all_produces_n_times_n_minus_one_rows() {
        let a = BackendId::new("a").unwrap();
        let b = BackendId::new("b").unwrap();
        let c = BackendId::new("c").unwrap();
        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(a.clone(), "1".to_string());
        backend_ids.insert(b.clone(), "2".to_string());
        backend_ids.insert(c.clone(), "3".to_string());
        let mut versions = BTreeMap::new();
        versions.insert(a, hash(1));
        versions.insert(b, hash(2));
        versions.insert(c, hash(3));

        let item = SyncItem::new(backend_ids, versions).unwrap();
        let rows = IdMapping::derive_all(&item);
        assert_eq!(rows.len(), 6); // N*(N-1) = 3*2
        for row in &rows {
            assert_eq!(row.sync_id, item.sync_id());
        }
    }

    #[test]
    fn updated_at_is_non_decreasing_across_mutations() {
        let a = BackendId::new("a").unwrap();
        let mut backend_ids = BTreeMap::new();
        backend_ids.insert(a.clone(), "1".to_string());
        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), hash(1));
        let mut item = SyncItem::new(backend_ids, versions).unwrap();

        let first = item.updated_at();
        item.bump_version(&a, hash(2));
        assert!(item.updated_at() >= first);
    }
}
