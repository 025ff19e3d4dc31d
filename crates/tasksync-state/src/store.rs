//! `SyncStateStore`: the JSONL-backed implementation of §4.2's contract.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use tasksync_core::domain::{BackendId, ContentHash, IdMapping, SyncId, SyncItem, SyncPairId};

use crate::error::StateError;
use crate::locking;

const SYNC_ITEMS_FILE: &str = "sync-items.jsonl";
const ID_MAPPINGS_FILE: &str = "id-mappings.jsonl";

#[derive(Default)]
struct Cache {
    loaded: bool,
    items: BTreeMap<SyncId, SyncItem>,
    /// Keyed by `(source_backend, source_id, target_backend)`, per §4.2.
    mappings: BTreeMap<(BackendId, String, BackendId), IdMapping>,
}

/// Durable storage for `SyncItem`s and `IdMapping`s, scoped to one
/// `syncPairId`.
///
/// Opening a store does not read from disk; the in-memory caches are
/// populated lazily on first operation (`cacheLoaded`, per §5) and never
/// re-read afterward within the same handle's lifetime.
pub struct SyncStateStore {
    dir: PathBuf,
    pair_id: SyncPairId,
    write_lock: Arc<Mutex<()>>,
    cache: RwLock<Cache>,
}

impl SyncStateStore {
    /// Opens (without yet reading) the store for the sync pair derived
    /// from `backends`, rooted at `<base_path>/sync-state/<syncPairId>/`.
    pub fn open<'a>(base_path: &std::path::Path, backends: impl IntoIterator<Item = &'a BackendId>) -> Self {
        let pair_id = SyncPairId::from_backends(backends);
        let dir = base_path.join("sync-state").join(pair_id.as_str());
        Self {
            write_lock: locking::lock_for(&pair_id),
            dir,
            pair_id,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn sync_pair_id(&self) -> &SyncPairId {
        &self.pair_id
    }

    async fn ensure_loaded(&self) -> Result<(), StateError> {
        {
            let cache = self.cache.read().await;
            if cache.loaded {
                return Ok(());
            }
        }
        let mut cache = self.cache.write().await;
        if cache.loaded {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).await?;

        for line in read_lines(&self.dir.join(SYNC_ITEMS_FILE)).await? {
            let item: SyncItem = serde_json::from_str(&line)?;
            cache.items.insert(item.sync_id(), item);
        }
        for line in read_lines(&self.dir.join(ID_MAPPINGS_FILE)).await? {
            let mapping: IdMapping = serde_json::from_str(&line)?;
            let key = (
                mapping.source_backend.clone(),
                mapping.source_id.clone(),
                mapping.target_backend.clone(),
            );
            cache.mappings.insert(key, mapping);
        }
        cache.loaded = true;
        debug!(
            sync_pair_id = %self.pair_id,
            items = cache.items.len(),
            mappings = cache.mappings.len(),
            "loaded sync-state cache"
        );
        Ok(())
    }

    /// Rewrites both JSONL logs from the in-memory cache. Called under
    /// `write_lock` after every mutation; the reference crate's "scoped
    /// resource acquisition" note (§9) is honoured by always using a
    /// fresh `File` per rewrite rather than holding one open across
    /// operations.
    async fn persist(&self, cache: &Cache) -> Result<(), StateError> {
        write_all_lines(&self.dir.join(SYNC_ITEMS_FILE), cache.items.values()).await?;
        write_all_lines(&self.dir.join(ID_MAPPINGS_FILE), cache.mappings.values()).await?;
        Ok(())
    }

    /// Creates a new `SyncItem` from the given backend ids/versions and
    /// persists it plus its full mapping set.
    ///
    /// On I/O failure the in-memory insert is rolled back before the
    /// error is surfaced, per §4.2.
    #[instrument(skip(self, versions))]
    pub async fn create_sync_item(
        &self,
        backend_ids: BTreeMap<BackendId, String>,
        versions: BTreeMap<BackendId, ContentHash>,
    ) -> Result<SyncId, StateError> {
        self.ensure_loaded().await?;
        let _guard = self.write_lock.lock().await;

        let item = SyncItem::new(backend_ids, versions)?;
        let sync_id = item.sync_id();
        let mappings = IdMapping::derive_all(&item);

        let mut cache = self.cache.write().await;
        cache.items.insert(sync_id, item);
        for mapping in &mappings {
            let key = (
                mapping.source_backend.clone(),
                mapping.source_id.clone(),
                mapping.target_backend.clone(),
            );
            cache.mappings.insert(key, mapping.clone());
        }

        if let Err(err) = self.persist(&cache).await {
            cache.items.remove(&sync_id);
            for mapping in &mappings {
                let key = (
                    mapping.source_backend.clone(),
                    mapping.source_id.clone(),
                    mapping.target_backend.clone(),
                );
                cache.mappings.remove(&key);
            }
            warn!(sync_pair_id = %self.pair_id, error = %err, "rolled back create_sync_item after persist failure");
            return Err(err);
        }
        Ok(sync_id)
    }

    /// Replaces the stored `SyncItem` for `sync_id` and, if its
    /// `backend_ids` changed, regenerates every mapping row for it.
    #[instrument(skip(self, updated))]
    pub async fn update_sync_item(&self, sync_id: SyncId, updated: SyncItem) -> Result<SyncItem, StateError> {
        if updated.sync_id() != sync_id {
            return Err(StateError::Domain(
                tasksync_core::domain::DomainError::ValidationFailed(
                    "sync_id must not be mutated by an update".to_string(),
                ),
            ));
        }
        self.ensure_loaded().await?;
        let _guard = self.write_lock.lock().await;

        let mut cache = self.cache.write().await;
        let previous = cache
            .items
            .get(&sync_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(sync_id.to_string()))?;

        let backend_ids_changed = previous.backend_ids() != updated.backend_ids();
        let previous_mappings: Vec<IdMapping> = if backend_ids_changed {
            IdMapping::derive_all(&previous)
        } else {
            Vec::new()
        };
        let new_mappings = if backend_ids_changed {
            IdMapping::derive_all(&updated)
        } else {
            Vec::new()
        };

        cache.items.insert(sync_id, updated.clone());
        for mapping in &previous_mappings {
            let key = (
                mapping.source_backend.clone(),
                mapping.source_id.clone(),
                mapping.target_backend.clone(),
            );
            cache.mappings.remove(&key);
        }
        for mapping in &new_mappings {
            let key = (
                mapping.source_backend.clone(),
                mapping.source_id.clone(),
                mapping.target_backend.clone(),
            );
            cache.mappings.insert(key, mapping.clone());
        }

        if let Err(err) = self.persist(&cache).await {
            cache.items.insert(sync_id, previous);
            for mapping in &new_mappings {
                let key = (
                    mapping.source_backend.clone(),
                    mapping.source_id.clone(),
                    mapping.target_backend.clone(),
                );
                cache.mappings.remove(&key);
            }
            for mapping in &previous_mappings {
                let key = (
                    mapping.source_backend.clone(),
                    mapping.source_id.clone(),
                    mapping.target_backend.clone(),
                );
                cache.mappings.insert(key, mapping.clone());
            }
            warn!(sync_pair_id = %self.pair_id, error = %err, "rolled back update_sync_item after persist failure");
            return Err(err);
        }
        Ok(updated)
    }

    pub async fn get_sync_item(&self, sync_id: SyncId) -> Result<Option<SyncItem>, StateError> {
        self.ensure_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache.items.get(&sync_id).cloned())
    }

    pub async fn find_sync_item_by_backend_id(
        &self,
        backend: &BackendId,
        item_id: &str,
    ) -> Result<Option<SyncItem>, StateError> {
        self.ensure_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache
            .items
            .values()
            .find(|item| item.backend_item_id(backend) == Some(item_id))
            .cloned())
    }

    pub async fn get_sync_items_by_backend(&self, backend: &BackendId) -> Result<Vec<SyncItem>, StateError> {
        self.ensure_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache
            .items
            .values()
            .filter(|item| item.backend_ids().contains_key(backend))
            .cloned()
            .collect())
    }

    pub async fn get_id_mapping(
        &self,
        source: &BackendId,
        source_id: &str,
        target: &BackendId,
    ) -> Result<Option<String>, StateError> {
        self.ensure_loaded().await?;
        let cache = self.cache.read().await;
        let key = (source.clone(), source_id.to_string(), target.clone());
        Ok(cache.mappings.get(&key).map(|m| m.target_id.clone()))
    }

    #[instrument(skip(self))]
    pub async fn delete_sync_item(&self, sync_id: SyncId) -> Result<(), StateError> {
        self.ensure_loaded().await?;
        let _guard = self.write_lock.lock().await;

        let mut cache = self.cache.write().await;
        let Some(item) = cache.items.remove(&sync_id) else {
            return Ok(());
        };
        let removed_mappings = IdMapping::derive_all(&item);
        for mapping in &removed_mappings {
            let key = (
                mapping.source_backend.clone(),
                mapping.source_id.clone(),
                mapping.target_backend.clone(),
            );
            cache.mappings.remove(&key);
        }

        if let Err(err) = self.persist(&cache).await {
            cache.items.insert(sync_id, item);
            for mapping in &removed_mappings {
                let key = (
                    mapping.source_backend.clone(),
                    mapping.source_id.clone(),
                    mapping.target_backend.clone(),
                );
                cache.mappings.insert(key, mapping.clone());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Resets the store to empty state, on disk and in memory.
    pub async fn clear_all(&self) -> Result<(), StateError> {
        self.ensure_loaded().await?;
        let _guard = self.write_lock.lock().await;
        let mut cache = self.cache.write().await;
        cache.items.clear();
        cache.mappings.clear();
        self.persist(&cache).await
    }
}

async fn read_lines(path: &std::path::Path) -> Result<Vec<String>, StateError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

async fn write_all_lines<'a, T: serde::Serialize + 'a>(
    path: &std::path::Path,
    rows: impl Iterator<Item = &'a T>,
) -> Result<(), StateError> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(&tmp_path).await?;
        for row in rows {
            let line = serde_json::to_string(row)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
    }
    fs::rename(&tmp_path, path).await?;
    Ok(())
}
