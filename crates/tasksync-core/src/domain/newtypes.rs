//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for domain identifiers and values. Each newtype
//! ensures data validity at construction time rather than passing raw
//! strings around the engine.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Opaque, core-generated identifier for a sync identity (a `SyncItem`).
///
/// Immutable once assigned; a `SyncId` never changes for the lifetime of
/// the identity it names, even as `backendIds` are added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(Uuid);

impl SyncId {
    /// Generates a fresh random `SyncId` (UUIDv4, per the on-disk contract).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SyncId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("invalid SyncId: {e}")))
    }
}

impl From<Uuid> for SyncId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for a backend participant, unique within the process.
///
/// Backend ids are caller-supplied (e.g. `"asana"`, `"local-file"`), not
/// generated, so the newtype only rejects the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Creates a new `BackendId`.
    ///
    /// # Errors
    /// Returns an error if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidBackendId(
                "backend id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BackendId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackendId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A task's stable identifier within a single backend (the `gid`).
///
/// Identity across backends is mediated by the Sync-State Store, not by
/// this type: two `TaskGid`s from different backends are never compared
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskGid(String);

impl TaskGid {
    /// Creates a new `TaskGid`.
    ///
    /// # Errors
    /// Returns an error if the gid is empty.
    pub fn new(gid: impl Into<String>) -> Result<Self, DomainError> {
        let gid = gid.into();
        if gid.is_empty() {
            return Err(DomainError::InvalidTaskGid(
                "task gid cannot be empty".to_string(),
            ));
        }
        Ok(Self(gid))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskGid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskGid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// SHA-256 hex digest of a normalized task, used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps an already-computed hex digest.
    ///
    /// # Errors
    /// Returns an error if the value is not a 64-character lowercase hex string.
    pub fn new(hash: impl Into<String>) -> Result<Self, DomainError> {
        let hash = hash.into();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(format!(
                "content hash must be a 64-character hex digest, got: {hash}"
            )));
        }
        Ok(Self(hash.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identifier for a set of participating backends, derived
/// by sorting backend ids and joining with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPairId(String);

impl SyncPairId {
    /// Derives a `SyncPairId` from a set of backend ids (order-independent).
    #[must_use]
    pub fn from_backends<'a>(backends: impl IntoIterator<Item = &'a BackendId>) -> Self {
        let mut ids: Vec<&str> = backends.into_iter().map(BackendId::as_str).collect();
        ids.sort_unstable();
        Self(ids.join("-"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SyncPairId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_id_roundtrips_through_display_and_fromstr() {
        let id = SyncId::new();
        let parsed: SyncId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn backend_id_rejects_empty() {
        assert!(BackendId::new("").is_err());
        assert!(BackendId::new("asana").is_ok());
    }

    #[test]
    fn content_hash_rejects_wrong_length() {
        assert!(ContentHash::new("deadbeef").is_err());
        assert!(ContentHash::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn sync_pair_id_is_order_independent() {
        let a = BackendId::new("zeta").unwrap();
        let b = BackendId::new("alpha").unwrap();
        let forward = SyncPairId::from_backends([&a, &b]);
        let backward = SyncPairId::from_backends([&b, &a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.as_str(), "alpha-zeta");
    }
}
