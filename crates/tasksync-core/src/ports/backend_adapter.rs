//! Backend adapter port (driven/secondary port)
//!
//! This module defines the interface every task-management backend must
//! implement for the sync core to consume it. No concrete adapter ships
//! in this crate: the core treats backends as black boxes and callers
//! are responsible for injecting one implementation per participant.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and are categorized into `SyncError` kinds only at
//!   the engine boundary (see `crate::errors::categorize`).
//! - Uses `#[async_trait]` for async trait methods.
//! - Adapters are free to map fields idiosyncratically on their own side
//!   (e.g. encoding priority as a synthetic tag) but must present a
//!   clean `Task` to the core: the synthetic encoding must never leak
//!   into `Task::tags`.

use async_trait::async_trait;

use crate::domain::task::{Section, Tag, Task, TaskPatch};

/// Port trait for a single task-management backend.
///
/// Implementations are injected by the caller; the core never
/// constructs one.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable identifier for this backend, unique within the process.
    fn backend_id(&self) -> &str;

    /// Lists every task currently visible to this backend.
    async fn list_tasks(&self) -> anyhow::Result<Vec<Task>>;

    /// Fetches a single task by its backend-local `gid`.
    ///
    /// Returns `Ok(None)` if no task with that gid exists (not found is
    /// not an error condition at this layer).
    async fn get_task(&self, gid: &str) -> anyhow::Result<Option<Task>>;

    /// Creates a new task from the given seed fields.
    async fn create_task(&self, seed: TaskPatch) -> anyhow::Result<Task>;

    /// Applies a partial update to an existing task.
    async fn update_task(&self, gid: &str, patch: TaskPatch) -> anyhow::Result<Task>;

    /// Deletes a task.
    async fn delete_task(&self, gid: &str) -> anyhow::Result<()>;

    /// Lists every tag known to this backend.
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>>;

    /// Creates a tag by name.
    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag>;

    /// Lists every section known to this backend.
    async fn list_sections(&self) -> anyhow::Result<Vec<Section>>;

    /// Creates a section by name.
    async fn create_section(&self, name: &str) -> anyhow::Result<Section>;
}
