//! An in-memory `BackendAdapter` test double, used to drive the §8
//! end-to-end scenarios without a network or filesystem backend.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tasksync_core::domain::{Section, Tag, Task, TaskPatch};
use tasksync_core::ports::BackendAdapter;

/// A fake backend whose entire state lives in memory, keyed by `gid`.
/// Panics are avoided in favour of `anyhow` errors so engine error
/// handling paths can be exercised directly against this double.
pub struct InMemoryAdapter {
    id: String,
    tasks: Mutex<Vec<Task>>,
    tags: Mutex<Vec<Tag>>,
    sections: Mutex<Vec<Section>>,
    next_id: AtomicU64,
}

impl InMemoryAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Mutex::new(Vec::new()),
            tags: Mutex::new(Vec::new()),
            sections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn fresh_gid(&self) -> String {
        format!("{}-gen-{}", self.id, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn seed_task(&self, task: Task) {
        self.tasks.lock().await.push(task);
    }

    pub async fn seed_tag(&self, name: &str) {
        self.tags.lock().await.push(Tag {
            gid: format!("tag-{name}"),
            name: name.to_string(),
        });
    }

    pub async fn seed_section(&self, name: &str) {
        self.sections.lock().await.push(Section {
            gid: format!("section-{name}"),
            name: name.to_string(),
        });
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    fn apply_patch(task: &mut Task, patch: TaskPatch) {
        if let Some(name) = patch.name {
            task.name = name;
        }
        if patch.notes.is_some() {
            task.notes = patch.notes;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        if patch.due_on.is_some() {
            task.due_on = patch.due_on;
        }
        if patch.start_on.is_some() {
            task.start_on = patch.start_on;
        }
        if patch.assignee.is_some() {
            task.assignee = patch.assignee;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if patch.parent.is_some() {
            task.parent = patch.parent;
        }
        if patch.priority.is_some() {
            task.priority = patch.priority;
        }
        if let Some(is_milestone) = patch.is_milestone {
            task.is_milestone = is_milestone;
        }
        if let Some(memberships) = patch.memberships {
            task.memberships = memberships;
        }
    }
}

#[async_trait]
impl BackendAdapter for InMemoryAdapter {
    fn backend_id(&self) -> &str {
        &self.id
    }

    async fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.tasks.lock().await.clone())
    }

    async fn get_task(&self, gid: &str) -> anyhow::Result<Option<Task>> {
        Ok(self.tasks.lock().await.iter().find(|t| t.gid == gid).cloned())
    }

    async fn create_task(&self, seed: TaskPatch) -> anyhow::Result<Task> {
        let mut task = Task::new(self.fresh_gid(), seed.name.clone().unwrap_or_default());
        Self::apply_patch(&mut task, seed);
        self.tasks.lock().await.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, gid: &str, patch: TaskPatch) -> anyhow::Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.gid == gid)
            .ok_or_else(|| anyhow::anyhow!("validation error: no task with gid {gid}"))?;
        Self::apply_patch(task, patch);
        Ok(task.clone())
    }

    async fn delete_task(&self, gid: &str) -> anyhow::Result<()> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|t| t.gid != gid);
        if tasks.len() == before {
            return Err(anyhow::anyhow!("validation error: no task with gid {gid}"));
        }
        Ok(())
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        Ok(self.tags.lock().await.clone())
    }

    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag> {
        let tag = Tag {
            gid: format!("tag-{name}"),
            name: name.to_string(),
        };
        self.tags.lock().await.push(tag.clone());
        Ok(tag)
    }

    async fn list_sections(&self) -> anyhow::Result<Vec<Section>> {
        Ok(self.sections.lock().await.clone())
    }

    async fn create_section(&self, name: &str) -> anyhow::Result<Section> {
        let section = Section {
            gid: format!("section-{name}"),
            name: name.to_string(),
        };
        self.sections.lock().await.push(section.clone());
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let adapter = InMemoryAdapter::new("a");
        let created = adapter
            .create_task(TaskPatch {
                name: Some("New".to_string()),
                ..TaskPatch::default()
            })
            .await
            .unwrap();
        let fetched = adapter.get_task(&created.gid).await.unwrap().unwrap();
        assert_eq!(fetched.name, "New");
    }

    #[tokio::test]
    async fn update_missing_task_is_an_error() {
        let adapter = InMemoryAdapter::new("a");
        assert!(adapter.update_task("missing", TaskPatch::default()).await.is_err());
    }
}
