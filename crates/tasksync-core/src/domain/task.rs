//! The synced entity: `Task`, and the small taxonomies that travel with it.

use serde::{Deserialize, Serialize};

/// Priority level carried by a task, when the backend supports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A human assignee: a display name plus the backend's own identifier for
/// that person. Adapters populate both; the core never resolves identities
/// across backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
    pub gid: String,
}

/// A task's membership in a section of some list/project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMembership {
    pub gid: String,
    pub name: String,
}

/// A tag attached to a backend's task corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub gid: String,
    pub name: String,
}

/// A section (sub-list) within a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub gid: String,
    pub name: String,
}

/// The primary synced entity.
///
/// Identity within a backend is `gid`; identity across backends is
/// mediated entirely by the Sync-State Store, never by comparing `gid`s
/// from different backends directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub gid: String,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub due_on: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_on: Option<String>,
    #[serde(default)]
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub memberships: Vec<SectionMembership>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl Task {
    /// A minimal task with just a gid and a name; every other field takes
    /// its syncable default. Handy for tests and for adapters constructing
    /// freshly-created records.
    pub fn new(gid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gid: gid.into(),
            name: name.into(),
            notes: None,
            completed: false,
            due_on: None,
            start_on: None,
            assignee: None,
            tags: Vec::new(),
            parent: None,
            priority: None,
            is_milestone: false,
            memberships: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// A create-or-update payload with only the fields the caller wishes to
/// set; `None` means "leave unchanged" everywhere except where noted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub completed: Option<bool>,
    pub due_on: Option<String>,
    pub start_on: Option<String>,
    pub assignee: Option<Assignee>,
    pub tags: Option<Vec<String>>,
    pub parent: Option<String>,
    pub priority: Option<Priority>,
    pub is_milestone: Option<bool>,
    pub memberships: Option<Vec<SectionMembership>>,
}

impl TaskPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_syncable_defaults() {
        let t = Task::new("g1", "My Task");
        assert_eq!(t.name, "My Task");
        assert!(!t.completed);
        assert!(t.tags.is_empty());
        assert!(t.priority.is_none());
    }

    #[test]
    fn empty_patch_is_recognized() {
        assert!(TaskPatch::default().is_empty());
        let mut p = TaskPatch::default();
        p.completed = Some(true);
        assert!(!p.is_empty());
    }
}
