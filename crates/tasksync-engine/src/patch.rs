//! Builds `TaskPatch` payloads for backend writes: the seed patch used by
//! `createTask`, the immediate-follow-up patch for the fields a create
//! call does not accept directly, and the minimal diff patch used by
//! updates (§4.5 step 3).

use tasksync_core::domain::{Task, TaskPatch};

/// The fields §4.1's `createTask(name, notes?, dueOn?, priority?,
/// isMilestone?)` accepts directly.
pub fn seed_patch(task: &Task) -> TaskPatch {
    TaskPatch {
        name: Some(task.name.clone()),
        notes: task.notes.clone(),
        due_on: task.due_on.clone(),
        priority: task.priority,
        is_milestone: Some(task.is_milestone),
        ..TaskPatch::default()
    }
}

/// The fields a create call does not accept and that must be applied as
/// an immediate follow-up update, when set on the source record.
pub fn followup_patch(task: &Task) -> TaskPatch {
    let mut patch = TaskPatch::default();
    if task.completed {
        patch.completed = Some(true);
    }
    if task.start_on.is_some() {
        patch.start_on = task.start_on.clone();
    }
    if task.assignee.is_some() {
        patch.assignee = task.assignee.clone();
    }
    if !task.memberships.is_empty() {
        patch.memberships = Some(task.memberships.clone());
    }
    patch
}

/// Builds the minimal `TaskPatch` that brings `current` to `desired` for
/// exactly the given field names, skipping fields that already agree.
/// Used by one-way's update path (`changed_fields` is the coarse
/// syncable-field list there) and by two-way/N-way after
/// `detect_field_changes` narrows it to the true delta.
pub fn diff_patch(current: &Task, desired: &Task, fields: &[String]) -> TaskPatch {
    let mut patch = TaskPatch::default();
    for field in fields {
        match field.as_str() {
            "name" if current.name != desired.name => patch.name = Some(desired.name.clone()),
            "notes" if current.notes != desired.notes => patch.notes = desired.notes.clone().or(Some(String::new())),
            "completed" if current.completed != desired.completed => patch.completed = Some(desired.completed),
            "due_on" if current.due_on != desired.due_on => patch.due_on = desired.due_on.clone(),
            "start_on" if current.start_on != desired.start_on => patch.start_on = desired.start_on.clone(),
            "assignee" if current.assignee != desired.assignee => patch.assignee = desired.assignee.clone(),
            "tags" if current.tags != desired.tags => patch.tags = Some(desired.tags.clone()),
            "parent" if current.parent != desired.parent => patch.parent = desired.parent.clone(),
            "priority" if current.priority != desired.priority => patch.priority = desired.priority,
            "is_milestone" if current.is_milestone != desired.is_milestone => {
                patch.is_milestone = Some(desired.is_milestone)
            }
            _ => {}
        }
    }
    patch
}
