//! Applies a `SyncFilter` to detected changes before they propagate (§4.5
//! step 2).

use tasksync_core::config::SyncFilter;
use tasksync_core::domain::{ItemChange, Task};

/// Whether `change` should propagate under `filter`.
///
/// Deletes carry no `new_values` to filter against (the store does not
/// retain task contents, §9) and always pass: a delete that should not
/// have propagated would have already been excluded when its creation or
/// update was filtered out.
pub fn passes_filter(change: &ItemChange, filter: &SyncFilter) -> bool {
    let Some(values) = &change.new_values else {
        return true;
    };
    let Ok(task) = serde_json::from_value::<Task>(values.clone()) else {
        return true;
    };

    if let Some(completed) = filter.completed {
        if task.completed != completed {
            return false;
        }
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|tag| task.tags.contains(tag)) {
        return false;
    }
    if !filter.sections.is_empty() {
        let member_names: Vec<&str> = task.memberships.iter().map(|m| m.name.as_str()).collect();
        if !filter.sections.iter().any(|name| member_names.contains(&name.as_str())) {
            return false;
        }
    }
    if !filter.assignees.is_empty() {
        let assigned = task
            .assignee
            .as_ref()
            .is_some_and(|a| filter.assignees.contains(&a.gid));
        if !assigned {
            return false;
        }
    }
    if let Some(after) = filter.modified_after {
        if change.detected_at <= after {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use tasksync_core::domain::{Assignee, BackendId, ChangeType};

    use super::*;

    fn change_for(task: &Task) -> ItemChange {
        ItemChange::new(task.gid.clone(), ChangeType::Created, BackendId::new("a").unwrap())
            .with_new_values(serde_json::to_value(task).unwrap())
    }

    #[test]
    fn deletes_always_pass() {
        let delete = ItemChange::new("gone", ChangeType::Deleted, BackendId::new("a").unwrap());
        let mut filter = SyncFilter::default();
        filter.completed = Some(true);
        assert!(passes_filter(&delete, &filter));
    }

    #[test]
    fn completed_filter_excludes_mismatches() {
        let task = Task::new("t1", "Task");
        let mut filter = SyncFilter::default();
        filter.completed = Some(true);
        assert!(!passes_filter(&change_for(&task), &filter));
    }

    #[test]
    fn tag_filter_requires_at_least_one_match() {
        let mut task = Task::new("t1", "Task");
        task.tags = vec!["urgent".to_string()];
        let mut filter = SyncFilter::default();
        filter.tags = vec!["backlog".to_string()];
        assert!(!passes_filter(&change_for(&task), &filter));

        filter.tags = vec!["urgent".to_string()];
        assert!(passes_filter(&change_for(&task), &filter));
    }

    #[test]
    fn assignee_filter_matches_by_gid() {
        let mut task = Task::new("t1", "Task");
        task.assignee = Some(Assignee {
            name: "Ada".into(),
            gid: "u1".into(),
        });
        let mut filter = SyncFilter::default();
        filter.assignees = vec!["u2".to_string()];
        assert!(!passes_filter(&change_for(&task), &filter));

        filter.assignees = vec!["u1".to_string()];
        assert!(passes_filter(&change_for(&task), &filter));
    }
}
