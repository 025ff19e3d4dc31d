//! Content-hash normalization (§4.3).
//!
//! Computes the SHA-256 digest of a task's syncable fields, after
//! dropping backend-idiosyncratic noise and canonicalizing collections so
//! that hash-equal tasks compare equal under the §4.3 equality rule
//! regardless of tag order or object key order.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use tasksync_core::domain::{ContentHash, Task};

/// Produces the canonical normalized JSON form of a task: only syncable
/// fields, with collections sorted, ready to be hashed or compared.
///
/// Includes `gid`, so this is only meaningful when comparing a task
/// against itself over time on one backend (the Sync-State Store's
/// per-backend `versions` entry). Comparing two different backends'
/// copies of the "same" synced item needs [`normalize_without_gid`]
/// instead, since their `gid`s necessarily differ.
pub fn normalize(task: &Task) -> Value {
    normalize_inner(task, true)
}

/// Same canonical form as [`normalize`], but without `gid`/`assigneeGid`'s
/// backend identity: two different backends' copies of the "same" synced
/// item necessarily carry different `gid`s, so cross-backend identity and
/// content-equality checks (pairing new items across backends, the
/// convergence property) compare this form instead.
pub fn normalize_without_gid(task: &Task) -> Value {
    normalize_inner(task, false)
}

fn normalize_inner(task: &Task, include_gid: bool) -> Value {
    let mut tags = task.tags.clone();
    tags.sort();

    let mut dependencies = task.dependencies.clone();
    dependencies.sort();
    let mut dependents = task.dependents.clone();
    dependents.sort();

    let mut sections: Vec<String> = task.memberships.iter().map(|m| m.gid.clone()).collect();
    sections.sort();

    let assignee = task.assignee.as_ref().map(|a| {
        json!({
            "name": a.name,
            "gid": a.gid,
        })
    });

    let mut object = Map::new();
    if include_gid {
        object.insert("gid".into(), json!(task.gid));
    }
    object.insert("name".into(), json!(task.name.clone()));
    object.insert("notes".into(), json!(task.notes.clone().unwrap_or_default()));
    object.insert("completed".into(), json!(task.completed));
    object.insert("dueOn".into(), json!(task.due_on));
    object.insert("startOn".into(), json!(task.start_on));
    object.insert("assignee".into(), assignee.unwrap_or(Value::Null));
    if include_gid {
        object.insert("assigneeGid".into(), json!(task.assignee.as_ref().map(|a| a.gid.clone())));
    }
    object.insert("priority".into(), json!(task.priority));
    object.insert("isMilestone".into(), json!(task.is_milestone));
    object.insert("tags".into(), json!(tags));
    object.insert("dependencies".into(), json!(dependencies));
    object.insert("dependents".into(), json!(dependents));
    object.insert("parent".into(), json!(task.parent));
    object.insert("sections".into(), json!(sections));

    Value::Object(object)
}

/// Computes the SHA-256 hex digest of a task's normalized, canonical
/// JSON form (sorted object keys are guaranteed by `serde_json::Map`'s
/// `BTreeMap` backing).
pub fn content_hash(task: &Task) -> ContentHash {
    hash_value(&normalize(task))
}

/// Same as [`content_hash`], but over [`normalize_without_gid`]'s form,
/// for comparing the "same" item's copies across two different backends.
pub fn content_hash_without_gid(task: &Task) -> ContentHash {
    hash_value(&normalize_without_gid(task))
}

fn hash_value(normalized: &Value) -> ContentHash {
    let canonical = serde_json::to_string(normalized).expect("normalized value is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    ContentHash::new(format!("{:x}", digest)).expect("sha256 digest is always a valid 64-char hex string")
}
