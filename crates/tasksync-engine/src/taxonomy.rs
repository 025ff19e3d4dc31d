//! Tag/section taxonomy sync (§4.5 step 4, §4.6 step 4, §4.7 step 4): a
//! name-keyed set-difference, creating whatever is missing.

use std::collections::BTreeSet;

use tasksync_core::ports::BackendAdapter;

/// Creates every tag in `source` missing from `target` by name
/// (case-sensitive), returning the count created.
pub async fn sync_tags_one_way(source: &dyn BackendAdapter, target: &dyn BackendAdapter) -> anyhow::Result<u64> {
    let source_names: BTreeSet<String> = source.list_tags().await?.into_iter().map(|t| t.name).collect();
    let target_names: BTreeSet<String> = target.list_tags().await?.into_iter().map(|t| t.name).collect();

    let mut created = 0;
    for name in source_names.difference(&target_names) {
        target.create_tag(name).await?;
        created += 1;
    }
    Ok(created)
}

pub async fn sync_sections_one_way(source: &dyn BackendAdapter, target: &dyn BackendAdapter) -> anyhow::Result<u64> {
    let source_names: BTreeSet<String> = source.list_sections().await?.into_iter().map(|s| s.name).collect();
    let target_names: BTreeSet<String> = target.list_sections().await?.into_iter().map(|s| s.name).collect();

    let mut created = 0;
    for name in source_names.difference(&target_names) {
        target.create_section(name).await?;
        created += 1;
    }
    Ok(created)
}

/// Two-way and N-way variant: unions tag names across every participating
/// backend, then creates whatever is missing on each.
pub async fn sync_tags_union(backends: &[&dyn BackendAdapter]) -> anyhow::Result<u64> {
    let mut per_backend = Vec::with_capacity(backends.len());
    let mut union = BTreeSet::new();
    for backend in backends {
        let names: BTreeSet<String> = backend.list_tags().await?.into_iter().map(|t| t.name).collect();
        union.extend(names.iter().cloned());
        per_backend.push(names);
    }

    let mut created = 0;
    for (backend, names) in backends.iter().zip(per_backend.iter()) {
        for name in union.difference(names) {
            backend.create_tag(name).await?;
            created += 1;
        }
    }
    Ok(created)
}

pub async fn sync_sections_union(backends: &[&dyn BackendAdapter]) -> anyhow::Result<u64> {
    let mut per_backend = Vec::with_capacity(backends.len());
    let mut union = BTreeSet::new();
    for backend in backends {
        let names: BTreeSet<String> = backend.list_sections().await?.into_iter().map(|s| s.name).collect();
        union.extend(names.iter().cloned());
        per_backend.push(names);
    }

    let mut created = 0;
    for (backend, names) in backends.iter().zip(per_backend.iter()) {
        for name in union.difference(names) {
            backend.create_section(name).await?;
            created += 1;
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryAdapter;

    #[tokio::test]
    async fn one_way_creates_only_missing_tags_in_target() {
        let source = InMemoryAdapter::new("source");
        source.seed_tag("urgent").await;
        source.seed_tag("billing").await;
        let target = InMemoryAdapter::new("target");
        target.seed_tag("billing").await;

        let created = sync_tags_one_way(&source, &target).await.unwrap();
        assert_eq!(created, 1);
        let names: Vec<String> = target.list_tags().await.unwrap().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"urgent".to_string()));
    }

    #[tokio::test]
    async fn union_backfills_every_backend_missing_a_name() {
        let a = InMemoryAdapter::new("a");
        a.seed_section("Backlog").await;
        let b = InMemoryAdapter::new("b");
        b.seed_section("Done").await;

        let created = sync_sections_union(&[&a, &b]).await.unwrap();
        assert_eq!(created, 2);
        let a_names: Vec<String> = a.list_sections().await.unwrap().into_iter().map(|s| s.name).collect();
        let b_names: Vec<String> = b.list_sections().await.unwrap().into_iter().map(|s| s.name).collect();
        assert!(a_names.contains(&"Done".to_string()));
        assert!(b_names.contains(&"Backlog".to_string()));
    }
}
