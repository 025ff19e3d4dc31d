//! Conflict Resolver (§4.4): detects field-level disagreements between
//! backends for one sync identity and resolves them per a configured
//! `ConflictStrategy`.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{instrument, warn};

use tasksync_core::domain::{BackendId, ConflictStrategy, SyncConflict};

use crate::equality::{merge_values, values_equal};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("conflict on field '{0}' requires manual resolution but no resolver callback was configured")]
    ManualResolutionRequired(String),
}

/// Detects and resolves `SyncConflict`s under one fixed strategy.
///
/// One resolver is constructed per sync run (the strategy is read from
/// `SyncConfig` once at the start), not per conflict.
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Detects every field where two or more backends disagree, given each
    /// field's competing values in backend order.
    pub fn detect_conflicts(
        &self,
        values_by_field: &BTreeMap<String, Vec<(BackendId, Value)>>,
    ) -> Vec<SyncConflict> {
        values_by_field
            .iter()
            .filter_map(|(field, values)| {
                let disagree = values.windows(2).any(|pair| !values_equal(&pair[0].1, &pair[1].1));
                disagree.then(|| SyncConflict::new(field.clone(), values.clone(), self.strategy))
            })
            .collect()
    }

    /// Resolves one conflict under the resolver's strategy.
    ///
    /// `source` identifies which backend's value `source-wins`/`target-wins`
    /// resolve relative to. `manual_resolution` supplies the
    /// caller-chosen value for the `Manual` strategy; its absence is an
    /// error rather than a silent fallback, since a silently-applied
    /// default would contradict what "manual" means.
    ///
    /// Idempotent: an already-resolved conflict is returned unchanged.
    #[instrument(skip(self, conflict, manual_resolution), fields(field = %conflict.field))]
    pub fn resolve(
        &self,
        conflict: SyncConflict,
        source: &BackendId,
        manual_resolution: Option<Value>,
    ) -> Result<SyncConflict, ResolverError> {
        if conflict.resolved {
            return Ok(conflict);
        }

        let chosen: Option<(Value, Option<BackendId>)> = match self.strategy {
            ConflictStrategy::SourceWins => conflict
                .values
                .iter()
                .find(|(backend, _)| backend == source)
                .map(|(backend, value)| (value.clone(), Some(backend.clone()))),
            ConflictStrategy::TargetWins => conflict
                .values
                .iter()
                .find(|(backend, _)| backend != source)
                .map(|(backend, value)| (value.clone(), Some(backend.clone()))),
            ConflictStrategy::FirstWriteWins => conflict
                .values
                .first()
                .map(|(backend, value)| (value.clone(), Some(backend.clone()))),
            // No per-field modification timestamps are carried (§4.4), so
            // last-write-wins degenerates to the same first value as
            // first-write-wins rather than guessing at recency from order.
            ConflictStrategy::LastWriteWins => conflict
                .values
                .first()
                .map(|(backend, value)| (value.clone(), Some(backend.clone()))),
            ConflictStrategy::Merge => {
                let merged = conflict
                    .values
                    .iter()
                    .map(|(_, value)| value.clone())
                    .reduce(|acc, value| merge_values(&acc, &value));
                merged.map(|value| (value, None))
            }
            ConflictStrategy::Manual => match manual_resolution {
                Some(value) => Some((value, None)),
                None => {
                    warn!("manual resolution required but not supplied");
                    return Err(ResolverError::ManualResolutionRequired(conflict.field));
                }
            },
        };

        let (chosen_value, chosen_backend) = chosen.unwrap_or((Value::Null, None));
        Ok(conflict.mark_resolved(chosen_value, chosen_backend))
    }
}

/// Folds two backends' full task payloads into one, merging every
/// differing field under the `merge` rules (§4.4 step 3). Used by the
/// two-way and N-way engines' `Merge` strategy at the whole-item level,
/// distinct from `ConflictResolver::resolve`'s field-level resolution.
pub fn merge_items(a: &Value, b: &Value, a_backend: &BackendId, b_backend: &BackendId) -> Value {
    if values_equal(a, b) {
        return a.clone();
    }
    tracing::debug!(%a_backend, %b_backend, "merging divergent task payloads");
    merge_values(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(s: &str) -> BackendId {
        BackendId::new(s).unwrap()
    }

    fn conflict() -> SyncConflict {
        SyncConflict::new(
            "name",
            vec![
                (backend("asana"), json!("From Asana")),
                (backend("trello"), json!("From Trello")),
            ],
            ConflictStrategy::SourceWins,
        )
    }

    #[test]
    fn detect_conflicts_flags_disagreeing_fields_only() {
        let resolver = ConflictResolver::new(ConflictStrategy::SourceWins);
        let mut values_by_field = BTreeMap::new();
        values_by_field.insert(
            "name".to_string(),
            vec![(backend("a"), json!("x")), (backend("b"), json!("y"))],
        );
        values_by_field.insert(
            "completed".to_string(),
            vec![(backend("a"), json!(true)), (backend("b"), json!(true))],
        );

        let conflicts = resolver.detect_conflicts(&values_by_field);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "name");
    }

    #[test]
    fn source_wins_picks_source_backend_value() {
        let resolver = ConflictResolver::new(ConflictStrategy::SourceWins);
        let resolved = resolver.resolve(conflict(), &backend("asana"), None).unwrap();
        assert_eq!(resolved.resolution.unwrap().chosen_value, json!("From Asana"));
    }

    #[test]
    fn target_wins_picks_the_other_backend_value() {
        let resolver = ConflictResolver::new(ConflictStrategy::TargetWins);
        let resolved = resolver.resolve(conflict(), &backend("asana"), None).unwrap();
        assert_eq!(resolved.resolution.unwrap().chosen_value, json!("From Trello"));
    }

    #[test]
    fn first_and_last_write_wins_both_degenerate_to_the_first_value() {
        let first = ConflictResolver::new(ConflictStrategy::FirstWriteWins)
            .resolve(conflict(), &backend("asana"), None)
            .unwrap();
        assert_eq!(first.resolution.unwrap().chosen_value, json!("From Asana"));

        let last = ConflictResolver::new(ConflictStrategy::LastWriteWins)
            .resolve(conflict(), &backend("asana"), None)
            .unwrap();
        assert_eq!(last.resolution.unwrap().chosen_value, json!("From Asana"));
    }

    #[test]
    fn merge_strategy_combines_string_values_preferring_longer() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge);
        let resolved = resolver.resolve(conflict(), &backend("asana"), None).unwrap();
        assert_eq!(resolved.resolution.unwrap().chosen_value, json!("From Trello"));
    }

    #[test]
    fn manual_strategy_requires_a_supplied_resolution() {
        let resolver = ConflictResolver::new(ConflictStrategy::Manual);
        let err = resolver.resolve(conflict(), &backend("asana"), None).unwrap_err();
        assert_eq!(err, ResolverError::ManualResolutionRequired("name".to_string()));

        let resolved = resolver
            .resolve(conflict(), &backend("asana"), Some(json!("chosen by hand")))
            .unwrap();
        assert_eq!(resolved.resolution.unwrap().chosen_value, json!("chosen by hand"));
    }

    #[test]
    fn resolve_is_idempotent() {
        let resolver = ConflictResolver::new(ConflictStrategy::SourceWins);
        let resolved = resolver.resolve(conflict(), &backend("asana"), None).unwrap();
        let resolved_again = resolver.resolve(resolved.clone(), &backend("trello"), None).unwrap();
        assert_eq!(resolved.resolution, resolved_again.resolution);
    }

    #[test]
    fn merge_items_short_circuits_when_values_already_equal() {
        let a = json!({"name": "same"});
        let b = json!({"name": "same"});
        assert_eq!(merge_items(&a, &b, &backend("a"), &backend("b")), a);
    }
}
