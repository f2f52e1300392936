//! Merge coordination: load, reconcile, plan, apply.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{ConsumedEntity, MergeRecord, MergeRecordId};
use crate::entity::{Alias, EntityId, EntityKind, NamedEntity};
use crate::error::{ExecutionError, LoreError, LoreResult, ValidationError};
use crate::relationship::RelationshipId;
use crate::similarity::name_key;
use crate::storage::{StorageError, StoryStore};

use super::builder::MergeRequest;
use super::plan::MergePlan;
use super::policy::absorb_fields;

/// Result of a completed merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// The surviving entity as stored after the merge.
    pub primary: NamedEntity,
    /// Duplicates that were folded in and deleted.
    pub consumed: Vec<ConsumedEntity>,
    /// Fields of the primary whose value changed.
    pub changed_fields: Vec<String>,
    /// Consumed names added as aliases of the primary.
    pub aliases_added: Vec<String>,
    /// The audit record written for this merge.
    pub record: MergeRecord,
}

impl MergeOutcome {
    /// Human-readable one-line summary.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lorekeeper::{EntityKind, InMemoryStoryStore, LoreEngine, NamedEntity, StoryStore};
    /// # use std::sync::Arc;
    /// # let store = Arc::new(InMemoryStoryStore::new());
    /// # let elena = NamedEntity::new(EntityKind::Character, "Elena");
    /// # let dup = NamedEntity::new(EntityKind::Character, "Elena Marsh");
    /// # store.insert_entity(elena.clone()).unwrap();
    /// # store.insert_entity(dup.clone()).unwrap();
    /// # let engine = LoreEngine::new(store);
    /// let outcome = engine.merge_by_ids(
    ///     EntityKind::Character,
    ///     &elena.id.to_string(),
    ///     &[&dup.id.to_string()],
    /// )?;
    /// assert_eq!(outcome.summary(), "merged 1 records into Elena");
    /// # Ok::<(), lorekeeper::LoreError>(())
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        format!("merged {} records into {}", self.consumed.len(), self.primary.name)
    }

    /// Identifiers of the consumed duplicates.
    #[must_use]
    pub fn consumed_ids(&self) -> Vec<EntityId> {
        self.consumed.iter().map(|c| c.id).collect()
    }

    /// Relationships removed because they would have linked the primary to itself.
    #[must_use]
    pub fn pruned_relationships(&self) -> &[RelationshipId] {
        &self.record.repointed.pruned_relationships
    }
}

/// Carries out merges against a store.
#[derive(Clone)]
pub struct MergeCoordinator {
    store: Arc<dyn StoryStore>,
}

impl MergeCoordinator {
    /// Creates a coordinator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StoryStore>) -> Self {
        Self { store }
    }

    /// Plans and applies a merge.
    pub fn execute(&self, request: &MergeRequest) -> LoreResult<MergeOutcome> {
        let (plan, changed_fields) = self.plan_with_changes(request)?;
        self.apply_plan(plan, changed_fields)
    }

    /// Loads the request's entities and reconciles them into a plan without
    /// changing anything.
    pub fn plan(&self, request: &MergeRequest) -> LoreResult<MergePlan> {
        self.plan_with_changes(request).map(|(plan, _)| plan)
    }

    /// Applies a previously built plan. Re-applying a plan whose earlier
    /// attempt failed partway finishes it.
    pub fn apply(&self, plan: MergePlan) -> LoreResult<MergeOutcome> {
        self.apply_plan(plan, Vec::new())
    }

    fn plan_with_changes(&self, request: &MergeRequest) -> LoreResult<(MergePlan, Vec<String>)> {
        request.validate()?;
        let primary = self.load(request.kind, request.primary)?;
        let duplicates = request
            .duplicates
            .iter()
            .map(|id| self.load(request.kind, *id))
            .collect::<LoreResult<Vec<_>>>()?;

        let mut merged = primary.clone();
        let mut changed_fields: Vec<String> = Vec::new();
        for dup in &duplicates {
            for field in absorb_fields(&mut merged, dup) {
                if !changed_fields.contains(&field) {
                    changed_fields.push(field);
                }
            }
        }
        merged.touch();

        let new_aliases = self.consumed_name_aliases(&primary, &duplicates)?;

        let plan = MergePlan {
            record_id: MergeRecordId::new(),
            kind: request.kind,
            primary: merged,
            expected_version: primary.version,
            duplicates: duplicates
                .iter()
                .map(|d| ConsumedEntity {
                    id: d.id,
                    name: d.name.clone(),
                })
                .collect(),
            new_aliases,
            merged_at: Utc::now(),
        };
        Ok((plan, changed_fields))
    }

    fn load(&self, kind: EntityKind, id: EntityId) -> LoreResult<NamedEntity> {
        let entity = self
            .store
            .get_entity(id)
            .map_err(storage_err)?
            .ok_or(ExecutionError::EntityNotFound { kind, id })?;

        if entity.kind != kind {
            return Err(ValidationError::KindMismatch {
                id,
                expected: kind,
                actual: entity.kind,
            }
            .into());
        }
        Ok(entity)
    }

    /// Each consumed name not already known for the primary becomes an alias.
    fn consumed_name_aliases(&self, primary: &NamedEntity, duplicates: &[NamedEntity]) -> LoreResult<Vec<Alias>> {
        let mut known: HashSet<String> = self
            .store
            .aliases_for(primary.id)
            .map_err(storage_err)?
            .iter()
            .map(|a| name_key(&a.alias))
            .collect();
        known.insert(name_key(&primary.name));

        Ok(duplicates
            .iter()
            .filter(|d| known.insert(name_key(&d.name)))
            .map(|d| Alias::new(primary.id, primary.kind, d.name.clone()))
            .collect())
    }

    fn apply_plan(&self, plan: MergePlan, changed_fields: Vec<String>) -> LoreResult<MergeOutcome> {
        plan.validate()?;
        let record = self.store.apply_merge(&plan).map_err(|e| {
            let err = merge_err(&plan, e);
            warn!(
                kind = %plan.kind,
                primary = %plan.primary.id,
                partially_applied = err.partially_applied(),
                error = %err,
                "merge failed"
            );
            err
        })?;

        info!(
            kind = %plan.kind,
            primary = %plan.primary.id,
            consumed = plan.duplicates.len(),
            relationships = record.repointed.relationships,
            events = record.repointed.events,
            pruned = record.repointed.pruned_relationships.len(),
            "merge completed"
        );

        Ok(MergeOutcome {
            aliases_added: plan.new_aliases.iter().map(|a| a.alias.clone()).collect(),
            primary: plan.primary,
            consumed: plan.duplicates,
            changed_fields,
            record,
        })
    }
}

pub(crate) fn storage_err(err: StorageError) -> LoreError {
    LoreError::Execution(ExecutionError::Storage {
        message: err.to_string(),
    })
}

fn merge_err(plan: &MergePlan, err: StorageError) -> LoreError {
    let kind = plan.kind;
    match err {
        StorageError::EntityNotFound(id) => ExecutionError::EntityNotFound { kind, id }.into(),
        StorageError::StaleVersion { id, .. } => ExecutionError::Conflict { kind, id }.into(),
        StorageError::MergeStepFailed { step, completed, source } => ExecutionError::MergeFailed {
            kind,
            primary: plan.primary.id,
            step,
            partially_applied: !completed.is_empty(),
            reason: source.to_string(),
        }
        .into(),
        other => storage_err(other),
    }
}
