//! Abstract storage trait for lorekeeper.
//!
//! [`StoryStore`] is the persistence collaborator: point lookups by id,
//! filtered lists by kind, bulk repoints and deletes by id sets, and an
//! append-only merge history. Backends that can apply a whole merge under one
//! lock override [`StoryStore::apply_merge`]; the default implementation runs
//! the merge steps one at a time through the point operations.

use thiserror::Error;

use crate::audit::{MergeRecord, MergeRecordId, RepointCounts};
use crate::entity::{Alias, AliasId, EntityId, EntityKind, NamedEntity};
use crate::event::Event;
use crate::merge::{MergePlan, MergeStep};
use crate::relationship::{Relationship, RelationshipId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The stored version moved since the caller read it.
    #[error("Stale version for {id}: expected {expected}, found {actual}")]
    StaleVersion {
        /// The entity.
        id: EntityId,
        /// Version the caller read.
        expected: u64,
        /// Version now stored.
        actual: u64,
    },

    /// A record failed a structural check.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A step of a non-atomic merge failed after `completed` steps were applied.
    #[error("Merge step '{step}' failed: {source}")]
    MergeStepFailed {
        /// The step that failed.
        step: MergeStep,
        /// Steps applied before it.
        completed: Vec<MergeStep>,
        /// The underlying error.
        source: Box<StorageError>,
    },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result of repointing relationship endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipRepoint {
    /// Relationships whose endpoints changed and were kept.
    pub repointed: usize,
    /// Relationships deleted because both endpoints became the same entity.
    pub pruned: Vec<RelationshipId>,
}

/// Storage trait for story data.
///
/// # Safety Considerations
/// - Implementations must handle concurrent access safely
/// - Repoint and delete operations must be idempotent
pub trait StoryStore: Send + Sync {
    /// Insert a new entity. Returns error if the ID already exists.
    fn insert_entity(&self, entity: NamedEntity) -> Result<(), StorageError>;

    /// Get an entity by ID.
    fn get_entity(&self, id: EntityId) -> Result<Option<NamedEntity>, StorageError>;

    /// Replace an existing entity. Returns error if not found.
    fn update_entity(&self, entity: NamedEntity) -> Result<(), StorageError>;

    /// Delete entities by ID. Missing IDs are ignored; returns how many were removed.
    fn delete_entities(&self, ids: &[EntityId]) -> Result<usize, StorageError>;

    /// All entities of a kind, oldest first.
    fn list_entities(&self, kind: EntityKind) -> Result<Vec<NamedEntity>, StorageError>;

    /// First entity of `kind` whose name matches case-insensitively.
    fn find_entity_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>, StorageError>;

    /// Insert an alias. The target entity must exist.
    fn insert_alias(&self, alias: Alias) -> Result<(), StorageError>;

    /// All aliases of a kind, oldest first.
    fn list_aliases(&self, kind: EntityKind) -> Result<Vec<Alias>, StorageError>;

    /// Aliases pointing at one entity.
    fn aliases_for(&self, entity_id: EntityId) -> Result<Vec<Alias>, StorageError>;

    /// Point every alias owned by `from` at `to`. Returns how many moved.
    fn repoint_aliases(&self, from: &[EntityId], to: EntityId) -> Result<usize, StorageError>;

    /// Increment an alias usage counter.
    fn record_alias_use(&self, alias_id: AliasId) -> Result<(), StorageError>;

    /// Insert a relationship. Both endpoints must exist and be characters.
    fn insert_relationship(&self, relationship: Relationship) -> Result<(), StorageError>;

    /// All relationships, oldest first.
    fn list_relationships(&self) -> Result<Vec<Relationship>, StorageError>;

    /// Point relationship endpoints in `from` at `to`, pruning self-relationships.
    fn repoint_relationships(&self, from: &[EntityId], to: EntityId) -> Result<RelationshipRepoint, StorageError>;

    /// Insert an event. A location reference must name an existing location.
    fn insert_event(&self, event: Event) -> Result<(), StorageError>;

    /// All events, oldest first.
    fn list_events(&self) -> Result<Vec<Event>, StorageError>;

    /// Point event locations in `from` at `to`. Returns how many moved.
    fn repoint_event_locations(&self, from: &[EntityId], to: EntityId) -> Result<usize, StorageError>;

    /// Append a merge record. Returns error if the ID already exists.
    fn insert_merge_record(&self, record: MergeRecord) -> Result<(), StorageError>;

    /// Get a merge record by ID.
    fn get_merge_record(&self, id: MergeRecordId) -> Result<Option<MergeRecord>, StorageError>;

    /// All merge records, oldest first.
    fn list_merge_records(&self) -> Result<Vec<MergeRecord>, StorageError>;

    /// Carry out a merge plan and return its audit record.
    ///
    /// The default implementation is not atomic: it runs each [`MergeStep`]
    /// in order and stops at the first failure with
    /// [`StorageError::MergeStepFailed`], naming the steps already applied.
    /// Every step is idempotent, so applying the same plan again finishes it.
    fn apply_merge(&self, plan: &MergePlan) -> Result<MergeRecord, StorageError> {
        plan.validate().map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
        let mut completed = Vec::with_capacity(MergeStep::ALL.len());

        self.update_entity(plan.primary.clone())
            .map_err(|e| step_failed(MergeStep::PersistPrimary, &completed, e))?;
        completed.push(MergeStep::PersistPrimary);

        let repointed = repoint_references(self, plan)
            .map_err(|e| step_failed(MergeStep::RepointReferences, &completed, e))?;
        completed.push(MergeStep::RepointReferences);

        let record = append_audit(self, plan, repointed)
            .map_err(|e| step_failed(MergeStep::AppendAudit, &completed, e))?;
        completed.push(MergeStep::AppendAudit);

        self.delete_entities(&plan.duplicate_ids())
            .map_err(|e| step_failed(MergeStep::DeleteDuplicates, &completed, e))?;

        Ok(record)
    }
}

fn step_failed(step: MergeStep, completed: &[MergeStep], source: StorageError) -> StorageError {
    StorageError::MergeStepFailed {
        step,
        completed: completed.to_vec(),
        source: Box::new(source),
    }
}

fn repoint_references<S: StoryStore + ?Sized>(store: &S, plan: &MergePlan) -> Result<RepointCounts, StorageError> {
    let duplicates = plan.duplicate_ids();
    let primary = plan.primary.id;

    let relationships = store.repoint_relationships(&duplicates, primary)?;
    let events = store.repoint_event_locations(&duplicates, primary)?;
    let aliases = store.repoint_aliases(&duplicates, primary)?;

    for alias in &plan.new_aliases {
        match store.insert_alias(alias.clone()) {
            Ok(()) | Err(StorageError::DuplicateKey(_)) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(RepointCounts {
        relationships: relationships.repointed,
        events,
        aliases,
        pruned_relationships: relationships.pruned,
    })
}

fn append_audit<S: StoryStore + ?Sized>(
    store: &S,
    plan: &MergePlan,
    repointed: RepointCounts,
) -> Result<MergeRecord, StorageError> {
    let record = plan
        .record(repointed)
        .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;

    match store.insert_merge_record(record.clone()) {
        Ok(()) => Ok(record),
        // A retry of a plan whose audit step already landed keeps the original counts.
        Err(StorageError::DuplicateKey(_)) => store
            .get_merge_record(plan.record_id)?
            .ok_or_else(|| StorageError::BackendError(format!("merge record {} vanished", plan.record_id))),
        Err(e) => Err(e),
    }
}
