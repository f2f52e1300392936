//! Shared [`StoryStore`] implementation for state-backed stores.
//!
//! Both bundled backends keep a [`StoryState`] behind a lock and differ only
//! in what happens between validating and applying a mutation. They implement
//! [`StateBackend`] and get the full store API, including an atomic
//! `apply_merge`, from the blanket impl below.

use crate::audit::{MergeRecord, MergeRecordId};
use crate::entity::{Alias, AliasId, EntityId, EntityKind, NamedEntity};
use crate::event::Event;
use crate::merge::MergePlan;
use crate::relationship::Relationship;

use super::state::{Applied, Mutation, StoryState};
use super::traits::{RelationshipRepoint, StorageError, StoryStore};

pub trait StateBackend: Send + Sync {
    /// Runs `f` against a read view of the state.
    fn read_state<R>(&self, context: &'static str, f: impl FnOnce(&StoryState) -> R) -> Result<R, StorageError>;

    /// Validates and applies one mutation.
    fn submit(&self, mutation: Mutation) -> Result<Applied, StorageError>;
}

fn unexpected(context: &'static str, applied: &Applied) -> StorageError {
    StorageError::BackendError(format!("unexpected mutation result for {context}: {applied:?}"))
}

fn expect_done(context: &'static str, applied: Applied) -> Result<(), StorageError> {
    match applied {
        Applied::Done => Ok(()),
        other => Err(unexpected(context, &other)),
    }
}

fn expect_count(context: &'static str, applied: Applied) -> Result<usize, StorageError> {
    match applied {
        Applied::Count(n) => Ok(n),
        other => Err(unexpected(context, &other)),
    }
}

impl<B: StateBackend> StoryStore for B {
    fn insert_entity(&self, entity: NamedEntity) -> Result<(), StorageError> {
        expect_done("entity.insert", self.submit(Mutation::InsertEntity(entity))?)
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<NamedEntity>, StorageError> {
        self.read_state("entity.get", |s| s.entity(id).cloned())
    }

    fn update_entity(&self, entity: NamedEntity) -> Result<(), StorageError> {
        expect_done("entity.update", self.submit(Mutation::UpdateEntity(entity))?)
    }

    fn delete_entities(&self, ids: &[EntityId]) -> Result<usize, StorageError> {
        expect_count("entity.delete", self.submit(Mutation::DeleteEntities(ids.to_vec()))?)
    }

    fn list_entities(&self, kind: EntityKind) -> Result<Vec<NamedEntity>, StorageError> {
        self.read_state("entity.list", |s| s.entities(kind).cloned().collect())
    }

    fn find_entity_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<NamedEntity>, StorageError> {
        self.read_state("entity.find_by_name", |s| s.entity_by_name(kind, name).cloned())
    }

    fn insert_alias(&self, alias: Alias) -> Result<(), StorageError> {
        expect_done("alias.insert", self.submit(Mutation::InsertAlias(alias))?)
    }

    fn list_aliases(&self, kind: EntityKind) -> Result<Vec<Alias>, StorageError> {
        self.read_state("alias.list", |s| s.aliases().filter(|a| a.kind == kind).cloned().collect())
    }

    fn aliases_for(&self, entity_id: EntityId) -> Result<Vec<Alias>, StorageError> {
        self.read_state("alias.for_entity", |s| {
            s.aliases().filter(|a| a.entity_id == entity_id).cloned().collect()
        })
    }

    fn repoint_aliases(&self, from: &[EntityId], to: EntityId) -> Result<usize, StorageError> {
        let mutation = Mutation::RepointAliases { from: from.to_vec(), to };
        expect_count("alias.repoint", self.submit(mutation)?)
    }

    fn record_alias_use(&self, alias_id: AliasId) -> Result<(), StorageError> {
        expect_done("alias.record_use", self.submit(Mutation::RecordAliasUse(alias_id))?)
    }

    fn insert_relationship(&self, relationship: Relationship) -> Result<(), StorageError> {
        expect_done("relationship.insert", self.submit(Mutation::InsertRelationship(relationship))?)
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>, StorageError> {
        self.read_state("relationship.list", |s| s.relationships().cloned().collect())
    }

    fn repoint_relationships(&self, from: &[EntityId], to: EntityId) -> Result<RelationshipRepoint, StorageError> {
        let mutation = Mutation::RepointRelationships { from: from.to_vec(), to };
        match self.submit(mutation)? {
            Applied::Relationships(outcome) => Ok(outcome),
            other => Err(unexpected("relationship.repoint", &other)),
        }
    }

    fn insert_event(&self, event: Event) -> Result<(), StorageError> {
        expect_done("event.insert", self.submit(Mutation::InsertEvent(event))?)
    }

    fn list_events(&self) -> Result<Vec<Event>, StorageError> {
        self.read_state("event.list", |s| s.events().cloned().collect())
    }

    fn repoint_event_locations(&self, from: &[EntityId], to: EntityId) -> Result<usize, StorageError> {
        let mutation = Mutation::RepointEventLocations { from: from.to_vec(), to };
        expect_count("event.repoint", self.submit(mutation)?)
    }

    fn insert_merge_record(&self, record: MergeRecord) -> Result<(), StorageError> {
        expect_done("merge_record.insert", self.submit(Mutation::InsertMergeRecord(record))?)
    }

    fn get_merge_record(&self, id: MergeRecordId) -> Result<Option<MergeRecord>, StorageError> {
        self.read_state("merge_record.get", |s| s.merge_record(id).cloned())
    }

    fn list_merge_records(&self) -> Result<Vec<MergeRecord>, StorageError> {
        self.read_state("merge_record.list", |s| s.merge_records().cloned().collect())
    }

    /// Applies the whole plan under one write lock. A stale or invalid plan
    /// changes nothing.
    fn apply_merge(&self, plan: &MergePlan) -> Result<MergeRecord, StorageError> {
        match self.submit(Mutation::ApplyMerge(plan.clone()))? {
            Applied::Merged(record) => Ok(record),
            other => Err(unexpected("merge.apply", &other)),
        }
    }
}
