//! In-memory storage backend.
//!
//! A thread-safe [`StoryStore`](super::StoryStore) over a [`StoryState`]
//! guarded by an `RwLock`. It is intended for embedded usage, tests, and as
//! the state layer of the durable backend.

use std::sync::RwLock;

use super::backend::StateBackend;
use super::state::{Applied, Mutation, StoryState};
use super::traits::StorageError;

pub(crate) fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// In-memory story store.
#[derive(Debug, Default)]
pub struct InMemoryStoryStore {
    state: RwLock<StoryState>,
}

impl InMemoryStoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `mutation`, runs `before_apply`, then applies it, all under
    /// one write lock. An error from either step leaves the state unchanged.
    pub(crate) fn mutate_with<F>(&self, mutation: Mutation, before_apply: F) -> Result<Applied, StorageError>
    where
        F: FnOnce(&Mutation) -> Result<(), StorageError>,
    {
        let mut state = self.state.write().map_err(|_| lock_err("story.mutate"))?;
        state.validate(&mutation)?;
        before_apply(&mutation)?;
        state.apply(mutation)
    }
}

impl StateBackend for InMemoryStoryStore {
    fn read_state<R>(&self, context: &'static str, f: impl FnOnce(&StoryState) -> R) -> Result<R, StorageError> {
        let state = self.state.read().map_err(|_| lock_err(context))?;
        Ok(f(&state))
    }

    fn submit(&self, mutation: Mutation) -> Result<Applied, StorageError> {
        self.mutate_with(mutation, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ConsumedEntity;
    use crate::entity::{fields, Alias, EntityId, EntityKind, NamedEntity};
    use crate::event::Event;
    use crate::merge::MergePlan;
    use crate::relationship::Relationship;
    use crate::storage::StoryStore;
    use chrono::Utc;

    fn character(store: &InMemoryStoryStore, name: &str) -> NamedEntity {
        let e = NamedEntity::new(EntityKind::Character, name);
        store.insert_entity(e.clone()).unwrap();
        e
    }

    fn plan_for(primary: &NamedEntity, duplicates: &[&NamedEntity]) -> MergePlan {
        let mut merged = primary.clone();
        merged.touch();
        MergePlan {
            record_id: crate::audit::MergeRecordId::new(),
            kind: primary.kind,
            expected_version: primary.version,
            primary: merged,
            duplicates: duplicates
                .iter()
                .map(|d| ConsumedEntity {
                    id: d.id,
                    name: d.name.clone(),
                })
                .collect(),
            new_aliases: Vec::new(),
            merged_at: Utc::now(),
        }
    }

    #[test]
    fn entity_insert_get_update_delete_and_name_lookup() {
        let store = InMemoryStoryStore::new();
        let mut e = character(&store, "Mara Voss");

        assert!(matches!(store.insert_entity(e.clone()), Err(StorageError::DuplicateKey(_))));
        assert_eq!(store.get_entity(e.id).unwrap().unwrap().name, "Mara Voss");

        let found = store.find_entity_by_name(EntityKind::Character, "  mara voss ").unwrap();
        assert_eq!(found.map(|f| f.id), Some(e.id));
        assert!(store.find_entity_by_name(EntityKind::Location, "Mara Voss").unwrap().is_none());

        e.set_field(fields::ROLE, Some("smuggler".to_string()));
        store.update_entity(e.clone()).unwrap();
        assert_eq!(store.get_entity(e.id).unwrap().unwrap().field(fields::ROLE), Some("smuggler"));

        assert_eq!(store.delete_entities(&[e.id, EntityId::new()]).unwrap(), 1);
        assert!(store.get_entity(e.id).unwrap().is_none());
        assert_eq!(store.delete_entities(&[e.id]).unwrap(), 0);
        assert!(matches!(store.update_entity(e), Err(StorageError::EntityNotFound(_))));
    }

    #[test]
    fn blank_names_are_rejected() {
        let store = InMemoryStoryStore::new();
        let err = store
            .insert_entity(NamedEntity::new(EntityKind::Character, "   "))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }

    #[test]
    fn event_location_must_be_a_location() {
        let store = InMemoryStoryStore::new();
        let mara = character(&store, "Mara");
        let err = store
            .insert_event(Event::new("The heist").with_location(mara.id))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
        assert!(store.list_events().unwrap().is_empty());
    }

    #[test]
    fn alias_usage_is_counted() {
        let store = InMemoryStoryStore::new();
        let mara = character(&store, "Mara");
        let alias = Alias::new(mara.id, EntityKind::Character, "The Fox");
        store.insert_alias(alias.clone()).unwrap();
        store.record_alias_use(alias.id).unwrap();
        store.record_alias_use(alias.id).unwrap();

        let aliases = store.aliases_for(mara.id).unwrap();
        assert_eq!(aliases[0].usage_count, 2);
    }

    #[test]
    fn atomic_merge_applies_every_step() {
        let store = InMemoryStoryStore::new();
        let p = character(&store, "Elena");
        let d = character(&store, "Elena Marsh");
        let other = character(&store, "Dorian");
        store.insert_relationship(Relationship::new(d.id, other.id, "rival")).unwrap();
        store.insert_relationship(Relationship::new(p.id, d.id, "alter ego")).unwrap();
        store.insert_alias(Alias::new(d.id, EntityKind::Character, "Marsh")).unwrap();

        let plan = plan_for(&p, &[&d]);
        let record = store.apply_merge(&plan).unwrap();

        assert_eq!(record.primary_id, p.id);
        assert!(record.consumed_id(d.id));
        assert_eq!(record.repointed.relationships, 1);
        assert_eq!(record.repointed.aliases, 1);
        assert_eq!(record.repointed.pruned_relationships.len(), 1);

        assert!(store.get_entity(d.id).unwrap().is_none());
        assert_eq!(store.get_entity(p.id).unwrap().unwrap().version, 2);
        let rels = store.list_relationships().unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].character_1, p.id);
        assert_eq!(store.aliases_for(p.id).unwrap().len(), 1);
        assert_eq!(store.list_merge_records().unwrap(), vec![record]);
    }

    #[test]
    fn stale_merge_changes_nothing() {
        let store = InMemoryStoryStore::new();
        let p = character(&store, "Elena");
        let d = character(&store, "Elena Marsh");
        let plan = plan_for(&p, &[&d]);

        // Someone edits the primary after the plan was built.
        let mut edited = p.clone();
        edited.set_field(fields::NOTES, Some("edited".to_string()));
        store.update_entity(edited).unwrap();

        let err = store.apply_merge(&plan).unwrap_err();
        assert!(matches!(err, StorageError::StaleVersion { expected: 1, actual: 2, .. }));
        assert!(store.get_entity(d.id).unwrap().is_some());
        assert!(store.list_merge_records().unwrap().is_empty());
    }

    #[test]
    fn merge_with_missing_duplicate_changes_nothing() {
        let store = InMemoryStoryStore::new();
        let p = character(&store, "Elena");
        let d = character(&store, "Elena Marsh");
        let plan = plan_for(&p, &[&d]);
        store.delete_entities(&[d.id]).unwrap();

        let err = store.apply_merge(&plan).unwrap_err();
        assert!(matches!(err, StorageError::EntityNotFound(id) if id == d.id));
        assert_eq!(store.get_entity(p.id).unwrap().unwrap().version, 1);
    }
}
