//! Story state and the mutations that change it.
//!
//! Every write is expressed as a [`Mutation`]. A backend validates the
//! mutation against the current state, optionally logs it, and then applies
//! it. Apply is deterministic, so replaying a log of validated mutations
//! rebuilds the same state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::audit::{MergeRecord, MergeRecordId, RepointCounts};
use crate::entity::{Alias, AliasId, EntityId, EntityKind, NamedEntity};
use crate::error::ValidationError;
use crate::event::{Event, EventId};
use crate::merge::MergePlan;
use crate::relationship::{Relationship, RelationshipId};
use crate::similarity::name_key;

use super::traits::{RelationshipRepoint, StorageError};

/// A single state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum Mutation {
    InsertEntity(NamedEntity),
    UpdateEntity(NamedEntity),
    DeleteEntities(Vec<EntityId>),
    InsertAlias(Alias),
    RepointAliases { from: Vec<EntityId>, to: EntityId },
    RecordAliasUse(AliasId),
    InsertRelationship(Relationship),
    RepointRelationships { from: Vec<EntityId>, to: EntityId },
    InsertEvent(Event),
    RepointEventLocations { from: Vec<EntityId>, to: EntityId },
    InsertMergeRecord(MergeRecord),
    ApplyMerge(MergePlan),
}

/// What applying a mutation produced.
#[derive(Debug, Clone)]
pub enum Applied {
    Done,
    Count(usize),
    Relationships(RelationshipRepoint),
    Merged(MergeRecord),
}

/// Insertion-ordered table keyed by id.
#[derive(Debug)]
struct Table<K, V> {
    next_seq: u64,
    rows: BTreeMap<u64, V>,
    index: HashMap<K, u64>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            rows: BTreeMap::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy, V> Table<K, V> {
    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).and_then(|seq| self.rows.get(seq))
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let seq = self.index.get(key)?;
        self.rows.get_mut(seq)
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(existing) = self.get_mut(&key) {
            *existing = value;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(seq, value);
        self.index.insert(key, seq);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let seq = self.index.remove(key)?;
        self.rows.remove(&seq)
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values()
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.rows.values_mut()
    }
}

/// All story data held by a backend.
#[derive(Debug, Default)]
pub struct StoryState {
    entities: Table<EntityId, NamedEntity>,
    aliases: Table<AliasId, Alias>,
    relationships: Table<RelationshipId, Relationship>,
    events: Table<EventId, Event>,
    merge_records: Table<MergeRecordId, MergeRecord>,
}

impl StoryState {
    pub(crate) fn entity(&self, id: EntityId) -> Option<&NamedEntity> {
        self.entities.get(&id)
    }

    pub(crate) fn entities(&self, kind: EntityKind) -> impl Iterator<Item = &NamedEntity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    pub(crate) fn entity_by_name(&self, kind: EntityKind, name: &str) -> Option<&NamedEntity> {
        let key = name_key(name);
        self.entities(kind).find(|e| name_key(&e.name) == key)
    }

    pub(crate) fn aliases(&self) -> impl Iterator<Item = &Alias> {
        self.aliases.values()
    }

    pub(crate) fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub(crate) fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub(crate) fn merge_record(&self, id: MergeRecordId) -> Option<&MergeRecord> {
        self.merge_records.get(&id)
    }

    pub(crate) fn merge_records(&self) -> impl Iterator<Item = &MergeRecord> {
        self.merge_records.values()
    }

    /// Checks that `mutation` can be applied to the current state.
    pub fn validate(&self, mutation: &Mutation) -> Result<(), StorageError> {
        match mutation {
            Mutation::InsertEntity(entity) => {
                if self.entities.contains(&entity.id) {
                    return Err(StorageError::DuplicateKey(format!("entity {}", entity.id)));
                }
                require_entity_name(&entity.name)
            }
            Mutation::UpdateEntity(entity) => {
                let stored = self.require_entity(entity.id)?;
                if stored.kind != entity.kind {
                    return Err(StorageError::InvalidRecord(format!(
                        "entity {} cannot change kind from {} to {}",
                        entity.id, stored.kind, entity.kind
                    )));
                }
                require_entity_name(&entity.name)
            }
            Mutation::DeleteEntities(_) => Ok(()),
            Mutation::InsertAlias(alias) => {
                if self.aliases.contains(&alias.id) {
                    return Err(StorageError::DuplicateKey(format!("alias {}", alias.id)));
                }
                self.require_kind(alias.entity_id, alias.kind)?;
                require_name(&alias.alias, "alias")
            }
            Mutation::RepointAliases { to, .. }
            | Mutation::RepointRelationships { to, .. }
            | Mutation::RepointEventLocations { to, .. } => self.require_entity(*to).map(|_| ()),
            Mutation::RecordAliasUse(id) => {
                if self.aliases.contains(id) {
                    Ok(())
                } else {
                    Err(StorageError::InvalidRecord(format!("alias not found: {id}")))
                }
            }
            Mutation::InsertRelationship(rel) => {
                if self.relationships.contains(&rel.id) {
                    return Err(StorageError::DuplicateKey(format!("relationship {}", rel.id)));
                }
                if rel.is_self_referential() {
                    return Err(StorageError::InvalidRecord(format!(
                        "relationship {} links {} to itself",
                        rel.id, rel.character_1
                    )));
                }
                self.require_kind(rel.character_1, EntityKind::Character)?;
                self.require_kind(rel.character_2, EntityKind::Character)?;
                Ok(())
            }
            Mutation::InsertEvent(event) => {
                if self.events.contains(&event.id) {
                    return Err(StorageError::DuplicateKey(format!("event {}", event.id)));
                }
                if let Some(location) = event.location_id {
                    self.require_kind(location, EntityKind::Location)?;
                }
                require_name(&event.title, "event title")
            }
            Mutation::InsertMergeRecord(record) => {
                if self.merge_records.contains(&record.id) {
                    return Err(StorageError::DuplicateKey(format!("merge record {}", record.id)));
                }
                Ok(())
            }
            Mutation::ApplyMerge(plan) => self.validate_merge(plan),
        }
    }

    fn validate_merge(&self, plan: &MergePlan) -> Result<(), StorageError> {
        let stored = self.require_kind(plan.primary.id, plan.kind)?;
        if stored.version != plan.expected_version {
            return Err(StorageError::StaleVersion {
                id: stored.id,
                expected: plan.expected_version,
                actual: stored.version,
            });
        }
        if plan.primary.kind != plan.kind {
            return Err(StorageError::InvalidRecord(format!(
                "merged primary is a {}, plan is for {}",
                plan.primary.kind, plan.kind
            )));
        }
        require_entity_name(&plan.primary.name)?;

        for dup in &plan.duplicates {
            self.require_kind(dup.id, plan.kind)?;
        }
        for alias in &plan.new_aliases {
            if alias.entity_id != plan.primary.id {
                return Err(StorageError::InvalidRecord(format!(
                    "alias '{}' does not point at the merge primary",
                    alias.alias
                )));
            }
            if self.aliases.contains(&alias.id) {
                return Err(StorageError::DuplicateKey(format!("alias {}", alias.id)));
            }
        }
        if self.merge_records.contains(&plan.record_id) {
            return Err(StorageError::DuplicateKey(format!("merge record {}", plan.record_id)));
        }
        plan.validate().map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }

    fn require_entity(&self, id: EntityId) -> Result<&NamedEntity, StorageError> {
        self.entities.get(&id).ok_or(StorageError::EntityNotFound(id))
    }

    fn require_kind(&self, id: EntityId, kind: EntityKind) -> Result<&NamedEntity, StorageError> {
        let entity = self.require_entity(id)?;
        if entity.kind == kind {
            Ok(entity)
        } else {
            Err(StorageError::InvalidRecord(format!(
                "{id} is a {}, expected a {kind}",
                entity.kind
            )))
        }
    }

    /// Applies a mutation that has passed [`StoryState::validate`].
    pub fn apply(&mut self, mutation: Mutation) -> Result<Applied, StorageError> {
        let applied = match mutation {
            Mutation::InsertEntity(entity) | Mutation::UpdateEntity(entity) => {
                self.entities.insert(entity.id, entity);
                Applied::Done
            }
            Mutation::DeleteEntities(ids) => Applied::Count(self.delete_entities(&ids)),
            Mutation::InsertAlias(alias) => {
                self.aliases.insert(alias.id, alias);
                Applied::Done
            }
            Mutation::RepointAliases { from, to } => Applied::Count(self.repoint_aliases(&to_set(&from), to)),
            Mutation::RecordAliasUse(id) => {
                if let Some(alias) = self.aliases.get_mut(&id) {
                    alias.usage_count = alias.usage_count.saturating_add(1);
                }
                Applied::Done
            }
            Mutation::InsertRelationship(rel) => {
                self.relationships.insert(rel.id, rel);
                Applied::Done
            }
            Mutation::RepointRelationships { from, to } => {
                Applied::Relationships(self.repoint_relationships(&to_set(&from), to))
            }
            Mutation::InsertEvent(event) => {
                self.events.insert(event.id, event);
                Applied::Done
            }
            Mutation::RepointEventLocations { from, to } => {
                Applied::Count(self.repoint_event_locations(&to_set(&from), to))
            }
            Mutation::InsertMergeRecord(record) => {
                self.merge_records.insert(record.id, record);
                Applied::Done
            }
            Mutation::ApplyMerge(plan) => Applied::Merged(self.apply_merge(plan)?),
        };
        Ok(applied)
    }

    fn apply_merge(&mut self, plan: MergePlan) -> Result<MergeRecord, StorageError> {
        let duplicates = plan.duplicate_set();
        let primary_id = plan.primary.id;

        self.entities.insert(primary_id, plan.primary.clone());

        let relationships = self.repoint_relationships(&duplicates, primary_id);
        let events = self.repoint_event_locations(&duplicates, primary_id);
        let aliases = self.repoint_aliases(&duplicates, primary_id);
        for alias in &plan.new_aliases {
            self.aliases.insert(alias.id, alias.clone());
        }

        let record = plan
            .record(RepointCounts {
                relationships: relationships.repointed,
                events,
                aliases,
                pruned_relationships: relationships.pruned,
            })
            .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
        self.merge_records.insert(record.id, record.clone());

        self.delete_entities(&plan.duplicate_ids());
        Ok(record)
    }

    fn delete_entities(&mut self, ids: &[EntityId]) -> usize {
        ids.iter().filter(|id| self.entities.remove(id).is_some()).count()
    }

    fn repoint_aliases(&mut self, from: &HashSet<EntityId>, to: EntityId) -> usize {
        let mut moved = 0;
        for alias in self.aliases.values_mut() {
            if from.contains(&alias.entity_id) {
                alias.entity_id = to;
                moved += 1;
            }
        }
        moved
    }

    fn repoint_relationships(&mut self, from: &HashSet<EntityId>, to: EntityId) -> RelationshipRepoint {
        let mut outcome = RelationshipRepoint::default();
        for rel in self.relationships.values_mut() {
            if rel.repoint(from, to) {
                if rel.is_self_referential() {
                    outcome.pruned.push(rel.id);
                } else {
                    outcome.repointed += 1;
                }
            }
        }
        for id in &outcome.pruned {
            self.relationships.remove(id);
        }
        outcome
    }

    fn repoint_event_locations(&mut self, from: &HashSet<EntityId>, to: EntityId) -> usize {
        let mut moved = 0;
        for event in self.events.values_mut() {
            if event.location_id.is_some_and(|loc| from.contains(&loc)) {
                event.location_id = Some(to);
                moved += 1;
            }
        }
        moved
    }
}

fn to_set(ids: &[EntityId]) -> HashSet<EntityId> {
    ids.iter().copied().collect()
}

fn require_entity_name(name: &str) -> Result<(), StorageError> {
    if name.trim().is_empty() {
        Err(StorageError::InvalidRecord(ValidationError::EmptyEntityName.to_string()))
    } else {
        Ok(())
    }
}

fn require_name(value: &str, what: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        Err(StorageError::InvalidRecord(format!("{what} cannot be empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: &mut StoryState, mutation: Mutation) -> Applied {
        state.validate(&mutation).unwrap();
        state.apply(mutation).unwrap()
    }

    #[test]
    fn test_tables_keep_insertion_order() {
        let mut state = StoryState::default();
        for name in ["Mara", "Dorian", "Elena"] {
            apply(&mut state, Mutation::InsertEntity(NamedEntity::new(EntityKind::Character, name)));
        }
        let names: Vec<&str> = state.entities(EntityKind::Character).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Mara", "Dorian", "Elena"]);
    }

    #[test]
    fn test_update_keeps_position() {
        let mut state = StoryState::default();
        let mut first = NamedEntity::new(EntityKind::Character, "Mara");
        apply(&mut state, Mutation::InsertEntity(first.clone()));
        apply(&mut state, Mutation::InsertEntity(NamedEntity::new(EntityKind::Character, "Dorian")));

        first.rename("Mara Voss");
        apply(&mut state, Mutation::UpdateEntity(first));
        let names: Vec<&str> = state.entities(EntityKind::Character).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Mara Voss", "Dorian"]);
    }

    #[test]
    fn test_relationship_endpoints_must_be_characters() {
        let mut state = StoryState::default();
        let mara = NamedEntity::new(EntityKind::Character, "Mara");
        let docks = NamedEntity::new(EntityKind::Location, "Docks");
        apply(&mut state, Mutation::InsertEntity(mara.clone()));
        apply(&mut state, Mutation::InsertEntity(docks.clone()));

        let err = state
            .validate(&Mutation::InsertRelationship(Relationship::new(mara.id, docks.id, "works at")))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));

        let missing = EntityId::new();
        let err = state
            .validate(&Mutation::InsertRelationship(Relationship::new(mara.id, missing, "rival")))
            .unwrap_err();
        assert!(matches!(err, StorageError::EntityNotFound(id) if id == missing));
    }

    #[test]
    fn test_self_relationship_is_rejected() {
        let mut state = StoryState::default();
        let mara = NamedEntity::new(EntityKind::Character, "Mara");
        apply(&mut state, Mutation::InsertEntity(mara.clone()));

        let err = state
            .validate(&Mutation::InsertRelationship(Relationship::new(mara.id, mara.id, "rival")))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(ref msg) if msg.contains("to itself")));
        assert_eq!(state.relationships().count(), 0);
    }

    #[test]
    fn test_blank_entity_name_is_rejected() {
        let state = StoryState::default();
        let err = state
            .validate(&Mutation::InsertEntity(NamedEntity::new(EntityKind::Location, "   ")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid record: {}", ValidationError::EmptyEntityName)
        );
    }

    #[test]
    fn test_repoint_relationships_prunes_self_links() {
        let mut state = StoryState::default();
        let p = NamedEntity::new(EntityKind::Character, "Elena");
        let d = NamedEntity::new(EntityKind::Character, "Elena Marsh");
        let other = NamedEntity::new(EntityKind::Character, "Dorian");
        for e in [&p, &d, &other] {
            apply(&mut state, Mutation::InsertEntity(e.clone()));
        }
        let kept = Relationship::new(d.id, other.id, "rival");
        let pruned = Relationship::new(p.id, d.id, "alter ego");
        apply(&mut state, Mutation::InsertRelationship(kept.clone()));
        apply(&mut state, Mutation::InsertRelationship(pruned.clone()));

        let outcome = state.repoint_relationships(&to_set(&[d.id]), p.id);
        assert_eq!(outcome.repointed, 1);
        assert_eq!(outcome.pruned, vec![pruned.id]);

        let rels: Vec<&Relationship> = state.relationships().collect();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].id, kept.id);
        assert_eq!(rels[0].character_1, p.id);

        let again = state.repoint_relationships(&to_set(&[d.id]), p.id);
        assert_eq!(again, RelationshipRepoint::default());
    }

    #[test]
    fn test_mutations_serialize_with_op_tag() {
        let m = Mutation::DeleteEntities(vec![EntityId::new()]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["op"], "delete_entities");
        let back: Mutation = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Mutation::DeleteEntities(ids) if ids.len() == 1));
    }
}
