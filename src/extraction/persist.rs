//! Item-by-item persistence of extracted entities.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::entity::{EntityId, EntityKind, NamedEntity};
use crate::error::ValidationError;
use crate::event::Event;
use crate::relationship::Relationship;
use crate::similarity::name_key;
use crate::storage::{StorageError, StoryStore};

use super::{EntityCandidate, EventCandidate, ExtractedEntities, RelationshipCandidate};

/// The kind of item a persistence failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// An extracted character.
    Character,
    /// An extracted location.
    Location,
    /// An extracted event.
    Event,
    /// An extracted relationship.
    Relationship,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Event => "event",
            Self::Relationship => "relationship",
        })
    }
}

/// One item that could not be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// What kind of item failed.
    pub category: ItemCategory,
    /// Name, title, or "a -> b" for relationships.
    pub label: String,
    /// Why it failed.
    pub reason: String,
}

/// What [`persist_extracted`] saved and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Characters inserted.
    pub characters_saved: usize,
    /// Locations inserted.
    pub locations_saved: usize,
    /// Events inserted.
    pub events_saved: usize,
    /// Relationships inserted.
    pub relationships_saved: usize,
    /// Items that could not be saved.
    pub failures: Vec<ItemFailure>,
}

impl PersistReport {
    /// Total items saved.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.characters_saved + self.locations_saved + self.events_saved + self.relationships_saved
    }
}

/// Saves every extracted item independently.
///
/// Characters and locations are inserted first so relationships and events
/// can refer to them. Names resolve case-insensitively against entities saved
/// in this pass, then canonical names in the store, then aliases. A failure
/// on one item is recorded and the rest continue.
pub fn persist_extracted(store: &dyn StoryStore, entities: &ExtractedEntities) -> PersistReport {
    let mut persister = Persister {
        store,
        saved: HashMap::new(),
        report: PersistReport::default(),
    };

    for candidate in &entities.characters {
        persister.save_entity(EntityKind::Character, candidate);
    }
    for candidate in &entities.locations {
        persister.save_entity(EntityKind::Location, candidate);
    }
    for candidate in &entities.events {
        persister.save_event(candidate);
    }
    for candidate in &entities.relationships {
        persister.save_relationship(candidate);
    }

    persister.report
}

struct Persister<'a> {
    store: &'a dyn StoryStore,
    saved: HashMap<(EntityKind, String), EntityId>,
    report: PersistReport,
}

impl Persister<'_> {
    fn save_entity(&mut self, kind: EntityKind, candidate: &EntityCandidate) {
        let category = match kind {
            EntityKind::Character => ItemCategory::Character,
            EntityKind::Location => ItemCategory::Location,
        };

        if candidate.name.trim().is_empty() {
            return self.fail(category, &candidate.name, ValidationError::EmptyEntityName.to_string());
        }

        let entity = candidate
            .fields
            .iter()
            .fold(NamedEntity::new(kind, candidate.name.as_str()), |e, (field, value)| {
                e.with_field(field.as_str(), value.as_str())
            });
        let id = entity.id;

        match self.store.insert_entity(entity) {
            Ok(()) => {
                self.saved.entry((kind, name_key(&candidate.name))).or_insert(id);
                match kind {
                    EntityKind::Character => self.report.characters_saved += 1,
                    EntityKind::Location => self.report.locations_saved += 1,
                }
            }
            Err(e) => self.fail(category, &candidate.name, e.to_string()),
        }
    }

    fn save_event(&mut self, candidate: &EventCandidate) {
        let mut event = Event::new(candidate.title.as_str()).with_participants(candidate.participants.clone());
        if let Some(description) = &candidate.description {
            event = event.with_description(description.as_str());
        }

        // An unknown location is left unset rather than failing the event.
        if let Some(location) = &candidate.location {
            match self.resolve(EntityKind::Location, location) {
                Ok(Some(id)) => event = event.with_location(id),
                Ok(None) => {}
                Err(e) => return self.fail(ItemCategory::Event, &candidate.title, e.to_string()),
            }
        }

        match self.store.insert_event(event) {
            Ok(()) => self.report.events_saved += 1,
            Err(e) => self.fail(ItemCategory::Event, &candidate.title, e.to_string()),
        }
    }

    fn save_relationship(&mut self, candidate: &RelationshipCandidate) {
        let label = format!("{} -> {}", candidate.character_1, candidate.character_2);

        let endpoints = self
            .endpoint(&candidate.character_1)
            .and_then(|a| self.endpoint(&candidate.character_2).map(|b| (a, b)));
        let (character_1, character_2) = match endpoints {
            Ok(ids) => ids,
            Err(reason) => return self.fail(ItemCategory::Relationship, &label, reason),
        };
        if character_1 == character_2 {
            let reason = format!("'{}' cannot be related to itself", candidate.character_1);
            return self.fail(ItemCategory::Relationship, &label, reason);
        }

        let mut relationship = Relationship::new(character_1, character_2, candidate.relationship_type.as_str());
        if let Some(description) = &candidate.description {
            relationship = relationship.with_description(description.as_str());
        }

        match self.store.insert_relationship(relationship) {
            Ok(()) => self.report.relationships_saved += 1,
            Err(e) => self.fail(ItemCategory::Relationship, &label, e.to_string()),
        }
    }

    fn endpoint(&self, name: &str) -> Result<EntityId, String> {
        match self.resolve(EntityKind::Character, name) {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(format!("unknown character '{name}'")),
            Err(e) => Err(e.to_string()),
        }
    }

    fn resolve(&self, kind: EntityKind, name: &str) -> Result<Option<EntityId>, StorageError> {
        let key = name_key(name);
        if let Some(id) = self.saved.get(&(kind, key.clone())) {
            return Ok(Some(*id));
        }
        if let Some(entity) = self.store.find_entity_by_name(kind, name)? {
            return Ok(Some(entity.id));
        }

        let alias = self
            .store
            .list_aliases(kind)?
            .into_iter()
            .find(|a| name_key(&a.alias) == key);
        match alias {
            Some(alias) => {
                self.store.record_alias_use(alias.id)?;
                Ok(Some(alias.entity_id))
            }
            None => Ok(None),
        }
    }

    fn fail(&mut self, category: ItemCategory, label: &str, reason: String) {
        warn!(%category, item = label, %reason, "failed to persist extracted item");
        self.report.failures.push(ItemFailure {
            category,
            label: label.to_string(),
            reason,
        });
    }
}
