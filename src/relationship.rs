//! Relationships between two characters.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::id::uuid_id;

uuid_id!(
    /// Identifier of a relationship row.
    RelationshipId
);

/// A typed link between exactly two characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship identifier.
    pub id: RelationshipId,
    /// First character.
    pub character_1: EntityId,
    /// Second character.
    pub character_2: EntityId,

    /// Free-text type such as "sibling" or "rival".
    pub relationship_type: String,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the relationship was recorded.
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Creates a new relationship between two characters.
    #[must_use]
    pub fn new(
        character_1: EntityId,
        character_2: EntityId,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            id: RelationshipId::new(),
            character_1,
            character_2,
            relationship_type: relationship_type.into().trim().to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    /// Returns true if either endpoint is `id`.
    #[must_use]
    pub fn references(&self, id: EntityId) -> bool {
        self.character_1 == id || self.character_2 == id
    }

    /// Returns true if both endpoints are the same entity.
    #[must_use]
    pub fn is_self_referential(&self) -> bool {
        self.character_1 == self.character_2
    }

    /// Points every endpoint found in `from` at `to`. Returns true if anything changed.
    pub fn repoint(&mut self, from: &HashSet<EntityId>, to: EntityId) -> bool {
        let mut changed = false;
        if from.contains(&self.character_1) {
            self.character_1 = to;
            changed = true;
        }
        if from.contains(&self.character_2) {
            self.character_2 = to;
            changed = true;
        }
        changed
    }
}
