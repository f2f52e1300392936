//! Canonical story entities and their aliases.
//!
//! A [`NamedEntity`] is the authoritative record for a character or a
//! location. Descriptive data lives in a flat field map so extraction output
//! and manual edits share one shape; how each field is reconciled during a
//! merge is decided by [`EntityKind::field_policy`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::uuid_id;
use crate::merge::FieldPolicy;

uuid_id!(
    /// Stable, opaque identifier of a canonical entity.
    ///
    /// # Examples
    ///
    /// ```
    /// use lorekeeper::EntityId;
    ///
    /// let id = EntityId::new();
    /// let parsed: EntityId = id.to_string().parse().unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    EntityId
);

uuid_id!(
    /// Identifier of an alias row.
    AliasId
);

/// Well-known descriptive field names.
pub mod fields {
    /// Short description. Longest wins.
    pub const DESCRIPTION: &str = "description";
    /// Personality notes. Longest wins.
    pub const PERSONALITY: &str = "personality";
    /// Background. Longest wins.
    pub const BACKGROUND: &str = "background";
    /// Physical appearance. Longest wins.
    pub const APPEARANCE: &str = "appearance";
    /// Role in the story. Longest wins.
    pub const ROLE: &str = "role";
    /// Goals. Longest wins.
    pub const GOALS: &str = "goals";
    /// Character arc. Longest wins.
    pub const ARC: &str = "arc";
    /// JSON list of traits. Unioned.
    pub const TRAITS: &str = "traits";
    /// Backstory. Concatenated.
    pub const BACKSTORY: &str = "backstory";
    /// Free-form notes. Concatenated.
    pub const NOTES: &str = "notes";

    /// Atmosphere. Longest wins.
    pub const ATMOSPHERE: &str = "atmosphere";
    /// Story significance. Longest wins.
    pub const SIGNIFICANCE: &str = "significance";
    /// History. Longest wins.
    pub const HISTORY: &str = "history";
    /// Geography. Longest wins.
    pub const GEOGRAPHY: &str = "geography";
    /// Culture. Longest wins.
    pub const CULTURE: &str = "culture";
    /// JSON list of notable features. Unioned.
    pub const FEATURES: &str = "features";
    /// JSON list of tags. Unioned.
    pub const TAGS: &str = "tags";
    /// Lore. Concatenated.
    pub const LORE: &str = "lore";
}

/// The kinds of canonical entity that can be merged and aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A person or creature in the story.
    Character,
    /// A place in the story world.
    Location,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 2] = [Self::Character, Self::Location];

    /// How a field of this kind is reconciled when duplicates are merged.
    ///
    /// Fields not listed here keep the longest non-empty value.
    #[must_use]
    pub fn field_policy(self, field: &str) -> FieldPolicy {
        use fields::*;

        match (self, field) {
            (Self::Character, TRAITS | TAGS) => FieldPolicy::Union,
            (Self::Character, BACKSTORY | NOTES) => FieldPolicy::Concatenate,
            (Self::Location, FEATURES | TAGS) => FieldPolicy::Union,
            (Self::Location, LORE | NOTES) => FieldPolicy::Concatenate,
            _ => FieldPolicy::LongestWins,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character => write!(f, "character"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// A canonical character or location.
///
/// # Examples
///
/// ```
/// use lorekeeper::{EntityKind, NamedEntity};
///
/// let elena = NamedEntity::new(EntityKind::Character, "Elena")
///     .with_field("description", "A cartographer from the northern coast");
/// assert_eq!(elena.field("description"), Some("A cartographer from the northern coast"));
/// assert_eq!(elena.version, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedEntity {
    /// Stable identifier.
    pub id: EntityId,

    /// Character or location.
    pub kind: EntityKind,

    /// Display and matching key.
    pub name: String,

    /// Descriptive fields. Absent keys and empty values are equivalent.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity last changed.
    pub updated_at: DateTime<Utc>,

    /// Starts at 1 and increases on every stored change.
    pub version: u64,
}

impl NamedEntity {
    /// Creates a new entity with a fresh identifier.
    #[must_use]
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::with_id(EntityId::new(), kind, name)
    }

    /// Creates a new entity with a specific identifier.
    #[must_use]
    pub fn with_id(id: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            name: name.into().trim().to_string(),
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Builder-style field setter. Empty values are ignored.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.put_field(field.into(), Some(value.into()));
        self
    }

    /// Returns a field value, if present and non-empty.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Sets or clears a field and bumps the version.
    pub fn set_field(&mut self, field: impl Into<String>, value: Option<String>) {
        self.put_field(field.into(), value);
        self.touch();
    }

    /// Renames the entity and bumps the version.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into().trim().to_string();
        self.touch();
    }

    /// Updates `updated_at` and increments the version.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version = self.version.saturating_add(1);
    }

    fn put_field(&mut self, field: String, value: Option<String>) {
        match value {
            Some(v) if !v.trim().is_empty() => {
                self.fields.insert(field, v);
            }
            _ => {
                self.fields.remove(&field);
            }
        }
    }
}

impl PartialEq for NamedEntity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NamedEntity {}

impl std::hash::Hash for NamedEntity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// An additional name under which an entity may be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Alias identifier.
    pub id: AliasId,
    /// Entity the alias resolves to.
    pub entity_id: EntityId,
    /// Kind of the target entity.
    pub kind: EntityKind,
    /// The alternate name.
    pub alias: String,
    /// How many times the alias has been used to recognize the entity.
    #[serde(default)]
    pub usage_count: u32,
}

impl Alias {
    /// Creates a new alias with a zero usage counter.
    #[must_use]
    pub fn new(entity_id: EntityId, kind: EntityKind, alias: impl Into<String>) -> Self {
        Self {
            id: AliasId::new(),
            entity_id,
            kind,
            alias: alias.into().trim().to_string(),
            usage_count: 0,
        }
    }
}
