//! Story events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::id::uuid_id;

uuid_id!(
    /// Identifier of an event row.
    EventId
);

/// Something that happens in the story, optionally at a known location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Short title.
    pub title: String,

    /// Longer account of what happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Reference to a canonical location. Repointed when locations merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,

    /// Participants by name, as extracted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,

    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            title: title.into().trim().to_string(),
            description: None,
            location_id: None,
            participants: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location_id: EntityId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Sets the participant names.
    #[must_use]
    pub fn with_participants(mut self, participants: Vec<String>) -> Self {
        self.participants = participants;
        self
    }

    /// Title and description, for text scans.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.description.as_deref())
    }
}
