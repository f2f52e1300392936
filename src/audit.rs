//! Merge audit records.
//!
//! Every completed merge appends exactly one [`MergeRecord`]. Records are
//! immutable: the store only ever inserts and lists them, so the history of
//! which canonical entity absorbed which duplicates survives the deletion of
//! the duplicates themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityKind};
use crate::error::ValidationError;
use crate::id::uuid_id;
use crate::relationship::RelationshipId;

uuid_id!(
    /// Identifier of a merge record.
    MergeRecordId
);

/// A duplicate consumed by a merge, kept by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedEntity {
    /// Identifier the duplicate had.
    pub id: EntityId,
    /// Name the duplicate had when it was consumed.
    pub name: String,
}

/// Reference counts moved by a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepointCounts {
    /// Relationship endpoints moved to the primary.
    pub relationships: usize,
    /// Events whose location moved to the primary.
    pub events: usize,
    /// Aliases moved to the primary.
    pub aliases: usize,
    /// Relationships removed because both endpoints became the survivor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pruned_relationships: Vec<RelationshipId>,
}

/// Immutable audit row for one completed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Record identifier.
    pub id: MergeRecordId,
    /// Kind of every entity in the merge.
    pub kind: EntityKind,

    /// The surviving canonical entity.
    pub primary_id: EntityId,
    /// Name of the primary after the merge.
    pub primary_name: String,

    /// Duplicates that were folded into the primary and deleted.
    pub consumed: Vec<ConsumedEntity>,

    /// When the merge was planned.
    pub merged_at: DateTime<Utc>,

    /// How many references the merge moved.
    #[serde(default)]
    pub repointed: RepointCounts,
}

impl MergeRecord {
    /// Builds a record, rejecting empty or self-referencing consumed lists.
    pub fn new(
        id: MergeRecordId,
        kind: EntityKind,
        primary_id: EntityId,
        primary_name: impl Into<String>,
        consumed: Vec<ConsumedEntity>,
        merged_at: DateTime<Utc>,
        repointed: RepointCounts,
    ) -> Result<Self, ValidationError> {
        if consumed.is_empty() {
            return Err(ValidationError::EmptyDuplicateSet);
        }
        if consumed.iter().any(|c| c.id == primary_id) {
            return Err(ValidationError::PrimaryInDuplicates { id: primary_id });
        }

        Ok(Self {
            id,
            kind,
            primary_id,
            primary_name: primary_name.into(),
            consumed,
            merged_at,
            repointed,
        })
    }

    /// Returns true if `id` was consumed by this merge.
    #[must_use]
    pub fn consumed_id(&self, id: EntityId) -> bool {
        self.consumed.iter().any(|c| c.id == id)
    }
}
