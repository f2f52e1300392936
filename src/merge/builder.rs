//! Fluent construction of merge requests.

use std::collections::HashSet;

use crate::entity::{EntityId, EntityKind};
use crate::error::ValidationError;

/// A request to fold `duplicates` into `primary`.
///
/// Requests built with [`MergeBuilder`] are always valid. A request assembled
/// field by field is checked again by the coordinator before anything is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Kind shared by the primary and every duplicate.
    pub kind: EntityKind,
    /// The surviving entity.
    pub primary: EntityId,
    /// Non-empty, without repeats, never containing `primary`.
    pub duplicates: Vec<EntityId>,
}

impl MergeRequest {
    /// Starts a builder for the given kind.
    #[must_use]
    pub fn builder(kind: EntityKind) -> MergeBuilder {
        MergeBuilder::new(kind)
    }

    /// Parses author-supplied identifiers into a request.
    pub fn from_strs(kind: EntityKind, primary: &str, duplicates: &[&str]) -> Result<Self, ValidationError> {
        let mut builder = MergeBuilder::new(kind).primary(parse_entity_id(primary)?);
        for dup in duplicates {
            builder = builder.duplicate(parse_entity_id(dup)?);
        }
        builder.build()
    }

    /// Checks the duplicate set: non-empty, no repeats, primary excluded.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_duplicate_set(self.primary, self.duplicates.iter().copied())
    }
}

pub(crate) fn check_duplicate_set(
    primary: EntityId,
    duplicates: impl IntoIterator<Item = EntityId>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in duplicates {
        if id == primary {
            return Err(ValidationError::PrimaryInDuplicates { id });
        }
        if !seen.insert(id) {
            return Err(ValidationError::InvalidField {
                field: "duplicates".to_string(),
                reason: format!("{id} is listed more than once"),
            });
        }
    }
    if seen.is_empty() {
        return Err(ValidationError::EmptyDuplicateSet);
    }
    Ok(())
}

/// Parses an entity identifier, reporting the offending value on failure.
pub fn parse_entity_id(value: &str) -> Result<EntityId, ValidationError> {
    value
        .parse::<EntityId>()
        .map_err(|e| ValidationError::InvalidIdentifier {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Builder for [`MergeRequest`].
///
/// # Examples
///
/// ```
/// use lorekeeper::{EntityId, EntityKind, MergeRequest};
///
/// let primary = EntityId::new();
/// let dup = EntityId::new();
/// let request = MergeRequest::builder(EntityKind::Character)
///     .primary(primary)
///     .duplicate(dup)
///     .duplicate(dup)
///     .build()
///     .unwrap();
/// assert_eq!(request.duplicates, vec![dup]);
/// ```
#[derive(Debug, Clone)]
pub struct MergeBuilder {
    kind: EntityKind,
    primary: Option<EntityId>,
    duplicates: Vec<EntityId>,
}

impl MergeBuilder {
    /// Starts an empty builder for `kind`.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            primary: None,
            duplicates: Vec::new(),
        }
    }

    /// Sets the surviving entity.
    #[must_use]
    pub fn primary(mut self, id: EntityId) -> Self {
        self.primary = Some(id);
        self
    }

    /// Adds one duplicate. Repeats are collapsed at build time.
    #[must_use]
    pub fn duplicate(mut self, id: EntityId) -> Self {
        self.duplicates.push(id);
        self
    }

    /// Adds several duplicates.
    #[must_use]
    pub fn duplicates(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.duplicates.extend(ids);
        self
    }

    /// Validates and builds the request.
    pub fn build(self) -> Result<MergeRequest, ValidationError> {
        let primary = self.primary.ok_or_else(|| ValidationError::MissingField {
            field: "primary".to_string(),
        })?;

        let mut duplicates: Vec<EntityId> = Vec::with_capacity(self.duplicates.len());
        for id in self.duplicates {
            if !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }

        let request = MergeRequest {
            kind: self.kind,
            primary,
            duplicates,
        };
        request.validate()?;
        Ok(request)
    }
}
