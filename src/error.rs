//! Error types for lorekeeper.
//!
//! Errors are layered the same way requests flow through the engine:
//! request validation, execution against a store, and the extraction
//! collaborator. The top-level [`LoreError`] wraps all of them so callers
//! can classify a failure without matching every variant.

use thiserror::Error;

use crate::entity::{EntityId, EntityKind};
use crate::merge::MergeStep;

/// Validation errors: malformed or missing request parameters.
///
/// No state is changed when one of these is returned.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required request field was not supplied.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A merge named no duplicates.
    #[error("Merge requires at least one duplicate identifier")]
    EmptyDuplicateSet,

    /// A merge listed its primary among the duplicates.
    #[error("Primary {id} also appears in its own duplicate set")]
    PrimaryInDuplicates {
        /// The primary's identifier.
        id: EntityId,
    },

    /// A supplied identifier did not parse.
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// The text as supplied.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// An entity exists but is of the wrong kind for the request.
    #[error("Entity {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        /// The offending entity.
        id: EntityId,
        /// Kind named by the request.
        expected: EntityKind,
        /// Kind actually stored.
        actual: EntityKind,
    },

    /// An entity name was empty or whitespace.
    #[error("Entity name cannot be empty")]
    EmptyEntityName,

    /// A field held a value outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        /// Name of the field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Execution errors: the request was well-formed but could not be carried out.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    EntityNotFound {
        /// Kind the request expected.
        kind: EntityKind,
        /// The unresolved identifier.
        id: EntityId,
    },

    /// A merge failed at `step`. When `partially_applied` is set, earlier steps
    /// already changed the store and some data may have changed.
    #[error(
        "Merge of {kind} {primary} failed at step '{step}'{}: {reason}",
        partial_note(.partially_applied)
    )]
    MergeFailed {
        /// Kind of the merged entities.
        kind: EntityKind,
        /// The merge primary.
        primary: EntityId,
        /// The step that failed.
        step: MergeStep,
        /// Whether an earlier step already changed the store.
        partially_applied: bool,
        /// Store message.
        reason: String,
    },

    /// The primary changed between planning and applying a merge.
    #[error("{kind} {id} was modified concurrently; reload and retry")]
    Conflict {
        /// Kind of the primary.
        kind: EntityKind,
        /// The primary's identifier.
        id: EntityId,
    },

    /// The store reported an error.
    #[error("Storage error: {message}")]
    Storage {
        /// Store message.
        message: String,
    },
}

/// Errors returned by the extraction collaborator for a single chunk.
///
/// These are non-fatal at the document level: the chunk is skipped.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The service failed; a later attempt may succeed.
    #[error("Extraction service unavailable: {0}")]
    Transient(String),

    /// The service answered with something that is not a usable payload.
    #[error("Extraction output could not be parsed: {0}")]
    Malformed(String),
}

fn partial_note(partially_applied: &bool) -> &'static str {
    if *partially_applied {
        " (some data may have already changed)"
    } else {
        ""
    }
}

/// Top-level error type for lorekeeper.
#[derive(Debug, Error)]
pub enum LoreError {
    /// The request was rejected before touching the store.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The request failed while running.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The extraction collaborator failed.
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// An invariant of the crate itself was broken.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl LoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a referenced identifier did not resolve.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::EntityNotFound { .. }))
    }

    /// Returns true if the store may have been changed before the failure.
    #[must_use]
    pub const fn partially_applied(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::MergeFailed {
                partially_applied: true,
                ..
            })
        )
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// Merge steps are idempotent, so a merge that failed midway is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::MergeFailed { .. }
                    | ExecutionError::Conflict { .. }
                    | ExecutionError::Storage { .. }
            ),
            Self::Extraction(e) => matches!(e, ExtractionError::Transient(_)),
        }
    }
}

/// Result type alias for lorekeeper operations.
pub type LoreResult<T> = Result<T, LoreError>;
