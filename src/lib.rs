//! # lorekeeper - Entity resolution for story bibles
//!
//! lorekeeper keeps the characters, locations, events and relationships of a
//! story consistent as they are extracted from an author's text and edited by
//! hand. It finds likely duplicates, merges them into one canonical record
//! without losing references, and points out recurring names that no record
//! covers yet.
//!
//! ## Core Concepts
//!
//! - **Named entity**: a character or location with a stable id and free-text fields
//! - **Alias**: an additional name that resolves to an entity
//! - **Merge**: folding duplicates into a primary, with reference repointing and an audit record
//! - **Extraction**: chunked, per-chunk entity extraction by an external collaborator
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use lorekeeper::{EntityKind, InMemoryStoryStore, LoreEngine, NamedEntity, StoryStore};
//!
//! let store = Arc::new(InMemoryStoryStore::new());
//! let marlowe = NamedEntity::new(EntityKind::Character, "Marlowe");
//! let marlow = NamedEntity::new(EntityKind::Character, "Marlow");
//! store.insert_entity(marlowe.clone())?;
//! store.insert_entity(marlow.clone())?;
//!
//! let engine = LoreEngine::new(store);
//! let suggestions = engine.suggest_duplicates(EntityKind::Character)?;
//! assert_eq!(suggestions[0].names(), vec!["Marlowe", "Marlow"]);
//!
//! let outcome = engine.merge_by_ids(
//!     EntityKind::Character,
//!     &marlowe.id.to_string(),
//!     &[&marlow.id.to_string()],
//! )?;
//! assert_eq!(outcome.summary(), "merged 1 records into Marlowe");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod id;

// Data model
pub mod audit;
pub mod entity;
pub mod error;
pub mod event;
pub mod relationship;

// Resolution
pub mod extraction;
pub mod grouping;
pub mod merge;
pub mod similarity;
pub mod unlinked;

// Storage and facade
pub mod config;
pub mod engine;
pub mod storage;

pub use audit::{ConsumedEntity, MergeRecord, MergeRecordId, RepointCounts};
pub use config::LoreConfig;
pub use engine::{IngestReport, LoreEngine};
pub use entity::{Alias, AliasId, EntityId, EntityKind, NamedEntity};
pub use error::{ExecutionError, ExtractionError, LoreError, LoreResult, ValidationError};
pub use event::{Event, EventId};
pub use extraction::{ExtractionBackend, ExtractionResult, Extractor, JsonExtractor};
pub use grouping::{MergeSuggestion, NameMatch};
pub use merge::{MergeBuilder, MergeOutcome, MergeRequest};
pub use relationship::{Relationship, RelationshipId};
pub use storage::{InMemoryStoryStore, StorageError, StoryStore};
pub use unlinked::{UnlinkedName, UnlinkedNameDetector};
