//! Document extraction: chunking, per-chunk extraction, merging, persisting.
//!
//! A document is split into paragraph-aligned [`Chunk`]s which are handed to
//! an [`Extractor`] one at a time. The per-chunk [`ExtractionResult`]s are
//! merged into one deduplicated set by [`ChunkExtractionMerger`] and written
//! to a store item by item with [`persist_extracted`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod chunker;
mod coerce;
mod extractor;
mod merger;
mod persist;

pub use chunker::{chunk_document, Chunk, DEFAULT_MAX_WORDS};
pub use coerce::{coerce_payload, strip_code_fences};
pub use extractor::{build_extraction_prompt, ExtractionBackend, Extractor, JsonExtractor};
pub use merger::{merge_chunk_results, ChunkExtractionMerger, DocumentExtraction, SkippedChunk};
pub use persist::{persist_extracted, ItemCategory, ItemFailure, PersistReport};

/// A character or location proposed by the extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCandidate {
    /// Name as extracted.
    pub name: String,
    /// Descriptive fields keyed by field name. List values are JSON-encoded.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl EntityCandidate {
    /// A candidate with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds one descriptive field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// An event proposed by the extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCandidate {
    /// Event title.
    pub title: String,
    /// What happened.
    #[serde(default)]
    pub description: Option<String>,
    /// Location by name; resolved against known locations when persisted.
    #[serde(default)]
    pub location: Option<String>,
    /// Names of the characters involved.
    #[serde(default)]
    pub participants: Vec<String>,
}

/// A relationship proposed by the extraction collaborator. Endpoints are
/// character names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    /// Name of the first character.
    pub character_1: String,
    /// Name of the second character.
    pub character_2: String,
    /// Kind of relationship, such as `ally`.
    pub relationship_type: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Output of extracting one chunk, or the merged output of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted characters.
    #[serde(default)]
    pub characters: Vec<EntityCandidate>,
    /// Extracted locations.
    #[serde(default)]
    pub locations: Vec<EntityCandidate>,
    /// Extracted events.
    #[serde(default)]
    pub events: Vec<EventCandidate>,
    /// Extracted relationships between characters.
    #[serde(default)]
    pub relationships: Vec<RelationshipCandidate>,
    /// Summary of the source text, if the extractor gave one.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Merged, deduplicated extraction output for a document.
pub type ExtractedEntities = ExtractionResult;

impl ExtractionResult {
    /// Returns true if nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
            && self.locations.is_empty()
            && self.events.is_empty()
            && self.relationships.is_empty()
            && self.summary.is_none()
    }
}
