//! Sequential per-chunk extraction and merging of the results.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::similarity::name_key;

use super::{Chunk, EntityCandidate, ExtractedEntities, ExtractionResult, Extractor};

/// A chunk whose extraction failed and contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChunk {
    /// Position of the chunk in the document.
    pub index: usize,
    /// Stable chunk identifier.
    pub id: String,
    /// Why extraction failed.
    pub reason: String,
}

/// Merged extraction output for a whole document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentExtraction {
    /// Merged entities from every successful chunk.
    pub entities: ExtractedEntities,
    /// Chunks submitted to the extractor, skipped ones included.
    pub chunks_processed: usize,
    /// Chunks whose extraction failed.
    pub skipped_chunks: Vec<SkippedChunk>,
}

/// Runs an [`Extractor`] over a document's chunks and merges the results.
///
/// Chunks are submitted one at a time, in order, with `pause` between
/// consecutive submissions.
pub struct ChunkExtractionMerger<'a> {
    extractor: &'a dyn Extractor,
    pause: Duration,
}

impl<'a> ChunkExtractionMerger<'a> {
    /// Creates a merger that sleeps `pause` between chunks.
    #[must_use]
    pub fn new(extractor: &'a dyn Extractor, pause: Duration) -> Self {
        Self { extractor, pause }
    }

    /// Extracts every chunk and merges the results.
    ///
    /// A failing chunk is logged, recorded in
    /// [`DocumentExtraction::skipped_chunks`] and otherwise ignored.
    #[must_use]
    pub fn extract_document(&self, chunks: &[Chunk]) -> DocumentExtraction {
        let mut results = Vec::with_capacity(chunks.len());
        let mut skipped_chunks = Vec::new();

        for (position, chunk) in chunks.iter().enumerate() {
            if position > 0 && !self.pause.is_zero() {
                debug!(pause_ms = self.pause.as_millis(), "pausing before next chunk");
                thread::sleep(self.pause);
            }

            debug!(chunk = chunk.index, words = chunk.word_count, "submitting chunk");
            match self.extractor.extract(chunk) {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(chunk = chunk.index, chunk_id = %chunk.id, error = %e, "skipping chunk");
                    skipped_chunks.push(SkippedChunk {
                        index: chunk.index,
                        id: chunk.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        DocumentExtraction {
            entities: merge_chunk_results(results),
            chunks_processed: chunks.len(),
            skipped_chunks,
        }
    }
}

/// Merges per-chunk results in chunk order.
///
/// Characters and locations are deduplicated by case-insensitive name; the
/// first occurrence wins and later ones are dropped whole. Events and
/// relationships are concatenated. The first non-empty summary is kept.
///
/// # Examples
///
/// ```
/// use lorekeeper::extraction::{merge_chunk_results, EntityCandidate, ExtractionResult};
///
/// let first = ExtractionResult {
///     characters: vec![EntityCandidate::new("Dorian").with_field("description", "a thief")],
///     ..Default::default()
/// };
/// let second = ExtractionResult {
///     characters: vec![EntityCandidate::new("dorian").with_field("description", "a prince")],
///     ..Default::default()
/// };
///
/// let merged = merge_chunk_results([first, second]);
/// assert_eq!(merged.characters.len(), 1);
/// assert_eq!(merged.characters[0].fields["description"], "a thief");
/// ```
#[must_use]
pub fn merge_chunk_results(results: impl IntoIterator<Item = ExtractionResult>) -> ExtractedEntities {
    let mut merged = ExtractedEntities::default();
    let mut seen_characters = HashSet::new();
    let mut seen_locations = HashSet::new();

    for result in results {
        push_unseen(&mut merged.characters, &mut seen_characters, result.characters);
        push_unseen(&mut merged.locations, &mut seen_locations, result.locations);
        merged.events.extend(result.events);
        merged.relationships.extend(result.relationships);

        if merged.summary.is_none() {
            merged.summary = result.summary.filter(|s| !s.trim().is_empty());
        }
    }

    merged
}

fn push_unseen(into: &mut Vec<EntityCandidate>, seen: &mut HashSet<String>, candidates: Vec<EntityCandidate>) {
    for candidate in candidates {
        let key = name_key(&candidate.name);
        if !key.is_empty() && seen.insert(key) {
            into.push(candidate);
        }
    }
}
