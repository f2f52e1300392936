//! Author-facing facade over a story store.
//!
//! [`LoreEngine`] ties the resolution components to one [`StoryStore`]:
//! merge suggestions and merges, unlinked-name queries, document ingestion
//! and merge history.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::audit::MergeRecord;
use crate::config::LoreConfig;
use crate::entity::{EntityKind, NamedEntity};
use crate::error::LoreResult;
use crate::event::Event;
use crate::extraction::{
    chunk_document, persist_extracted, ChunkExtractionMerger, Extractor, PersistReport, SkippedChunk,
};
use crate::grouping::{suggest_merges, MergeSuggestion};
use crate::merge::{storage_err, MergeCoordinator, MergeOutcome, MergeRequest};
use crate::storage::StoryStore;
use crate::unlinked::UnlinkedName;

/// Result of ingesting one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Chunks submitted to the extractor, skipped ones included.
    pub chunks_processed: usize,
    /// Chunks whose extraction failed and contributed nothing.
    pub skipped_chunks: Vec<SkippedChunk>,
    /// What persisting the merged extraction saved.
    pub persisted: PersistReport,
    /// First non-empty chunk summary.
    pub summary: Option<String>,
}

/// The lorekeeper engine.
pub struct LoreEngine {
    store: Arc<dyn StoryStore>,
    merges: MergeCoordinator,
    config: LoreConfig,
}

impl LoreEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn StoryStore>) -> Self {
        Self {
            merges: MergeCoordinator::new(Arc::clone(&store)),
            store,
            config: LoreConfig::default(),
        }
    }

    /// Create an engine with a custom configuration.
    ///
    /// # Errors
    /// Returns a validation error if `config` is out of range.
    pub fn with_config(store: Arc<dyn StoryStore>, config: LoreConfig) -> LoreResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &LoreConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StoryStore> {
        &self.store
    }

    /// Fold the request's duplicates into its primary.
    pub fn merge(&self, request: &MergeRequest) -> LoreResult<MergeOutcome> {
        self.merges.execute(request)
    }

    /// Like [`LoreEngine::merge`], with identifiers as supplied by an author.
    ///
    /// # Errors
    /// Malformed identifiers, an empty duplicate list, or a primary listed
    /// among its duplicates fail validation before the store is touched.
    pub fn merge_by_ids(&self, kind: EntityKind, primary: &str, duplicates: &[&str]) -> LoreResult<MergeOutcome> {
        let request = MergeRequest::from_strs(kind, primary, duplicates)?;
        self.merge(&request)
    }

    /// Groups of likely duplicates among entities of `kind`, best first.
    pub fn suggest_duplicates(&self, kind: EntityKind) -> LoreResult<Vec<MergeSuggestion>> {
        let entities = self.store.list_entities(kind).map_err(storage_err)?;
        Ok(suggest_merges(&entities, self.config.likely_duplicate_threshold))
    }

    /// Recurring proper nouns in `narrative` and stored events that match no
    /// character, location, or alias.
    pub fn find_unlinked_names(&self, narrative: &[&str]) -> LoreResult<Vec<UnlinkedName>> {
        let mut entities: Vec<NamedEntity> = Vec::new();
        let mut aliases = Vec::new();
        for kind in EntityKind::ALL {
            entities.extend(self.store.list_entities(kind).map_err(storage_err)?);
            aliases.extend(self.store.list_aliases(kind).map_err(storage_err)?);
        }
        let events: Vec<Event> = self.store.list_events().map_err(storage_err)?;

        let corpus: Vec<&str> = narrative
            .iter()
            .copied()
            .chain(events.iter().flat_map(Event::texts))
            .collect();

        self.config.unlinked_detector().detect(&entities, &aliases, &corpus)
    }

    /// Chunk `text`, extract each chunk with `extractor`, merge the results
    /// and save them.
    ///
    /// Failed chunks and items that could not be saved are reported rather
    /// than failing the whole document.
    pub fn ingest_document(&self, extractor: &dyn Extractor, text: &str) -> IngestReport {
        let chunks = chunk_document(text, self.config.chunk_max_words);
        let extraction = ChunkExtractionMerger::new(extractor, self.config.extraction_pause()).extract_document(&chunks);
        let persisted = persist_extracted(self.store.as_ref(), &extraction.entities);

        info!(
            chunks = extraction.chunks_processed,
            skipped = extraction.skipped_chunks.len(),
            saved = persisted.saved(),
            failed = persisted.failures.len(),
            "document ingested"
        );

        IngestReport {
            chunks_processed: extraction.chunks_processed,
            skipped_chunks: extraction.skipped_chunks,
            persisted,
            summary: extraction.entities.summary,
        }
    }

    /// Completed merges, oldest first.
    pub fn merge_history(&self) -> LoreResult<Vec<MergeRecord>> {
        self.store.list_merge_records().map_err(storage_err)
    }
}
