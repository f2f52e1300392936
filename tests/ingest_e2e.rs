//! End-to-end document ingestion tests.
//!
//! A scripted completion backend answers per chunk so the tests can exercise
//! chunking, strict payload coercion, first-occurrence merging, skipped chunks
//! and item-by-item persistence together.

use std::sync::{Arc, Mutex};

use lorekeeper::entity::fields;
use lorekeeper::{
    EntityKind, ExtractionBackend, ExtractionError, InMemoryStoryStore, JsonExtractor, LoreConfig, LoreEngine,
    NamedEntity, StoryStore,
};

/// Answers each prompt with the next scripted reply.
struct ScriptedBackend {
    replies: Mutex<Vec<Result<String, ExtractionError>>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<&str, ExtractionError>>) -> Self {
        let mut replies: Vec<_> = replies.into_iter().map(|r| r.map(str::to_string)).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
        }
    }
}

impl ExtractionBackend for ScriptedBackend {
    fn complete(&self, _prompt: &str) -> Result<String, ExtractionError> {
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ExtractionError::Transient("no reply scripted".to_string())))
    }
}

fn engine(store: Arc<InMemoryStoryStore>) -> LoreEngine {
    let config = LoreConfig {
        chunk_max_words: 4,
        extraction_pause_ms: 0,
        ..LoreConfig::default()
    };
    LoreEngine::with_config(store, config).unwrap()
}

const DOCUMENT: &str = "Dorian picked the lock.\n\nThe storm broke over Greywater.\n\nDorian fled with Mara.";

#[test]
fn test_first_description_wins_across_chunks() {
    let store = Arc::new(InMemoryStoryStore::new());
    let engine = engine(store.clone());
    let extractor = JsonExtractor::new(ScriptedBackend::new(vec![
        Ok(r#"{"characters": [{"name": "Dorian", "description": "A locksmith"}], "summary": "A lock is picked."}"#),
        Ok(r#"```json
{"locations": [{"name": "Greywater", "features": ["harbor", "lighthouse"]}]}
```"#),
        Ok(r#"{
            "characters": [
                {"name": "dorian", "description": "A fugitive"},
                {"name": "Mara", "age": 19}
            ],
            "events": [{"title": "The Flight", "location": "greywater", "participants": ["Dorian", "Mara"]}],
            "relationships": [{"source": "Dorian", "target": "Mara", "relationship_type": "ally"}]
        }"#),
    ]));

    let report = engine.ingest_document(&extractor, DOCUMENT);

    assert_eq!(report.chunks_processed, 3);
    assert!(report.skipped_chunks.is_empty());
    assert!(report.persisted.failures.is_empty());
    assert_eq!(report.summary.as_deref(), Some("A lock is picked."));

    let characters = store.list_entities(EntityKind::Character).unwrap();
    assert_eq!(characters.len(), 2);
    let dorian = &characters[0];
    assert_eq!(dorian.name, "Dorian");
    assert_eq!(dorian.field(fields::DESCRIPTION), Some("A locksmith"));
    assert_eq!(characters[1].field("age"), Some("19"));

    let greywater = store.find_entity_by_name(EntityKind::Location, "Greywater").unwrap().unwrap();
    assert_eq!(greywater.field(fields::FEATURES), Some(r#"["harbor","lighthouse"]"#));

    let events = store.list_events().unwrap();
    assert_eq!(events[0].location_id, Some(greywater.id));
    assert_eq!(events[0].participants, vec!["Dorian", "Mara"]);

    let relationships = store.list_relationships().unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].relationship_type, "ally");
    assert_eq!(relationships[0].character_1, dorian.id);
}

#[test]
fn test_failed_chunk_keeps_neighbours() {
    let store = Arc::new(InMemoryStoryStore::new());
    let engine = engine(store.clone());
    let extractor = JsonExtractor::new(ScriptedBackend::new(vec![
        Ok(r#"{"characters": [{"name": "Dorian"}]}"#),
        Err(ExtractionError::Transient("GPU busy".to_string())),
        Ok(r#"{"characters": [{"name": "Mara"}], "locations": [{"name": "Greywater"}]}"#),
    ]));

    let report = engine.ingest_document(&extractor, DOCUMENT);

    assert_eq!(report.skipped_chunks.len(), 1);
    assert_eq!(report.skipped_chunks[0].index, 1);
    assert!(report.skipped_chunks[0].reason.contains("GPU busy"));
    assert_eq!(report.persisted.characters_saved, 2);
    assert_eq!(report.persisted.locations_saved, 1);
}

#[test]
fn test_malformed_reply_is_skipped_not_fatal() {
    let store = Arc::new(InMemoryStoryStore::new());
    let engine = engine(store.clone());
    let extractor = JsonExtractor::new(ScriptedBackend::new(vec![
        Ok("Sorry, I can't help with that."),
        Ok(r#"{"characters": []}"#),
        Ok(r#"{"relationships": [{"from": "Dorian", "to": "Nobody"}]}"#),
    ]));

    let report = engine.ingest_document(&extractor, DOCUMENT);

    assert_eq!(report.skipped_chunks.len(), 1);
    assert!(report.skipped_chunks[0].reason.contains("could not be parsed"));
    assert_eq!(report.persisted.saved(), 0);
    assert_eq!(report.persisted.failures.len(), 1);
    assert_eq!(report.persisted.failures[0].label, "Dorian -> Nobody");
}

#[test]
fn test_relationships_resolve_existing_characters() {
    let store = Arc::new(InMemoryStoryStore::new());
    let elena = NamedEntity::new(EntityKind::Character, "Elena");
    store.insert_entity(elena.clone()).unwrap();
    let engine = engine(store.clone());
    let extractor = JsonExtractor::new(ScriptedBackend::new(vec![Ok(
        r#"{"characters": [{"name": "Mara"}], "relationships": [{"character_1": "Mara", "character_2": "ELENA", "type": "sister"}]}"#,
    )]));

    let report = engine.ingest_document(&extractor, "Mara wrote to Elena.");

    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.persisted.relationships_saved, 1);
    assert!(store.list_relationships().unwrap()[0].references(elena.id));
}
