//! Unlinked-name queries against a populated store.

use std::sync::Arc;

use lorekeeper::{Alias, EntityKind, Event, InMemoryStoryStore, LoreConfig, LoreEngine, NamedEntity, StoryStore};

fn populated() -> (Arc<InMemoryStoryStore>, LoreEngine) {
    let store = Arc::new(InMemoryStoryStore::new());
    let katherine = NamedEntity::new(EntityKind::Character, "Katherine");
    let greywater = NamedEntity::new(EntityKind::Location, "Greywater");
    store.insert_entity(katherine.clone()).unwrap();
    store.insert_entity(greywater.clone()).unwrap();
    store
        .insert_alias(Alias::new(katherine.id, EntityKind::Character, "Kit"))
        .unwrap();
    store
        .insert_event(
            Event::new("Kathryn returns")
                .with_description("Kathryn walked into Greywater at dusk.")
                .with_location(greywater.id),
        )
        .unwrap();

    let engine = LoreEngine::new(store.clone());
    (store, engine)
}

#[test]
fn test_recurring_unknown_name_reported_with_suggestion() {
    let (store, engine) = populated();
    let narrative = ["Kit found Kathryn by the harbor.", "Osric watched them. Kit said nothing."];

    let found = engine.find_unlinked_names(&narrative).unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Kathryn"]);

    let kathryn = &found[0];
    assert_eq!(kathryn.count, 3);
    assert_eq!(kathryn.snippets.len(), 3);
    assert!(kathryn.snippets[0].contains("Kit found Kathryn"));

    let katherine = store.find_entity_by_name(EntityKind::Character, "katherine").unwrap().unwrap();
    assert_eq!(kathryn.suggestions[0].entity_id, katherine.id);
    assert!(kathryn.suggestions[0].score >= 0.65);
}

#[test]
fn test_min_occurrences_is_configurable() {
    let (store, _) = populated();
    let config = LoreConfig {
        unlinked_min_occurrences: 1,
        ..LoreConfig::default()
    };
    let engine = LoreEngine::with_config(store, config).unwrap();

    let found = engine.find_unlinked_names(&["Osric watched."]).unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Kathryn", "Osric"]);
    assert!(found[1].suggestions.is_empty());
}
