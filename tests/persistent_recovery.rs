//! Crash recovery tests for the durable story store.
//!
//! These tests verify that the store correctly handles:
//! - Replaying every mutation, merges included, after a restart
//! - A torn trailing record (simulated crash mid-write)
//! - Writes continuing after a torn tail was dropped

#![cfg(feature = "persistent")]

use std::fs;
use std::sync::Arc;

use lorekeeper::storage::persistent::{open_store, PersistentConfig};
use lorekeeper::{EntityKind, LoreEngine, NamedEntity, Relationship, StoryStore};
use tempfile::tempdir;

#[test]
fn test_merge_survives_restart() {
    let dir = tempdir().unwrap();
    let primary = NamedEntity::new(EntityKind::Character, "Elena");
    let duplicate = NamedEntity::new(EntityKind::Character, "Elena Marsh");
    let mara = NamedEntity::new(EntityKind::Character, "Mara");

    {
        let store = Arc::new(open_store(dir.path(), None).unwrap());
        for entity in [&primary, &duplicate, &mara] {
            store.insert_entity(entity.clone()).unwrap();
        }
        store
            .insert_relationship(Relationship::new(duplicate.id, mara.id, "rival"))
            .unwrap();

        let engine = LoreEngine::new(store);
        engine
            .merge_by_ids(EntityKind::Character, &primary.id.to_string(), &[&duplicate.id.to_string()])
            .unwrap();
    }

    let store = Arc::new(open_store(dir.path(), None).unwrap());
    assert!(store.get_entity(duplicate.id).unwrap().is_none());
    assert_eq!(store.get_entity(primary.id).unwrap().unwrap().version, 2);
    assert!(store.list_relationships().unwrap()[0].references(primary.id));
    assert_eq!(store.aliases_for(primary.id).unwrap()[0].alias, "Elena Marsh");

    let engine = LoreEngine::new(store);
    let history = engine.merge_history().unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].consumed_id(duplicate.id));
}

#[test]
fn test_torn_trailing_record_is_ignored() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("lore.wal");
    let config = PersistentConfig { sync_on_write: false };

    let names = ["Mara", "Dorian", "Elena", "Osric"];
    {
        let store = open_store(dir.path(), Some(config.clone())).unwrap();
        for name in names {
            store.insert_entity(NamedEntity::new(EntityKind::Character, name)).unwrap();
        }
    }

    // Cut the last record short, as a crash mid-append would.
    {
        let file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
        let size = file.metadata().unwrap().len();
        file.set_len(size - 3).unwrap();
    }

    let store = open_store(dir.path(), Some(config.clone())).unwrap();
    let recovered: Vec<String> = store
        .list_entities(EntityKind::Character)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(recovered, vec!["Mara", "Dorian", "Elena"]);

    store
        .insert_entity(NamedEntity::new(EntityKind::Character, "Bram"))
        .unwrap();
    drop(store);

    let store = open_store(dir.path(), Some(config)).unwrap();
    assert_eq!(store.list_entities(EntityKind::Character).unwrap().len(), 4);
    assert!(store
        .find_entity_by_name(EntityKind::Character, "Bram")
        .unwrap()
        .is_some());
}

#[test]
fn test_corrupt_record_stops_replay() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("lore.wal");

    {
        let store = open_store(dir.path(), None).unwrap();
        store.insert_entity(NamedEntity::new(EntityKind::Location, "Greywater")).unwrap();
        store.insert_entity(NamedEntity::new(EntityKind::Location, "Thessaly")).unwrap();
    }

    // Flip a byte inside the final checksum.
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, bytes).unwrap();

    let store = open_store(dir.path(), None).unwrap();
    let names: Vec<String> = store
        .list_entities(EntityKind::Location)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["Greywater"]);
}
