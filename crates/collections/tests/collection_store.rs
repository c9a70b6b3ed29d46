use pretty_assertions::assert_eq;
use std::sync::Arc;
use wordbook_collections::{
    view, CollectionError, CollectionStore, CollectionUpdate, EntryOrigin, EntryPatch,
    OverlaySource, SharedCollection, UserDefaultEntry, UserDefaultsStore,
};
use wordbook_dictionary::testing::simple_definition;
use wordbook_dictionary::{Meaning, PartOfSpeech};
use wordbook_kv_store::testing::FaultyStore;
use wordbook_kv_store::{get_json, keys, DurableStore, FileStore, MemoryStore};

fn memory_store() -> Arc<dyn DurableStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn create_rejects_duplicate_names_case_insensitively() {
    let store = CollectionStore::new(memory_store());
    store.create_collection("Travel", "trip words").await.expect("create");

    let err = store.create_collection("  travel ", "").await.unwrap_err();
    assert!(matches!(err, CollectionError::DuplicateName(_)));

    let err = store.create_collection("   ", "").await.unwrap_err();
    assert!(matches!(err, CollectionError::Invalid(_)));
}

#[tokio::test]
async fn default_collection_is_created_once_and_protected() {
    let store = CollectionStore::new(memory_store());
    let first = store.ensure_default_collection().await.expect("default");
    let second = store.ensure_default_collection().await.expect("default");
    assert_eq!(first, second);
    assert!(first.is_default);

    let err = store.delete_collection(first.id).await.unwrap_err();
    assert!(matches!(err, CollectionError::DefaultCollection));
    assert_eq!(store.list_collections().await.expect("list").len(), 1);
}

#[tokio::test]
async fn update_renames_and_checks_conflicts() {
    let store = CollectionStore::new(memory_store());
    let a = store.create_collection("A", "").await.expect("create");
    store.create_collection("B", "").await.expect("create");

    let err = store
        .update_collection(
            a.id,
            CollectionUpdate {
                name: Some("b".into()),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::DuplicateName(_)));

    let renamed = store
        .update_collection(
            a.id,
            CollectionUpdate {
                name: Some("Animals".into()),
                description: Some("zoo".into()),
            },
        )
        .await
        .expect("update");
    assert_eq!(renamed.name, "Animals");
    assert_eq!(renamed.description, "zoo");
}

#[tokio::test]
async fn add_entry_skips_duplicate_words() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Fruit", "").await.expect("create");

    let first = store
        .add_entry(meta.id, simple_definition("Apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");
    let again = store
        .add_entry(meta.id, simple_definition(" apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");

    assert!(first.is_added());
    assert!(!again.is_added());
    assert_eq!(again.entry().id, first.entry().id);
    assert_eq!(store.entries(meta.id).await.expect("entries").len(), 1);
}

#[tokio::test]
async fn add_to_unknown_collection_fails() {
    let store = CollectionStore::new(memory_store());
    let err = store
        .add_entry(42, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::NotFound(_)));
}

#[tokio::test]
async fn delete_returns_removed_entries() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Temp", "").await.expect("create");
    store
        .add_entry(meta.id, simple_definition("run", "달리다"), EntryOrigin::Remote)
        .await
        .expect("add");

    let removed = store.delete_collection(meta.id).await.expect("delete");

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].word, "run");
    assert!(store.get_collection(meta.id).await.expect("get").is_none());
    assert!(store.entries(meta.id).await.expect("entries").is_empty());
}

#[tokio::test]
async fn customize_then_reset_restores_snapshot() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Verbs", "").await.expect("create");
    let original = simple_definition("run", "달리다");
    let added = store
        .add_entry(meta.id, original.clone(), EntryOrigin::Remote)
        .await
        .expect("add");
    let entry_id = added.entry().id;

    let customized = store
        .customize_entry(
            meta.id,
            entry_id,
            EntryPatch {
                meanings: Some(vec![Meaning {
                    part_of_speech: PartOfSpeech::Verb,
                    native: "뛰다".to_string(),
                    foreign: String::new(),
                    examples: Vec::new(),
                }]),
                custom_note: Some("my own".to_string()),
                ..EntryPatch::default()
            },
        )
        .await
        .expect("customize");
    assert!(customized.is_customized);
    assert_eq!(customized.definition.meanings[0].native, "뛰다");

    let reset = store
        .reset_customization(meta.id, entry_id)
        .await
        .expect("reset");
    assert!(!reset.is_customized);
    assert_eq!(reset.definition, original);
    assert_eq!(reset.custom_note, None);
}

#[tokio::test]
async fn study_results_and_statistics() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Mixed", "").await.expect("create");
    let outcomes = store
        .add_entries(
            meta.id,
            vec![
                (simple_definition("a", "x"), EntryOrigin::Remote),
                (simple_definition("b", "y"), EntryOrigin::Bundled),
                (simple_definition("c", "z"), EntryOrigin::Remote),
            ],
        )
        .await
        .expect("add");
    let ids: Vec<u64> = outcomes.iter().map(|o| o.entry().id).collect();

    store.set_mastered(meta.id, ids[0], true).await.expect("master");
    let studied = store
        .record_study_result(meta.id, ids[1], false)
        .await
        .expect("study");
    assert_eq!(studied.progress.incorrect_count, 1);
    assert!(studied.progress.last_studied_unix_ms.is_some());

    let stats = store.statistics(meta.id).await.expect("stats");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.mastered, 1);
    assert_eq!(stats.learning, 1);
    assert_eq!(stats.part_of_speech_distribution.get("noun"), Some(&3));
    assert!((stats.average_difficulty - 2.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn mastered_scans_cover_every_collection() {
    let store = CollectionStore::new(memory_store());
    let a = store.create_collection("A", "").await.expect("create");
    let b = store.create_collection("B", "").await.expect("create");
    for id in [a.id, b.id] {
        let added = store
            .add_entry(id, simple_definition("apple", "사과"), EntryOrigin::Remote)
            .await
            .expect("add");
        store
            .set_mastered(id, added.entry().id, true)
            .await
            .expect("master");
    }

    assert_eq!(
        store.collections_with_mastered("APPLE").await.expect("scan"),
        vec![a.id, b.id]
    );
    let words: Vec<String> = store.mastered_words().await.expect("scan").into_iter().collect();
    assert_eq!(words, vec!["apple".to_string()]);
}

#[tokio::test]
async fn failed_collection_write_keeps_previous_entries() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let store = CollectionStore::new(faulty.clone());
    let meta = store.create_collection("Words", "").await.expect("create");
    store
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");
    let before = store.entries(meta.id).await.expect("entries");

    faulty.fail_writes(&keys::collection_key(meta.id), 1);
    let err = store
        .add_entry(meta.id, simple_definition("pear", "배"), EntryOrigin::Remote)
        .await
        .unwrap_err();

    assert!(matches!(err, CollectionError::StoreError(_)));
    assert_eq!(store.entries(meta.id).await.expect("entries"), before);
}

#[tokio::test]
async fn failed_entry_removal_leaves_inert_orphan() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let store = CollectionStore::new(faulty.clone());
    let meta = store.create_collection("Doomed", "").await.expect("create");
    let added = store
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");
    store
        .set_mastered(meta.id, added.entry().id, true)
        .await
        .expect("master");

    faulty.fail_writes(&keys::collection_key(meta.id), 1);
    let removed = store.delete_collection(meta.id).await.expect("delete");

    assert_eq!(removed.len(), 1);
    assert!(store.get_collection(meta.id).await.expect("get").is_none());
    // The entry list survives on disk but no scan follows it.
    assert!(faulty
        .get(&keys::collection_key(meta.id))
        .await
        .expect("get")
        .is_some());
    assert!(store.mastered_words().await.expect("scan").is_empty());
    assert!(store
        .collections_with_mastered("apple")
        .await
        .expect("scan")
        .is_empty());
}

#[tokio::test]
async fn new_collection_never_inherits_orphaned_entries() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let store = CollectionStore::new(faulty.clone());
    let meta = store.create_collection("Old", "").await.expect("create");
    assert_eq!(meta.id, 1);
    store
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");

    faulty.fail_writes(&keys::collection_key(1), 1);
    store.delete_collection(1).await.expect("delete");

    let fresh = store.create_collection("Brand new", "").await.expect("create");
    assert_ne!(fresh.id, 1);
    assert!(store.entries(fresh.id).await.expect("entries").is_empty());
    assert_eq!(
        store.statistics(fresh.id).await.expect("stats").total,
        0
    );
}

#[tokio::test]
async fn collection_ids_are_not_reused_after_delete() {
    let store = CollectionStore::new(memory_store());
    let a = store.create_collection("A", "").await.expect("create");
    let b = store.create_collection("B", "").await.expect("create");
    store.delete_collection(b.id).await.expect("delete");

    let c = store.create_collection("C", "").await.expect("create");
    assert!(c.id > b.id);
    assert_ne!(c.id, a.id);
}

#[tokio::test]
async fn entry_ids_are_not_reused_after_removal() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Words", "").await.expect("create");
    store
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");
    let run = store
        .add_entry(meta.id, simple_definition("run", "달리다"), EntryOrigin::Remote)
        .await
        .expect("add");
    let run_id = run.entry().id;
    store.remove_entry(meta.id, run_id).await.expect("remove");

    let tree = store
        .add_entry(meta.id, simple_definition("tree", "나무"), EntryOrigin::Remote)
        .await
        .expect("add");
    assert!(tree.entry().id > run_id);

    // Ids stay unique across collections too.
    let other = store.create_collection("Other", "").await.expect("create");
    let elsewhere = store
        .add_entry(other.id, simple_definition("run", "달리다"), EntryOrigin::Remote)
        .await
        .expect("add");
    assert!(elsewhere.entry().id > tree.entry().id);
}

#[tokio::test]
async fn failed_entry_write_burns_reserved_id() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let store = CollectionStore::new(faulty.clone());
    let meta = store.create_collection("Words", "").await.expect("create");
    let first = store
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");

    faulty.fail_writes(&keys::collection_key(meta.id), 1);
    store
        .add_entry(meta.id, simple_definition("pear", "배"), EntryOrigin::Remote)
        .await
        .unwrap_err();

    let retried = store
        .add_entry(meta.id, simple_definition("pear", "배"), EntryOrigin::Remote)
        .await
        .expect("add");
    assert_eq!(retried.entry().id, first.entry().id + 2);
}

#[tokio::test]
async fn legacy_data_without_sequence_continues_above_existing_ids() {
    let backing = memory_store();
    let store = CollectionStore::new(backing.clone());
    let meta = store.create_collection("Legacy", "").await.expect("create");
    store
        .add_entries(
            meta.id,
            vec![
                (simple_definition("a", "x"), EntryOrigin::Remote),
                (simple_definition("b", "y"), EntryOrigin::Remote),
            ],
        )
        .await
        .expect("add");
    backing.remove(keys::ID_SEQUENCE).await.expect("forget sequence");

    let next = store.create_collection("Next", "").await.expect("create");
    assert!(next.id > meta.id);
    let added = store
        .add_entry(meta.id, simple_definition("c", "z"), EntryOrigin::Remote)
        .await
        .expect("add");
    assert_eq!(added.entry().id, 3);
}

#[tokio::test]
async fn export_carries_current_words_and_metadata() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Trip", "travel words").await.expect("create");
    let outcomes = store
        .add_entries(
            meta.id,
            vec![
                (simple_definition("run", "달리다"), EntryOrigin::Remote),
                (simple_definition("book", "책"), EntryOrigin::Bundled),
            ],
        )
        .await
        .expect("add");
    store
        .customize_entry(
            meta.id,
            outcomes[0].entry().id,
            EntryPatch {
                difficulty: Some(4),
                tags: Some(vec!["verbs".to_string()]),
                ..EntryPatch::default()
            },
        )
        .await
        .expect("customize");

    let shared = store.export_collection(meta.id).await.expect("export");

    assert_eq!(shared.name, "Trip");
    assert_eq!(shared.description, "travel words");
    assert_eq!(shared.metadata.word_count, 2);
    assert_eq!(shared.metadata.tags, vec!["verbs".to_string()]);
    assert_eq!(shared.metadata.difficulty_distribution.get(&4), Some(&1));
    assert_eq!(shared.metadata.difficulty_distribution.get(&2), Some(&1));
    let sources: Vec<&str> = shared.words.iter().map(|w| w.source.as_str()).collect();
    assert_eq!(sources, vec!["remote", "bundled"]);
    assert!(shared.words.iter().all(|w| (w.confidence - 1.0).abs() < f32::EPSILON));
    assert!(shared.id.starts_with(&format!("shared_{}_", meta.id)));
}

#[tokio::test]
async fn exporting_an_empty_collection_fails() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Empty", "").await.expect("create");

    let err = store.export_collection(meta.id).await.unwrap_err();
    assert!(matches!(err, CollectionError::Invalid(_)));

    let err = store.export_collection(99).await.unwrap_err();
    assert!(matches!(err, CollectionError::NotFound(_)));
}

#[tokio::test]
async fn import_numbers_clashing_names_and_resets_progress() {
    let store = CollectionStore::new(memory_store());
    let meta = store.create_collection("Trip", "").await.expect("create");
    let added = store
        .add_entry(meta.id, simple_definition("run", "달리다"), EntryOrigin::Bundled)
        .await
        .expect("add");
    store
        .set_mastered(meta.id, added.entry().id, true)
        .await
        .expect("master");

    let raw = store
        .export_collection(meta.id)
        .await
        .expect("export")
        .to_json_pretty()
        .expect("json");
    let first = store
        .import_collection(SharedCollection::from_json(&raw).expect("parse"))
        .await
        .expect("import");
    let second = store
        .import_collection(SharedCollection::from_json(&raw.replace("Trip", "trip")).expect("parse"))
        .await
        .expect("import");

    assert_eq!(first.collection.name, "Trip (2)");
    assert_eq!(second.collection.name, "trip (3)");
    assert_eq!(first.imported, 1);
    assert!(first.skipped.is_empty());

    let entries = store.entries(first.collection.id).await.expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].word, "run");
    assert_eq!(entries[0].origin, EntryOrigin::Bundled);
    assert!(!entries[0].progress.mastered);
    assert_eq!(entries[0].definition.meanings[0].native, "달리다");
}

#[tokio::test]
async fn import_skips_repeated_words() {
    let store = CollectionStore::new(memory_store());
    let raw = r#"{
        "name": "Mixed",
        "words": [
            {"word": "Run", "meanings": [{"partOfSpeech": "verb", "korean": "달리다"}]},
            {"word": "run ", "meanings": []},
            {"word": "tree", "difficulty": 3, "meanings": [{"partOfSpeech": "noun", "korean": "나무"}]}
        ]
    }"#;

    let report = store
        .import_collection(SharedCollection::from_json(raw).expect("parse"))
        .await
        .expect("import");

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, vec!["run".to_string()]);
    let words: Vec<String> = store
        .entries(report.collection.id)
        .await
        .expect("entries")
        .into_iter()
        .map(|entry| entry.word)
        .collect();
    assert_eq!(words, vec!["run".to_string(), "tree".to_string()]);
}

#[tokio::test]
async fn failed_import_write_removes_new_collection() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let store = CollectionStore::new(faulty.clone());
    let existing = store.create_collection("Kept", "").await.expect("create");
    let raw = r#"{"name": "Broken", "words": [{"word": "run", "meanings": []}]}"#;

    faulty.fail_writes(&keys::collection_key(existing.id + 1), 1);
    let err = store
        .import_collection(SharedCollection::from_json(raw).expect("parse"))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectionError::StoreError(_)));
    let names: Vec<String> = store
        .list_collections()
        .await
        .expect("list")
        .into_iter()
        .map(|meta| meta.name)
        .collect();
    assert_eq!(names, vec!["Kept".to_string()]);
}

#[tokio::test]
async fn overlay_prefers_user_default_over_snapshot() {
    let backing = memory_store();
    let store = CollectionStore::new(backing.clone());
    let defaults = UserDefaultsStore::new(backing);
    let meta = store.create_collection("Verbs", "").await.expect("create");
    let added = store
        .add_entry(meta.id, simple_definition("run", "경영하다"), EntryOrigin::Remote)
        .await
        .expect("add");
    defaults
        .save(UserDefaultEntry::from_definition(&simple_definition(
            "run",
            "to move fast",
        )))
        .await
        .expect("save");

    let effective = view(
        meta.id,
        added.entry(),
        &defaults.snapshot().await.expect("snapshot"),
    );

    assert_eq!(effective.source, OverlaySource::UserDefault);
    assert_eq!(effective.definition.meanings[0].native, "to move fast");
}

#[tokio::test]
async fn overlay_keeps_customized_entry_verbatim() {
    let backing = memory_store();
    let store = CollectionStore::new(backing.clone());
    let defaults = UserDefaultsStore::new(backing);
    let meta = store.create_collection("Verbs", "").await.expect("create");
    let added = store
        .add_entry(meta.id, simple_definition("run", "경영하다"), EntryOrigin::Remote)
        .await
        .expect("add");
    let customized = store
        .customize_entry(
            meta.id,
            added.entry().id,
            EntryPatch {
                meanings: Some(vec![Meaning {
                    part_of_speech: PartOfSpeech::Verb,
                    native: "my own gloss".to_string(),
                    foreign: String::new(),
                    examples: Vec::new(),
                }]),
                ..EntryPatch::default()
            },
        )
        .await
        .expect("customize");
    defaults
        .save(UserDefaultEntry::from_definition(&simple_definition(
            "run",
            "to move fast",
        )))
        .await
        .expect("save");

    let effective = view(
        meta.id,
        &customized,
        &defaults.snapshot().await.expect("snapshot"),
    );

    assert_eq!(effective.source, OverlaySource::Customized);
    assert_eq!(effective.definition.meanings[0].native, "my own gloss");
}

#[tokio::test]
async fn collections_persist_in_file_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = CollectionStore::new(Arc::new(FileStore::open(dir.path()).await.expect("open")));
        let meta = store.create_collection("Saved", "").await.expect("create");
        store
            .add_entry(meta.id, simple_definition("book", "책"), EntryOrigin::Bundled)
            .await
            .expect("add");
    }

    let reopened: Arc<dyn DurableStore> = Arc::new(FileStore::open(dir.path()).await.expect("reopen"));
    let metas: Vec<wordbook_collections::CollectionMeta> =
        get_json(reopened.as_ref(), keys::COLLECTIONS)
            .await
            .expect("read")
            .expect("present");
    assert_eq!(metas[0].name, "Saved");

    let store = CollectionStore::new(reopened);
    let entries = store.entries(metas[0].id).await.expect("entries");
    assert_eq!(entries[0].word, "book");
    assert_eq!(entries[0].origin, EntryOrigin::Bundled);
}
