use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wordbook_collections::{
    CollectionError, CollectionStore, EntryOrigin, MasteryIndex, MasterySource,
};
use wordbook_dictionary::testing::simple_definition;
use wordbook_kv_store::testing::FaultyStore;
use wordbook_kv_store::{keys, DurableStore, MemoryStore};

/// Scan source that counts scans and yields before answering.
struct CountingSource {
    words: BTreeSet<String>,
    scans: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    fn new(words: &[&str]) -> Self {
        Self {
            words: words.iter().map(|w| (*w).to_string()).collect(),
            scans: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }
}

#[async_trait]
impl MasterySource for CountingSource {
    async fn scan_mastered(&self) -> wordbook_collections::Result<BTreeSet<String>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail {
            return Err(CollectionError::Invalid("scan exploded".into()));
        }
        Ok(self.words.clone())
    }
}

#[tokio::test]
async fn concurrent_initialize_scans_once() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(&["apple", "run"]));
    let index = MasteryIndex::new(store.clone(), source.clone());

    tokio::join!(index.initialize(), index.initialize());

    assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    assert!(index.is_mastered("apple"));
    assert!(index.is_mastered(" RUN "));
    assert!(store.get(keys::MASTERY_INDEX).await.expect("get").is_some());

    // Later callers return immediately.
    index.initialize().await;
    assert_eq!(source.scans.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn persisted_snapshot_skips_scan() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    store
        .set(keys::MASTERY_INDEX, r#"["book"]"#.to_string())
        .await
        .expect("set");
    let source = Arc::new(CountingSource::new(&["apple"]));
    let index = MasteryIndex::new(store, source.clone());

    index.initialize().await;

    assert_eq!(source.scans.load(Ordering::SeqCst), 0);
    assert!(index.is_mastered("book"));
    assert!(!index.is_mastered("apple"));
}

#[tokio::test]
async fn corrupt_snapshot_triggers_rescan() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    store
        .set(keys::MASTERY_INDEX, "{broken".to_string())
        .await
        .expect("set");
    let source = Arc::new(CountingSource::new(&["apple"]));
    let index = MasteryIndex::new(store, source.clone());

    index.initialize().await;

    assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    assert!(index.is_mastered("apple"));
}

#[tokio::test]
async fn failed_scan_initializes_empty() {
    let index = MasteryIndex::new(
        Arc::new(MemoryStore::new()),
        Arc::new(CountingSource::failing()),
    );
    index.initialize().await;

    let stats = index.stats();
    assert!(stats.initialized);
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn queries_before_initialize_report_false() {
    let index = MasteryIndex::new(
        Arc::new(MemoryStore::new()),
        Arc::new(CountingSource::new(&["apple"])),
    );
    assert!(!index.is_mastered("apple"));
    assert!(!index.stats().initialized);
}

#[tokio::test]
async fn update_persistence_failure_is_not_raised() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let index = MasteryIndex::new(faulty.clone(), Arc::new(CountingSource::new(&[])));
    index.initialize().await;

    faulty.fail_all_writes(true);
    index.update("apple", true).await;
    assert!(index.is_mastered("apple"));

    faulty.fail_all_writes(false);
    index.update_many(&[("pear".to_string(), true), ("apple".to_string(), false)]).await;
    assert_eq!(index.words(), vec!["pear".to_string()]);
    assert_eq!(
        faulty.get(keys::MASTERY_INDEX).await.expect("get").as_deref(),
        Some(r#"["pear"]"#)
    );
}

#[tokio::test]
async fn rebuild_uses_collection_scan() {
    let backing: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let collections = Arc::new(CollectionStore::new(backing.clone()));
    let index = MasteryIndex::new(backing, collections.clone());
    index.initialize().await;

    let meta = collections.create_collection("A", "").await.expect("create");
    let added = collections
        .add_entry(meta.id, simple_definition("apple", "사과"), EntryOrigin::Remote)
        .await
        .expect("add");
    collections
        .set_mastered(meta.id, added.entry().id, true)
        .await
        .expect("master");

    // The index was never told; rebuild repairs it.
    assert!(!index.is_mastered("apple"));
    assert_eq!(index.rebuild().await.expect("rebuild"), 1);
    assert!(index.is_mastered("apple"));
}

async fn persisted_words(store: &dyn DurableStore) -> Vec<String> {
    let raw = store
        .get(keys::MASTERY_INDEX)
        .await
        .expect("get")
        .expect("persisted index");
    serde_json::from_str(&raw).expect("index json")
}

#[tokio::test]
async fn update_before_initialize_is_replayed_over_snapshot() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    store
        .set(keys::MASTERY_INDEX, r#"["book"]"#.to_string())
        .await
        .expect("set");
    let source = Arc::new(CountingSource::new(&[]));
    let index = MasteryIndex::new(store.clone(), source.clone());

    index.update("apple", true).await;
    assert!(!index.is_mastered("apple"));

    index.initialize().await;

    assert_eq!(source.scans.load(Ordering::SeqCst), 0);
    assert!(index.is_mastered("apple"));
    assert!(index.is_mastered("book"));
    assert_eq!(
        persisted_words(store.as_ref()).await,
        vec!["apple".to_string(), "book".to_string()]
    );
}

#[tokio::test]
async fn toggles_during_initial_scan_survive() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(&["run", "tree"]));
    let index = MasteryIndex::new(store.clone(), source.clone());

    let toggles = async {
        // The scan is sleeping by the time this runs.
        tokio::task::yield_now().await;
        assert!(!index.is_ready());
        index.update("apple", true).await;
        index.update("run", false).await;
    };
    tokio::join!(index.initialize(), toggles);

    assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    assert!(index.is_mastered("apple"));
    assert!(!index.is_mastered("run"));
    assert!(index.is_mastered("tree"));
    assert_eq!(
        persisted_words(store.as_ref()).await,
        vec!["apple".to_string(), "tree".to_string()]
    );
}

#[tokio::test]
async fn dropped_initialize_keeps_recorded_changes() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let index = MasteryIndex::new(store, Arc::new(CountingSource::new(&["run"])));

    index.update("apple", true).await;
    let abandoned =
        tokio::time::timeout(Duration::from_millis(1), index.initialize()).await;
    assert!(abandoned.is_err());
    assert!(!index.is_ready());

    index.initialize().await;
    assert!(index.is_mastered("apple"));
    assert!(index.is_mastered("run"));
}

#[tokio::test]
async fn concurrent_updates_persist_latest_state() {
    let faulty = Arc::new(FaultyStore::in_memory());
    let index = MasteryIndex::new(faulty.clone(), Arc::new(CountingSource::new(&[])));
    index.initialize().await;

    tokio::join!(
        index.update("apple", true),
        index.update("book", true),
        index.update("apple", false),
        index.update("tree", true),
    );

    assert_eq!(
        index.words(),
        vec!["book".to_string(), "tree".to_string()]
    );
    assert_eq!(persisted_words(faulty.as_ref()).await, index.words());
}

#[tokio::test]
async fn rebuild_waits_for_in_flight_initialize() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(&["apple"]));
    let index = MasteryIndex::new(store, source.clone());

    let (_, rebuilt) = tokio::join!(index.initialize(), index.rebuild());

    assert_eq!(rebuilt.expect("rebuild"), 1);
    // One scan for the load, one for the rebuild that waited on it.
    assert_eq!(source.scans.load(Ordering::SeqCst), 2);
    assert!(index.is_ready());
    assert!(index.is_mastered("apple"));
}

#[tokio::test]
async fn rebuild_on_fresh_index_takes_over_initialization() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(&["apple", "run"]));
    let index = MasteryIndex::new(store.clone(), source.clone());

    assert_eq!(index.rebuild().await.expect("rebuild"), 2);
    assert!(index.is_ready());

    index.initialize().await;
    assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    assert_eq!(
        persisted_words(store.as_ref()).await,
        vec!["apple".to_string(), "run".to_string()]
    );
}

#[tokio::test]
async fn failed_rebuild_on_fresh_index_leaves_it_uninitialized() {
    let index = MasteryIndex::new(
        Arc::new(MemoryStore::new()),
        Arc::new(CountingSource::failing()),
    );

    assert!(index.rebuild().await.is_err());
    assert!(!index.is_ready());
}

#[tokio::test]
async fn update_during_rebuild_is_replayed() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let index = MasteryIndex::new(store.clone(), Arc::new(CountingSource::new(&["apple"])));
    index.initialize().await;

    let toggle = async {
        tokio::task::yield_now().await;
        index.update("pear", true).await;
    };
    let (rebuilt, ()) = tokio::join!(index.rebuild(), toggle);
    rebuilt.expect("rebuild");

    assert!(index.is_mastered("apple"));
    assert!(index.is_mastered("pear"));
    assert_eq!(
        persisted_words(store.as_ref()).await,
        vec!["apple".to_string(), "pear".to_string()]
    );
}

#[derive(Debug, Clone)]
struct Toggle {
    collection: usize,
    word: usize,
    mastered: bool,
}

fn toggles() -> impl Strategy<Value = Vec<Toggle>> {
    prop::collection::vec(
        (0usize..3, 0usize..4, any::<bool>()).prop_map(|(collection, word, mastered)| Toggle {
            collection,
            word,
            mastered,
        }),
        0..24,
    )
}

const WORDS: [&str; 4] = ["apple", "run", "book", "tree"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn proptest_index_agrees_with_rescan(steps in toggles()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let backing: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
            let collections = Arc::new(CollectionStore::new(backing.clone()));
            let index = MasteryIndex::new(backing, collections.clone());
            index.initialize().await;

            let mut ids = Vec::new();
            for name in ["a", "b", "c"] {
                let meta = collections.create_collection(name, "").await.expect("create");
                let defs = WORDS
                    .iter()
                    .map(|w| (simple_definition(w, "gloss"), EntryOrigin::Remote))
                    .collect();
                collections.add_entries(meta.id, defs).await.expect("add");
                ids.push(meta.id);
            }

            for step in &steps {
                let collection_id = ids[step.collection];
                let word = WORDS[step.word];
                let entry = collections
                    .find_entry(collection_id, word)
                    .await
                    .expect("find")
                    .expect("entry");
                collections
                    .set_mastered(collection_id, entry.id, step.mastered)
                    .await
                    .expect("set");
                // Same reconciliation the library service performs.
                let still_mastered = !collections
                    .collections_with_mastered(word)
                    .await
                    .expect("scan")
                    .is_empty();
                index.update(word, still_mastered).await;
            }

            let incremental: Vec<bool> = WORDS.iter().map(|w| index.is_mastered(w)).collect();
            index.rebuild().await.expect("rebuild");
            let rescanned: Vec<bool> = WORDS.iter().map(|w| index.is_mastered(w)).collect();
            assert_eq!(incremental, rescanned);
        });
    }
}
