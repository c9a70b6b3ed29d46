use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Mutex as AsyncMutex};
use wordbook_dictionary::normalize_word;
use wordbook_kv_store::{get_json, keys, set_json, DurableStore, StoreError};

/// Ground truth the mastery index is derived from.
#[async_trait]
pub trait MasterySource: Send + Sync {
    /// Every normalized word mastered in at least one collection.
    async fn scan_mastered(&self) -> Result<BTreeSet<String>>;
}

enum InitState {
    Uninitialized,
    /// A scan is in flight; waiters subscribe to its completion.
    Initializing(watch::Receiver<bool>),
    Ready,
}

enum InitRole {
    Leader(watch::Sender<bool>),
    Waiter(watch::Receiver<bool>),
    Done,
}

struct Inner {
    init: InitState,
    words: HashSet<String>,
    /// Changes recorded while a load or rescan is in flight, replayed on top
    /// of its result so they are not lost to the swap.
    journal: Vec<(String, bool)>,
    rescans: usize,
}

impl Inner {
    fn is_ready(&self) -> bool {
        matches!(self.init, InitState::Ready)
    }

    fn journaling(&self) -> bool {
        !self.is_ready() || self.rescans > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MasteryStats {
    pub total: usize,
    pub initialized: bool,
}

/// O(1) "is this word mastered anywhere" lookups.
///
/// Best-effort cache of the OR over all collections. Persisted under
/// `mastery-index` after every change; when it drifts (a failed second write in
/// a multi-key flow), [`MasteryIndex::rebuild`] rescans the collections.
///
/// Updates are applied in memory at any time. Those arriving before the index
/// is ready are journaled and replayed over the loaded or scanned set.
pub struct MasteryIndex {
    store: Arc<dyn DurableStore>,
    source: Arc<dyn MasterySource>,
    inner: Mutex<Inner>,
    /// Held across each snapshot write so the last write carries the latest set.
    persist_lock: AsyncMutex<()>,
}

impl MasteryIndex {
    pub fn new(store: Arc<dyn DurableStore>, source: Arc<dyn MasterySource>) -> Self {
        Self {
            store,
            source,
            inner: Mutex::new(Inner {
                init: InitState::Uninitialized,
                words: HashSet::new(),
                journal: Vec::new(),
                rescans: 0,
            }),
            persist_lock: AsyncMutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("mastery index mutex poisoned")
    }

    /// Loads the persisted index, or scans every collection when there is none.
    ///
    /// Concurrent callers share one in-flight load; callers arriving after it
    /// finished return immediately. Never fails: a failed scan leaves the index
    /// empty but ready.
    pub async fn initialize(&self) {
        loop {
            match self.claim_role() {
                InitRole::Done => return,
                InitRole::Waiter(mut rx) => {
                    if rx.wait_for(|ready| *ready).await.is_ok() {
                        return;
                    }
                    // The loading call was dropped before finishing; try again.
                }
                InitRole::Leader(tx) => {
                    let mut guard = ResetOnDrop {
                        inner: &self.inner,
                        armed: true,
                    };
                    let (base, scanned) = self.load_or_scan().await;
                    let (count, replayed) = self.install(base, true);
                    guard.armed = false;
                    let _ = tx.send(true);
                    if replayed > 0 {
                        log::debug!("Replayed {replayed} mastery changes recorded during load");
                    }
                    if scanned || replayed > 0 {
                        self.persist_current().await;
                    }
                    log::info!("Mastery index ready ({count} words)");
                    return;
                }
            }
        }
    }

    fn claim_role(&self) -> InitRole {
        let mut inner = self.lock();
        match &inner.init {
            InitState::Ready => InitRole::Done,
            InitState::Initializing(rx) => InitRole::Waiter(rx.clone()),
            InitState::Uninitialized => {
                let (tx, rx) = watch::channel(false);
                inner.init = InitState::Initializing(rx);
                InitRole::Leader(tx)
            }
        }
    }

    /// The base set plus whether it came from a scan and should be written back.
    async fn load_or_scan(&self) -> (HashSet<String>, bool) {
        match get_json::<Vec<String>>(self.store.as_ref(), keys::MASTERY_INDEX).await {
            Ok(Some(words)) => {
                let words = words
                    .iter()
                    .map(|word| normalize_word(word))
                    .filter(|word| !word.is_empty())
                    .collect();
                return (words, false);
            }
            Ok(None) => log::debug!("No persisted mastery index; scanning collections"),
            Err(StoreError::SerializationError(err)) => {
                log::warn!("Persisted mastery index is corrupt ({err}); scanning collections");
            }
            Err(err) => log::warn!("Failed to read mastery index ({err}); scanning collections"),
        }

        match self.source.scan_mastered().await {
            Ok(words) => (words.into_iter().collect(), true),
            Err(err) => {
                log::error!("Mastery scan failed, starting with an empty index: {err}");
                (HashSet::new(), false)
            }
        }
    }

    /// Swaps in `base` with the journal replayed on top. Returns the new size
    /// and the number of replayed changes.
    fn install(&self, mut base: HashSet<String>, mark_ready: bool) -> (usize, usize) {
        let mut inner = self.lock();
        for (word, mastered) in &inner.journal {
            apply_change(&mut base, word, *mastered);
        }
        let replayed = inner.journal.len();
        inner.words = base;
        if mark_ready {
            inner.init = InitState::Ready;
        }
        if inner.rescans == 0 {
            inner.journal.clear();
        }
        (inner.words.len(), replayed)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().is_ready()
    }

    /// `false` (with a warning) until [`Self::initialize`] has completed.
    #[must_use]
    pub fn is_mastered(&self, word: &str) -> bool {
        let inner = self.lock();
        if !inner.is_ready() {
            log::warn!("Mastery index queried before initialization; reporting '{word}' as not mastered");
            return false;
        }
        inner.words.contains(&normalize_word(word))
    }

    /// Records a change and persists the index. Persistence failures are logged.
    pub async fn update(&self, word: &str, mastered: bool) {
        self.update_many(&[(word.to_string(), mastered)]).await;
    }

    pub async fn update_many(&self, changes: &[(String, bool)]) {
        let changes: Vec<(String, bool)> = changes
            .iter()
            .map(|(word, mastered)| (normalize_word(word), *mastered))
            .filter(|(word, _)| !word.is_empty())
            .collect();
        if changes.is_empty() {
            return;
        }

        let changed = {
            let mut inner = self.lock();
            if inner.journaling() {
                inner.journal.extend(changes.iter().cloned());
            }
            let mut changed = false;
            for (word, mastered) in &changes {
                changed |= apply_change(&mut inner.words, word, *mastered);
            }
            if !inner.is_ready() {
                log::debug!(
                    "Mastery index not ready; {} changes recorded for replay",
                    changes.len()
                );
                return;
            }
            changed
        };
        if changed {
            self.persist_current().await;
        }
    }

    pub async fn remove(&self, word: &str) {
        self.update(word, false).await;
    }

    /// Discards the current contents and rescans every collection.
    ///
    /// An in-flight [`Self::initialize`] is awaited first; on a fresh index the
    /// rescan takes the place of the initial load. Changes recorded while the
    /// scan runs are replayed over its result.
    pub async fn rebuild(&self) -> Result<usize> {
        loop {
            match self.claim_role() {
                InitRole::Done => break,
                InitRole::Waiter(mut rx) => {
                    // A dropped loader leaves the state Uninitialized; the next
                    // claim then takes over.
                    let _ = rx.wait_for(|ready| *ready).await;
                }
                InitRole::Leader(tx) => {
                    let mut guard = ResetOnDrop {
                        inner: &self.inner,
                        armed: true,
                    };
                    let words: HashSet<String> =
                        self.source.scan_mastered().await?.into_iter().collect();
                    let (count, _) = self.install(words, true);
                    guard.armed = false;
                    let _ = tx.send(true);
                    self.persist_current().await;
                    log::info!("Rebuilt mastery index ({count} words)");
                    return Ok(count);
                }
            }
        }

        let _rescan = RescanGuard::enter(&self.inner);
        let words: HashSet<String> = self.source.scan_mastered().await?.into_iter().collect();
        let (count, _) = self.install(words, false);
        self.persist_current().await;
        log::info!("Rebuilt mastery index ({count} words)");
        Ok(count)
    }

    /// Sorted snapshot of the mastered words; empty until ready.
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        let inner = self.lock();
        if !inner.is_ready() {
            return Vec::new();
        }
        sorted_words(&inner.words)
    }

    #[must_use]
    pub fn stats(&self) -> MasteryStats {
        let inner = self.lock();
        let initialized = inner.is_ready();
        MasteryStats {
            total: if initialized { inner.words.len() } else { 0 },
            initialized,
        }
    }

    /// Writes the current set. The snapshot is taken after the persist lock is
    /// acquired, so whichever writer finishes last stores the newest state.
    async fn persist_current(&self) {
        let _permit = self.persist_lock.lock().await;
        let snapshot = {
            let inner = self.lock();
            if !inner.is_ready() {
                return;
            }
            sorted_words(&inner.words)
        };
        if let Err(err) = set_json(self.store.as_ref(), keys::MASTERY_INDEX, &snapshot).await {
            log::error!("Failed to persist mastery index: {err}");
        }
    }
}

fn apply_change(words: &mut HashSet<String>, word: &str, mastered: bool) -> bool {
    if mastered {
        words.insert(word.to_string())
    } else {
        words.remove(word)
    }
}

fn sorted_words(words: &HashSet<String>) -> Vec<String> {
    let mut sorted: Vec<String> = words.iter().cloned().collect();
    sorted.sort();
    sorted
}

/// Returns the state to `Uninitialized` if the loading call is dropped midway.
/// Journaled changes are kept for the next loader.
struct ResetOnDrop<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut inner) = self.inner.lock() {
                inner.init = InitState::Uninitialized;
            }
        }
    }
}

/// Marks a rescan of a ready index; the journal is dropped once none remain.
struct RescanGuard<'a> {
    inner: &'a Mutex<Inner>,
}

impl<'a> RescanGuard<'a> {
    fn enter(inner: &'a Mutex<Inner>) -> Self {
        if let Ok(mut guard) = inner.lock() {
            guard.rescans += 1;
        }
        Self { inner }
    }
}

impl Drop for RescanGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rescans = inner.rescans.saturating_sub(1);
            if inner.rescans == 0 && inner.is_ready() {
                inner.journal.clear();
            }
        }
    }
}
