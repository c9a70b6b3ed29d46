use crate::types::{normalize_word, Provenance, WordDefinition};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

/// Bounded in-process map from normalized word to definition.
///
/// Least recently used entries are evicted once `capacity` is reached.
/// Values read back are always tagged [`Provenance::Memory`].
pub struct MemoryIndex {
    entries: Mutex<LruCache<String, WordDefinition>>,
}

impl MemoryIndex {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, word: &str) -> Option<WordDefinition> {
        let key = normalize_word(word);
        self.entries
            .lock()
            .expect("memory index mutex poisoned")
            .get(&key)
            .cloned()
            .map(|def| def.with_provenance(Provenance::Memory))
    }

    pub fn insert(&self, definition: &WordDefinition) {
        let key = definition.normalized_word();
        if key.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().expect("memory index mutex poisoned");
        if let Some((evicted, _)) = entries.push(key.clone(), definition.clone()) {
            if evicted != key {
                log::debug!("Memory index evicted '{evicted}'");
            }
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries
            .lock()
            .expect("memory index mutex poisoned")
            .contains(&normalize_word(word))
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("memory index mutex poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory index mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .expect("memory index mutex poisoned")
            .cap()
            .get()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}
