use crate::error::Result;
use crate::memory_index::MemoryIndex;
use crate::types::{normalize_word, Provenance, WordDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wordbook_kv_store::{get_json, keys, set_json, unix_now_ms, DurableStore, TransactionalWriter};

pub const DEFAULT_WARM_LIMIT: usize = 100;

/// Value stored under `cache:{word}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDefinition {
    pub definition: WordDefinition,
    pub cached_at_unix_ms: u64,
}

/// Cumulative resolver accounting stored under `cache-stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub fast_hits: u64,
    pub remote_requested: u64,
}

impl CacheStats {
    /// Share of requested words served without the remote call.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.fast_hits as f64 / self.total_requests as f64
    }
}

/// Durable copy of remotely fetched definitions.
pub struct PersistentCache {
    store: Arc<dyn DurableStore>,
    writer: TransactionalWriter,
}

impl PersistentCache {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        let writer = TransactionalWriter::new(store.clone());
        Self { store, writer }
    }

    /// Returns the cached definition tagged as [`Provenance::PersistentCache`].
    ///
    /// A corrupt entry is logged and treated as a miss.
    pub async fn get(&self, word: &str) -> Result<Option<WordDefinition>> {
        let key = normalize_word(word);
        if key.is_empty() {
            return Ok(None);
        }
        let cache_key = keys::cache_key(&key);
        match get_json::<CachedDefinition>(self.store.as_ref(), &cache_key).await {
            Ok(hit) => Ok(hit.map(|cached| {
                cached
                    .definition
                    .with_provenance(Provenance::PersistentCache)
            })),
            Err(wordbook_kv_store::StoreError::SerializationError(err)) => {
                log::warn!("Ignoring corrupt cache entry '{cache_key}': {err}");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn put(&self, definition: &WordDefinition) -> Result<()> {
        let key = definition.normalized_word();
        if key.is_empty() {
            return Ok(());
        }
        let value = CachedDefinition {
            definition: definition.clone(),
            cached_at_unix_ms: unix_now_ms(),
        };
        set_json(self.store.as_ref(), &keys::cache_key(&key), &value).await?;
        Ok(())
    }

    /// Removes every `cache:*` key and the accounting key. Returns the number
    /// of cached definitions removed.
    pub async fn clear(&self) -> Result<usize> {
        let cached = self.cached_keys().await?;
        for key in &cached {
            self.store.remove(key).await?;
        }
        self.store.remove(keys::CACHE_STATS).await?;
        log::info!("Cleared {} persisted definitions", cached.len());
        Ok(cached.len())
    }

    /// Preloads up to `limit` persisted definitions into `memory`.
    pub async fn warm(&self, memory: &MemoryIndex, limit: usize) -> Result<usize> {
        if limit == 0 {
            return Ok(0);
        }
        let mut cached = self.cached_keys().await?;
        cached.sort();

        let mut loaded = 0usize;
        for key in cached {
            if loaded >= limit {
                break;
            }
            let Some(word) = keys::parse_cache_key(&key) else {
                continue;
            };
            if let Some(definition) = self.get(word).await? {
                memory.insert(&definition);
                loaded += 1;
            }
        }
        log::debug!("Warmed memory index with {loaded} persisted definitions");
        Ok(loaded)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.cached_keys().await?.len())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        match get_json::<CacheStats>(self.store.as_ref(), keys::CACHE_STATS).await {
            Ok(stats) => Ok(stats.unwrap_or_default()),
            Err(wordbook_kv_store::StoreError::SerializationError(err)) => {
                log::warn!("Resetting corrupt cache stats: {err}");
                Ok(CacheStats::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Adds one resolve call's counters to the cumulative totals.
    pub async fn record_stats(
        &self,
        requested: u64,
        fast_hits: u64,
        remote_requested: u64,
    ) -> Result<CacheStats> {
        let updated = self
            .writer
            .apply_json(keys::CACHE_STATS, |current: Option<CacheStats>| {
                let mut stats = current.unwrap_or_default();
                stats.total_requests += requested;
                stats.fast_hits += fast_hits;
                stats.remote_requested += remote_requested;
                Ok::<_, crate::error::DictionaryError>(stats)
            })
            .await?;
        Ok(updated)
    }

    async fn cached_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|key| keys::parse_cache_key(key).is_some())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Meaning, PartOfSpeech};
    use wordbook_kv_store::MemoryStore;

    fn definition(word: &str) -> WordDefinition {
        WordDefinition {
            word: word.to_string(),
            pronunciation: String::new(),
            difficulty: 2,
            meanings: vec![Meaning {
                part_of_speech: PartOfSpeech::Noun,
                native: format!("{word}-gloss"),
                foreign: String::new(),
                examples: Vec::new(),
            }],
            usage_notes: None,
            provenance: Provenance::Remote,
        }
    }

    #[tokio::test]
    async fn put_then_get_retags_provenance() {
        let cache = PersistentCache::new(Arc::new(MemoryStore::new()));
        cache.put(&definition("apple")).await.expect("put");

        let hit = cache.get(" APPLE").await.expect("get").expect("hit");
        assert_eq!(hit.provenance, Provenance::PersistentCache);
        assert!(hit.same_content(&definition("apple")));
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&keys::cache_key("apple"), "{not json".to_string())
            .await
            .expect("set");
        let cache = PersistentCache::new(store);
        assert!(cache.get("apple").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn warm_respects_limit() {
        let cache = PersistentCache::new(Arc::new(MemoryStore::new()));
        for word in ["a", "b", "c"] {
            cache.put(&definition(word)).await.expect("put");
        }
        let memory = MemoryIndex::new(10);
        assert_eq!(cache.warm(&memory, 2).await.expect("warm"), 2);
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_entries_and_stats_only() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(keys::USER_DEFAULTS, "{}".to_string())
            .await
            .expect("set");
        let cache = PersistentCache::new(store.clone());
        cache.put(&definition("apple")).await.expect("put");
        cache.record_stats(3, 2, 1).await.expect("stats");

        assert_eq!(cache.clear().await.expect("clear"), 1);
        assert_eq!(cache.len().await.expect("len"), 0);
        assert_eq!(cache.stats().await.expect("stats"), CacheStats::default());
        assert!(store.get(keys::USER_DEFAULTS).await.expect("get").is_some());
    }
}
