use crate::error::{CollectionError, Result};
use crate::model::UserDefaultEntry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wordbook_dictionary::{clamp_difficulty, normalize_word};
use wordbook_kv_store::{get_json, keys, unix_now_ms, DurableStore, TransactionalWriter};

pub type UserDefaults = BTreeMap<String, UserDefaultEntry>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserDefaultsStatistics {
    pub total: usize,
    pub oldest_modified_unix_ms: Option<u64>,
    pub latest_modified_unix_ms: Option<u64>,
}

/// Global per-word overrides, stored as one map under `user-defaults`.
///
/// Reads go through an in-process copy that every successful write refreshes.
pub struct UserDefaultsStore {
    store: Arc<dyn DurableStore>,
    writer: TransactionalWriter,
    cache: RwLock<Option<UserDefaults>>,
}

impl UserDefaultsStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        let writer = TransactionalWriter::new(store.clone());
        Self {
            store,
            writer,
            cache: RwLock::new(None),
        }
    }

    /// The whole override map.
    pub async fn snapshot(&self) -> Result<UserDefaults> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let loaded = get_json::<UserDefaults>(self.store.as_ref(), keys::USER_DEFAULTS)
            .await?
            .unwrap_or_default();
        *self.cache.write().await = Some(loaded.clone());
        Ok(loaded)
    }

    pub async fn get(&self, word: &str) -> Result<Option<UserDefaultEntry>> {
        Ok(self.snapshot().await?.remove(&normalize_word(word)))
    }

    pub async fn all(&self) -> Result<Vec<UserDefaultEntry>> {
        Ok(self.snapshot().await?.into_values().collect())
    }

    /// Inserts or replaces the override for `entry.word`, stamping
    /// `last_modified_unix_ms`.
    pub async fn save(&self, mut entry: UserDefaultEntry) -> Result<UserDefaultEntry> {
        let word = normalize_word(&entry.word);
        if word.is_empty() {
            return Err(CollectionError::Invalid("word must not be empty".into()));
        }
        entry.word = word.clone();
        entry.difficulty = clamp_difficulty(i64::from(entry.difficulty));
        entry.last_modified_unix_ms = unix_now_ms();

        let saved = entry.clone();
        let written = self
            .writer
            .apply_json(keys::USER_DEFAULTS, |current: Option<UserDefaults>| {
                let mut defaults = current.unwrap_or_default();
                defaults.insert(word, entry);
                Ok::<_, CollectionError>(defaults)
            })
            .await?;
        *self.cache.write().await = Some(written);
        log::debug!("Saved user default for '{}'", saved.word);
        Ok(saved)
    }

    /// Returns whether an override existed.
    pub async fn delete(&self, word: &str) -> Result<bool> {
        let word = normalize_word(word);
        let mut existed = false;
        let written = self
            .writer
            .apply_json(keys::USER_DEFAULTS, |current: Option<UserDefaults>| {
                let mut defaults = current.unwrap_or_default();
                existed = defaults.remove(&word).is_some();
                Ok::<_, CollectionError>(defaults)
            })
            .await?;
        *self.cache.write().await = Some(written);
        Ok(existed)
    }

    /// Removes every override. Returns how many there were.
    pub async fn clear(&self) -> Result<usize> {
        let count = self.snapshot().await?.len();
        self.store.remove(keys::USER_DEFAULTS).await?;
        *self.cache.write().await = Some(UserDefaults::new());
        log::info!("Cleared {count} user defaults");
        Ok(count)
    }

    pub async fn statistics(&self) -> Result<UserDefaultsStatistics> {
        let defaults = self.snapshot().await?;
        let modified = defaults.values().map(|entry| entry.last_modified_unix_ms);
        Ok(UserDefaultsStatistics {
            total: defaults.len(),
            oldest_modified_unix_ms: modified.clone().min(),
            latest_modified_unix_ms: modified.max(),
        })
    }

    /// Drops the in-process copy so the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordbook_dictionary::testing::simple_definition;
    use wordbook_kv_store::MemoryStore;

    #[tokio::test]
    async fn save_normalizes_and_stamps() {
        let defaults = UserDefaultsStore::new(Arc::new(MemoryStore::new()));
        let mut entry = UserDefaultEntry::from_definition(&simple_definition(" Run ", "달리다"));
        entry.difficulty = 9;

        let saved = defaults.save(entry).await.expect("save");

        assert_eq!(saved.word, "run");
        assert_eq!(saved.difficulty, 5);
        assert!(saved.last_modified_unix_ms > 0);
        assert_eq!(defaults.get("RUN").await.expect("get"), Some(saved));
    }

    #[tokio::test]
    async fn invalidate_rereads_the_store() {
        let store = Arc::new(MemoryStore::new());
        let defaults = UserDefaultsStore::new(store.clone());
        assert!(defaults.all().await.expect("all").is_empty());

        // Another writer updates the key behind the cache.
        let other = UserDefaultsStore::new(store);
        other
            .save(UserDefaultEntry::from_definition(&simple_definition("apple", "사과")))
            .await
            .expect("save");

        assert!(defaults.get("apple").await.expect("get").is_none());
        defaults.invalidate().await;
        assert!(defaults.get("apple").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn statistics_and_clear() {
        let defaults = UserDefaultsStore::new(Arc::new(MemoryStore::new()));
        for word in ["a", "b"] {
            defaults
                .save(UserDefaultEntry::from_definition(&simple_definition(word, "x")))
                .await
                .expect("save");
        }

        let stats = defaults.statistics().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert!(stats.oldest_modified_unix_ms <= stats.latest_modified_unix_ms);

        assert!(defaults.delete("a").await.expect("delete"));
        assert!(!defaults.delete("a").await.expect("delete"));
        assert_eq!(defaults.clear().await.expect("clear"), 1);
        assert_eq!(defaults.statistics().await.expect("stats").total, 0);
    }
}
