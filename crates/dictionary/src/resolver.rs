use crate::catalog::BundledCatalog;
use crate::error::Result;
use crate::memory_index::MemoryIndex;
use crate::persistent_cache::{CacheStats, PersistentCache};
use crate::remote::{RemoteDefinitionClient, RemoteResult};
use crate::types::{normalize_word, Provenance, WordDefinition};
use crate::usage::UsageTracker;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of one [`DefinitionResolver::resolve_with_stats`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// One definition per distinct normalized input, in first-seen order.
    /// Words nobody could define are absent.
    pub definitions: Vec<WordDefinition>,
    pub memory_hits: usize,
    pub bundled_hits: usize,
    pub persistent_hits: usize,
    /// Words sent in the single remote batch.
    pub remote_requested: usize,
    pub remote_resolved: usize,
    pub remote_failed: usize,
}

impl ResolveReport {
    #[must_use]
    pub fn fast_hits(&self) -> usize {
        self.memory_hits + self.bundled_hits + self.persistent_hits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStatus {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub bundled_entries: usize,
}

/// Tiered definition lookup.
///
/// Each word is looked up in the memory index, the bundled catalog and the
/// persistent cache in that order. Everything still missing after the scan is
/// sent in exactly one remote batch. Two concurrent calls never share a batch:
/// overlapping misses are requested twice.
pub struct DefinitionResolver {
    memory: Arc<MemoryIndex>,
    catalog: Arc<BundledCatalog>,
    cache: Arc<PersistentCache>,
    remote: Arc<dyn RemoteDefinitionClient>,
    usage: Arc<UsageTracker>,
}

impl DefinitionResolver {
    pub fn new(
        memory: Arc<MemoryIndex>,
        catalog: Arc<BundledCatalog>,
        cache: Arc<PersistentCache>,
        remote: Arc<dyn RemoteDefinitionClient>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            memory,
            catalog,
            cache,
            remote,
            usage,
        }
    }

    pub async fn resolve<S>(&self, words: &[S]) -> Vec<WordDefinition>
    where
        S: AsRef<str> + Sync,
    {
        self.resolve_with_stats(words).await.definitions
    }

    pub async fn lookup(&self, word: &str) -> Option<WordDefinition> {
        self.resolve(&[word]).await.into_iter().next()
    }

    /// Resolves `words` and reports where each hit came from.
    ///
    /// Remote transport failures and per-word remote errors are logged and
    /// leave the affected words out of the result.
    pub async fn resolve_with_stats<S>(&self, words: &[S]) -> ResolveReport
    where
        S: AsRef<str> + Sync,
    {
        self.resolve_tiers(words, true).await
    }

    /// Fast tiers only. Used when the advisory quota says the remote call
    /// should be skipped; misses are reported in `remote_failed`.
    pub async fn resolve_local_with_stats<S>(&self, words: &[S]) -> ResolveReport
    where
        S: AsRef<str> + Sync,
    {
        self.resolve_tiers(words, false).await
    }

    async fn resolve_tiers<S>(&self, words: &[S], allow_remote: bool) -> ResolveReport
    where
        S: AsRef<str> + Sync,
    {
        let order = dedupe_normalized(words);
        let mut report = ResolveReport::default();
        let mut found: HashMap<String, WordDefinition> = HashMap::with_capacity(order.len());
        let mut misses: Vec<String> = Vec::new();

        for word in &order {
            if let Some(hit) = self.memory.get(word) {
                report.memory_hits += 1;
                found.insert(word.clone(), hit);
                continue;
            }
            if let Some(hit) = self.catalog.get(word) {
                report.bundled_hits += 1;
                self.memory.insert(&hit);
                found.insert(word.clone(), hit);
                continue;
            }
            match self.cache.get(word).await {
                Ok(Some(hit)) => {
                    report.persistent_hits += 1;
                    self.memory.insert(&hit);
                    found.insert(word.clone(), hit);
                    continue;
                }
                Ok(None) => {}
                Err(err) => log::warn!("Persistent cache read for '{word}' failed: {err}"),
            }
            misses.push(word.clone());
        }

        if !misses.is_empty() && allow_remote {
            report.remote_requested = misses.len();
            let fetched = self.fetch_remote(&misses).await;
            report.remote_resolved = fetched.len();
            report.remote_failed = misses.len() - fetched.len();
            found.extend(fetched);
        } else if !misses.is_empty() {
            log::debug!("Skipping remote lookup of {} words", misses.len());
            report.remote_failed = misses.len();
        }

        self.record_stats(&report, order.len()).await;

        report.definitions = order
            .iter()
            .filter_map(|word| found.remove(word))
            .collect();
        report
    }

    /// Issues the single batch call for `misses` and stores what comes back.
    async fn fetch_remote(&self, misses: &[String]) -> HashMap<String, WordDefinition> {
        let mut fetched = HashMap::new();
        let batch = match self.remote.generate(misses).await {
            Ok(batch) => batch,
            Err(err) => {
                log::warn!(
                    "Remote lookup of {} words failed, returning local results only: {err}",
                    misses.len()
                );
                return fetched;
            }
        };

        if batch.gemini_calls > 0 {
            if let Err(err) = self.usage.record(batch.gemini_calls).await {
                log::warn!("Failed to record usage: {err}");
            }
        }

        let requested: HashSet<&str> = misses.iter().map(String::as_str).collect();
        for result in batch.results {
            if let RemoteResult::Error { word, message } = &result {
                log::warn!("Remote lookup of '{word}' failed: {message}");
                continue;
            }
            let mut key = normalize_word(result.word());
            let Some(mut definition) = result.into_definition() else {
                continue;
            };
            if key.is_empty() {
                key = definition.normalized_word();
            }
            if !requested.contains(key.as_str()) {
                log::debug!("Ignoring unrequested remote result '{key}'");
                continue;
            }
            if definition.word.trim().is_empty() {
                definition.word = key.clone();
            }
            definition.provenance = Provenance::Remote;

            self.memory.insert(&definition);
            if let Err(err) = self.cache.put(&definition).await {
                log::warn!("Failed to persist definition of '{key}': {err}");
            }
            fetched.insert(key, definition);
        }
        fetched
    }

    async fn record_stats(&self, report: &ResolveReport, requested: usize) {
        if requested == 0 {
            return;
        }
        if let Err(err) = self
            .cache
            .record_stats(
                requested as u64,
                report.fast_hits() as u64,
                report.remote_requested as u64,
            )
            .await
        {
            log::debug!("Failed to update cache stats: {err}");
        }
    }

    /// Clears the memory and persistent tiers. The bundled catalog is immutable.
    pub async fn clear_cache(&self) -> Result<usize> {
        self.memory.clear();
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    /// Preloads persisted definitions into the memory index.
    pub async fn warm(&self, limit: usize) -> Result<usize> {
        self.cache.warm(&self.memory, limit).await
    }

    #[must_use]
    pub fn status(&self) -> ResolverStatus {
        ResolverStatus {
            memory_entries: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            bundled_entries: self.catalog.len(),
        }
    }
}

fn dedupe_normalized<S: AsRef<str>>(words: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .iter()
        .map(|word| normalize_word(word.as_ref()))
        .filter(|word| !word.is_empty() && seen.insert(word.clone()))
        .collect()
}
