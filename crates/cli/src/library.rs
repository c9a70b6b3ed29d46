use crate::context::AppContext;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use wordbook_collections::{
    view_all, AddOutcome, CandidateFilter, CollectionEntry, CollectionError, CollectionId,
    CollectionStore, EffectiveWord, EntryId, EntryOrigin, MasteryIndex, UserDefaultsStore,
};
use wordbook_dictionary::{
    normalize_word, BundledCatalog, DefinitionResolver, QuotaStatus, ResolveReport, UsageTracker,
    WordDefinition,
};

type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AddWordsReport {
    pub saved: Vec<CollectionEntry>,
    /// Already present in the collection.
    pub skipped: Vec<String>,
    /// No definition found in any tier.
    pub missing: Vec<String>,
    pub quota_exceeded: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DefineReport {
    #[serde(flatten)]
    pub resolved: ResolveReport,
    pub quota_exceeded: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub candidates: Vec<String>,
    pub skipped_mastered: Vec<String>,
    pub definitions: Vec<WordDefinition>,
    pub quota_exceeded: bool,
}

/// Flows that touch more than one persisted key.
///
/// Collection writes and mastery index updates are independent: the
/// collection key is written first, then the index. If the index update is
/// lost, [`MasteryIndex::rebuild`] brings it back in line.
pub struct Library {
    resolver: Arc<DefinitionResolver>,
    catalog: Arc<BundledCatalog>,
    usage: Arc<UsageTracker>,
    defaults: Arc<UserDefaultsStore>,
    collections: Arc<CollectionStore>,
    mastery: Arc<MasteryIndex>,
    filter: CandidateFilter,
    daily_limit: u64,
}

impl Library {
    pub fn new(context: &AppContext, filter: CandidateFilter) -> Self {
        Self {
            resolver: context.resolver.clone(),
            catalog: context.catalog.clone(),
            usage: context.usage.clone(),
            defaults: context.defaults.clone(),
            collections: context.collections.clone(),
            mastery: context.mastery.clone(),
            filter,
            daily_limit: context.config.usage.daily_limit,
        }
    }

    /// Advisory quota check. A failure to read the counter is not a reason
    /// to block lookups.
    pub async fn quota(&self) -> Option<QuotaStatus> {
        match self.usage.check(self.daily_limit).await {
            Ok(status) => Some(status),
            Err(err) => {
                log::warn!("Failed to read usage counter: {err}");
                None
            }
        }
    }

    async fn remote_allowed(&self) -> bool {
        match self.quota().await {
            Some(status) if status.exceeded => {
                log::warn!(
                    "Daily generation quota reached ({}/{}); using local definitions only",
                    status.used,
                    status.limit
                );
                false
            }
            _ => true,
        }
    }

    async fn resolve(&self, words: &[String]) -> (ResolveReport, bool) {
        if self.remote_allowed().await {
            (self.resolver.resolve_with_stats(words).await, false)
        } else {
            (self.resolver.resolve_local_with_stats(words).await, true)
        }
    }

    pub async fn define(&self, words: &[String]) -> DefineReport {
        let (resolved, quota_exceeded) = self.resolve(words).await;
        DefineReport {
            resolved,
            quota_exceeded,
        }
    }

    /// Adds `words` to a collection. User defaults are used as the snapshot
    /// when present; everything else goes through the resolver.
    pub async fn add_words(&self, collection_id: CollectionId, words: &[String]) -> Result<AddWordsReport> {
        if self.collections.get_collection(collection_id).await?.is_none() {
            return Err(CollectionError::collection_not_found(collection_id));
        }

        let mut seen = HashSet::new();
        let words: Vec<String> = words
            .iter()
            .map(|word| normalize_word(word))
            .filter(|word| !word.is_empty() && seen.insert(word.clone()))
            .collect();

        let existing: HashSet<String> = self
            .collections
            .entries(collection_id)
            .await?
            .into_iter()
            .map(|entry| entry.word)
            .collect();
        let defaults = self.defaults.snapshot().await?;

        let mut report = AddWordsReport::default();
        let mut prepared: Vec<(WordDefinition, EntryOrigin)> = Vec::with_capacity(words.len());
        let mut to_resolve = Vec::new();
        for word in words {
            if existing.contains(&word) {
                report.skipped.push(word);
                continue;
            }
            match defaults.get(&word) {
                Some(default) => prepared.push((default.to_definition(), EntryOrigin::UserDefault)),
                None => to_resolve.push(word),
            }
        }

        if !to_resolve.is_empty() {
            let (resolved, quota_exceeded) = self.resolve(&to_resolve).await;
            report.quota_exceeded = quota_exceeded;
            let found: HashSet<String> = resolved
                .definitions
                .iter()
                .map(WordDefinition::normalized_word)
                .collect();
            report.missing = to_resolve
                .into_iter()
                .filter(|word| !found.contains(word))
                .collect();
            prepared.extend(resolved.definitions.into_iter().map(|definition| {
                let origin = EntryOrigin::for_definition(&definition, &self.catalog);
                (definition, origin)
            }));
        }

        if !prepared.is_empty() {
            for outcome in self.collections.add_entries(collection_id, prepared).await? {
                match outcome {
                    AddOutcome::Added { entry } => report.saved.push(entry),
                    AddOutcome::Duplicate { existing } => report.skipped.push(existing.word),
                }
            }
        }
        log::info!(
            "Collection {collection_id}: saved {}, skipped {}, missing {}",
            report.saved.len(),
            report.skipped.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// Marks an entry (un)mastered and updates the index. Unmarking keeps the
    /// word in the index while another collection still has it mastered.
    pub async fn set_mastered(
        &self,
        collection_id: CollectionId,
        entry_id: EntryId,
        mastered: bool,
    ) -> Result<CollectionEntry> {
        let entry = self
            .collections
            .set_mastered(collection_id, entry_id, mastered)
            .await?;
        if mastered {
            self.mastery.update(&entry.word, true).await;
        } else {
            self.reconcile_mastery(&[entry.word.clone()]).await;
        }
        Ok(entry)
    }

    pub async fn remove_entry(
        &self,
        collection_id: CollectionId,
        entry_id: EntryId,
    ) -> Result<CollectionEntry> {
        let removed = self.collections.remove_entry(collection_id, entry_id).await?;
        if removed.progress.mastered {
            self.reconcile_mastery(&[removed.word.clone()]).await;
        }
        Ok(removed)
    }

    pub async fn delete_collection(&self, collection_id: CollectionId) -> Result<Vec<CollectionEntry>> {
        let removed = self.collections.delete_collection(collection_id).await?;
        let mastered: Vec<String> = removed
            .iter()
            .filter(|entry| entry.progress.mastered)
            .map(|entry| entry.word.clone())
            .collect();
        self.reconcile_mastery(&mastered).await;
        Ok(removed)
    }

    /// Every entry of a collection as the user sees it.
    pub async fn view_collection(&self, collection_id: CollectionId) -> Result<Vec<EffectiveWord>> {
        if self.collections.get_collection(collection_id).await?.is_none() {
            return Err(CollectionError::collection_not_found(collection_id));
        }
        let defaults = self.defaults.snapshot().await?;
        let entries = self.collections.entries(collection_id).await?;
        Ok(view_all(collection_id, &entries, &defaults))
    }

    /// Filters raw text-detection output and resolves what is left.
    pub async fn scan_candidates(&self, raw: &[String], skip_mastered: bool) -> ScanReport {
        let all = self.filter.filter(raw);
        let (candidates, skipped_mastered): (Vec<String>, Vec<String>) = if skip_mastered {
            all.into_iter().partition(|word| !self.mastery.is_mastered(word))
        } else {
            (all, Vec::new())
        };
        let (resolved, quota_exceeded) = self.resolve(&candidates).await;
        ScanReport {
            candidates,
            skipped_mastered,
            definitions: resolved.definitions,
            quota_exceeded,
        }
    }

    async fn reconcile_mastery(&self, words: &[String]) {
        let mut changes = Vec::with_capacity(words.len());
        for word in words {
            match self.collections.collections_with_mastered(word).await {
                Ok(ids) => changes.push((word.clone(), !ids.is_empty())),
                Err(err) => log::warn!(
                    "Could not check other collections for '{word}' ({err}); run `wordbook mastery rebuild`"
                ),
            }
        }
        if !changes.is_empty() {
            self.mastery.update_many(&changes).await;
        }
    }
}
