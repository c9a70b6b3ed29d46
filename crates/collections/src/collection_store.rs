use crate::error::{CollectionError, Result};
use crate::exchange::{unique_import_name, ImportReport, SharedCollection};
use crate::mastery::MasterySource;
use crate::model::{
    AddOutcome, CollectionEntry, CollectionId, CollectionMeta, CollectionStatistics,
    CollectionUpdate, EntryId, EntryOrigin, EntryPatch,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use wordbook_dictionary::{clamp_difficulty, normalize_word, WordDefinition};
use wordbook_kv_store::{get_json, keys, unix_now_ms, DurableStore, TransactionalWriter};

pub const DEFAULT_COLLECTION_NAME: &str = "My Words";

/// Collections and their ordered entries.
///
/// Metadata lives under `collections`, entries under `collection:{id}`. Every
/// mutation is a single-key transaction; nothing here updates two keys
/// atomically.
///
/// Ids come from a persisted sequence (`id-sequence`) and are never handed
/// out twice, so a `collection:{id}` key orphaned by a failed delete can not
/// be inherited by a later collection.
pub struct CollectionStore {
    store: Arc<dyn DurableStore>,
    writer: TransactionalWriter,
}

impl CollectionStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        let writer = TransactionalWriter::new(store.clone());
        Self { store, writer }
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionMeta>> {
        Ok(get_json::<Vec<CollectionMeta>>(self.store.as_ref(), keys::COLLECTIONS)
            .await?
            .unwrap_or_default())
    }

    pub async fn get_collection(&self, id: CollectionId) -> Result<Option<CollectionMeta>> {
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .find(|meta| meta.id == id))
    }

    /// Creates a collection. Names are unique case-insensitively.
    pub async fn create_collection(&self, name: &str, description: &str) -> Result<CollectionMeta> {
        let name = validate_name(name)?;
        let description = description.trim().to_string();
        let first = self
            .reserve_ids(IdKind::Collection, self.highest_collection_id().await?, 1)
            .await?;
        let now = unix_now_ms();
        let mut created = None;

        self.writer
            .apply_json(keys::COLLECTIONS, |current: Option<Vec<CollectionMeta>>| {
                let mut metas = current.unwrap_or_default();
                ensure_unique_name(&metas, &name, None)?;
                let meta = CollectionMeta {
                    id: first.max(next_id(metas.iter().map(|meta| meta.id))),
                    name,
                    description,
                    is_default: false,
                    created_at_unix_ms: now,
                    updated_at_unix_ms: now,
                };
                created = Some(meta.clone());
                metas.push(meta);
                Ok::<_, CollectionError>(metas)
            })
            .await?;

        let meta = created.ok_or_else(|| CollectionError::Invalid("collection not created".into()))?;
        log::info!("Created collection {} '{}'", meta.id, meta.name);
        Ok(meta)
    }

    /// Returns the default collection, creating it on first use.
    pub async fn ensure_default_collection(&self) -> Result<CollectionMeta> {
        if let Some(existing) = self
            .list_collections()
            .await?
            .into_iter()
            .find(|meta| meta.is_default)
        {
            return Ok(existing);
        }

        let first = self
            .reserve_ids(IdKind::Collection, self.highest_collection_id().await?, 1)
            .await?;
        let now = unix_now_ms();
        let metas = self
            .writer
            .apply_json(keys::COLLECTIONS, |current: Option<Vec<CollectionMeta>>| {
                let mut metas = current.unwrap_or_default();
                if metas.iter().any(|meta| meta.is_default) {
                    return Ok::<_, CollectionError>(metas);
                }
                if let Some(named) = metas
                    .iter_mut()
                    .find(|meta| meta.name.eq_ignore_ascii_case(DEFAULT_COLLECTION_NAME))
                {
                    named.is_default = true;
                    return Ok(metas);
                }
                metas.push(CollectionMeta {
                    id: first.max(next_id(metas.iter().map(|meta| meta.id))),
                    name: DEFAULT_COLLECTION_NAME.to_string(),
                    description: String::new(),
                    is_default: true,
                    created_at_unix_ms: now,
                    updated_at_unix_ms: now,
                });
                Ok(metas)
            })
            .await?;

        metas
            .into_iter()
            .find(|meta| meta.is_default)
            .ok_or_else(|| CollectionError::Invalid("default collection missing".into()))
    }

    pub async fn update_collection(
        &self,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> Result<CollectionMeta> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let now = unix_now_ms();

        let metas = self
            .writer
            .apply_json(keys::COLLECTIONS, |current: Option<Vec<CollectionMeta>>| {
                let mut metas = current.unwrap_or_default();
                if let Some(name) = &name {
                    ensure_unique_name(&metas, name, Some(id))?;
                }
                let meta = metas
                    .iter_mut()
                    .find(|meta| meta.id == id)
                    .ok_or_else(|| CollectionError::collection_not_found(id))?;
                if let Some(name) = name {
                    meta.name = name;
                }
                if let Some(description) = update.description {
                    meta.description = description.trim().to_string();
                }
                meta.updated_at_unix_ms = now;
                Ok::<_, CollectionError>(metas)
            })
            .await?;

        metas
            .into_iter()
            .find(|meta| meta.id == id)
            .ok_or_else(|| CollectionError::collection_not_found(id))
    }

    /// Deletes a collection and returns the entries it held.
    ///
    /// The metadata write happens first; if removing the entry list afterwards
    /// fails, the orphaned key is logged and left behind. Scans only follow
    /// listed collections and ids are never reused, so the orphan stays inert.
    pub async fn delete_collection(&self, id: CollectionId) -> Result<Vec<CollectionEntry>> {
        let entries = self.entries(id).await?;

        self.writer
            .apply_json(keys::COLLECTIONS, |current: Option<Vec<CollectionMeta>>| {
                let mut metas = current.unwrap_or_default();
                let position = metas
                    .iter()
                    .position(|meta| meta.id == id)
                    .ok_or_else(|| CollectionError::collection_not_found(id))?;
                if metas[position].is_default {
                    return Err(CollectionError::DefaultCollection);
                }
                metas.remove(position);
                Ok::<_, CollectionError>(metas)
            })
            .await?;

        if let Err(err) = self.store.remove(&keys::collection_key(id)).await {
            log::warn!("Collection {id} deleted but its entries could not be removed: {err}");
        }
        log::info!("Deleted collection {id} ({} entries)", entries.len());
        Ok(entries)
    }

    pub async fn entries(&self, id: CollectionId) -> Result<Vec<CollectionEntry>> {
        Ok(
            get_json::<Vec<CollectionEntry>>(self.store.as_ref(), &keys::collection_key(id))
                .await?
                .unwrap_or_default(),
        )
    }

    pub async fn entry(&self, id: CollectionId, entry_id: EntryId) -> Result<CollectionEntry> {
        self.entries(id)
            .await?
            .into_iter()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| CollectionError::entry_not_found(id, entry_id))
    }

    pub async fn find_entry(&self, id: CollectionId, word: &str) -> Result<Option<CollectionEntry>> {
        let word = normalize_word(word);
        Ok(self
            .entries(id)
            .await?
            .into_iter()
            .find(|entry| entry.word == word))
    }

    pub async fn add_entry(
        &self,
        id: CollectionId,
        definition: WordDefinition,
        origin: EntryOrigin,
    ) -> Result<AddOutcome> {
        let mut outcomes = self.add_entries(id, vec![(definition, origin)]).await?;
        outcomes
            .pop()
            .ok_or_else(|| CollectionError::Invalid("empty word".into()))
    }

    /// Appends several definitions in one write. Words already present in the
    /// collection (or repeated within the batch) are reported as duplicates.
    pub async fn add_entries(
        &self,
        id: CollectionId,
        definitions: Vec<(WordDefinition, EntryOrigin)>,
    ) -> Result<Vec<AddOutcome>> {
        self.require_collection(id).await?;
        if definitions.is_empty() {
            return Ok(Vec::new());
        }
        let highest = self
            .entries(id)
            .await?
            .iter()
            .map(|entry| entry.id)
            .max()
            .unwrap_or(0);
        let first = self
            .reserve_ids(IdKind::Entry, highest, definitions.len() as u64)
            .await?;
        let now = unix_now_ms();
        let mut outcomes = Vec::with_capacity(definitions.len());

        self.writer
            .apply_json(
                &keys::collection_key(id),
                |current: Option<Vec<CollectionEntry>>| {
                    let mut entries = current.unwrap_or_default();
                    let mut next_entry_id =
                        first.max(next_id(entries.iter().map(|entry| entry.id)));
                    for (definition, origin) in definitions {
                        let word = definition.normalized_word();
                        if word.is_empty() {
                            continue;
                        }
                        if let Some(existing) = entries.iter().find(|entry| entry.word == word) {
                            outcomes.push(AddOutcome::Duplicate {
                                existing: existing.clone(),
                            });
                            continue;
                        }
                        let entry = CollectionEntry::new(next_entry_id, definition, origin, now);
                        next_entry_id += 1;
                        outcomes.push(AddOutcome::Added {
                            entry: entry.clone(),
                        });
                        entries.push(entry);
                    }
                    Ok::<_, CollectionError>(entries)
                },
            )
            .await?;

        let added = outcomes.iter().filter(|outcome| outcome.is_added()).count();
        log::debug!(
            "Collection {id}: added {added}, skipped {} duplicates",
            outcomes.len() - added
        );
        Ok(outcomes)
    }

    pub async fn remove_entry(&self, id: CollectionId, entry_id: EntryId) -> Result<CollectionEntry> {
        let mut removed = None;
        self.writer
            .apply_json(
                &keys::collection_key(id),
                |current: Option<Vec<CollectionEntry>>| {
                    let mut entries = current.unwrap_or_default();
                    let position = entries
                        .iter()
                        .position(|entry| entry.id == entry_id)
                        .ok_or_else(|| CollectionError::entry_not_found(id, entry_id))?;
                    removed = Some(entries.remove(position));
                    Ok::<_, CollectionError>(entries)
                },
            )
            .await?;
        removed.ok_or_else(|| CollectionError::entry_not_found(id, entry_id))
    }

    /// Applies user edits to an entry and marks it customized. The snapshot
    /// from before the first edit is kept for [`Self::reset_customization`].
    pub async fn customize_entry(
        &self,
        id: CollectionId,
        entry_id: EntryId,
        patch: EntryPatch,
    ) -> Result<CollectionEntry> {
        if patch.is_empty() {
            return Err(CollectionError::Invalid("nothing to customize".into()));
        }
        let now = unix_now_ms();
        self.modify_entry(id, entry_id, move |entry| {
            if entry.base_definition.is_none() {
                entry.base_definition = Some(entry.definition.clone());
            }
            if let Some(pronunciation) = patch.pronunciation {
                entry.definition.pronunciation = pronunciation;
            }
            if let Some(difficulty) = patch.difficulty {
                entry.definition.difficulty = clamp_difficulty(i64::from(difficulty));
            }
            if let Some(meanings) = patch.meanings {
                entry.definition.meanings = meanings;
            }
            if let Some(note) = patch.custom_note {
                entry.custom_note = Some(note).filter(|note| !note.trim().is_empty());
            }
            if let Some(tags) = patch.tags {
                entry.tags = tags;
            }
            entry.is_customized = true;
            entry.last_modified_unix_ms = Some(now);
        })
        .await
    }

    /// Drops user edits and restores the original snapshot.
    pub async fn reset_customization(
        &self,
        id: CollectionId,
        entry_id: EntryId,
    ) -> Result<CollectionEntry> {
        let now = unix_now_ms();
        self.modify_entry(id, entry_id, move |entry| {
            if let Some(base) = entry.base_definition.take() {
                entry.definition = base;
            }
            entry.custom_note = None;
            entry.is_customized = false;
            entry.last_modified_unix_ms = Some(now);
        })
        .await
    }

    pub async fn set_mastered(
        &self,
        id: CollectionId,
        entry_id: EntryId,
        mastered: bool,
    ) -> Result<CollectionEntry> {
        let now = unix_now_ms();
        self.modify_entry(id, entry_id, move |entry| {
            entry.progress.mastered = mastered;
            entry.last_modified_unix_ms = Some(now);
        })
        .await
    }

    pub async fn record_study_result(
        &self,
        id: CollectionId,
        entry_id: EntryId,
        correct: bool,
    ) -> Result<CollectionEntry> {
        let now = unix_now_ms();
        self.modify_entry(id, entry_id, move |entry| {
            if correct {
                entry.progress.correct_count += 1;
            } else {
                entry.progress.incorrect_count += 1;
            }
            entry.progress.last_studied_unix_ms = Some(now);
        })
        .await
    }

    /// Full scan: every normalized word mastered in at least one collection.
    pub async fn mastered_words(&self) -> Result<BTreeSet<String>> {
        let mut words = BTreeSet::new();
        for meta in self.list_collections().await? {
            for entry in self.entries(meta.id).await? {
                if entry.progress.mastered {
                    words.insert(entry.word);
                }
            }
        }
        Ok(words)
    }

    /// Collections in which `word` is currently mastered.
    pub async fn collections_with_mastered(&self, word: &str) -> Result<Vec<CollectionId>> {
        let word = normalize_word(word);
        let mut ids = Vec::new();
        for meta in self.list_collections().await? {
            let mastered_here = self
                .entries(meta.id)
                .await?
                .iter()
                .any(|entry| entry.word == word && entry.progress.mastered);
            if mastered_here {
                ids.push(meta.id);
            }
        }
        Ok(ids)
    }

    pub async fn statistics(&self, id: CollectionId) -> Result<CollectionStatistics> {
        self.require_collection(id).await?;
        let entries = self.entries(id).await?;
        Ok(CollectionStatistics::from_entries(&entries))
    }

    /// Portable copy of a collection's current words. Progress is not exported.
    pub async fn export_collection(&self, id: CollectionId) -> Result<SharedCollection> {
        let meta = self.require_collection(id).await?;
        let entries = self.entries(id).await?;
        let shared = SharedCollection::from_entries(&meta, &entries)?;
        log::info!("Exported collection {id} ({} words)", entries.len());
        Ok(shared)
    }

    /// Creates a new collection from an export document. A taken name gets a
    /// ` (2)`, ` (3)`, ... suffix. Imported words start with fresh progress.
    ///
    /// If the words cannot be written, the new (empty) collection is removed
    /// again on a best-effort basis and the write error is returned.
    pub async fn import_collection(&self, shared: SharedCollection) -> Result<ImportReport> {
        let base = validate_name(&shared.name)?;
        if shared.words.is_empty() {
            return Err(CollectionError::Invalid("import has no words".into()));
        }
        let name = unique_import_name(&self.list_collections().await?, &base);
        let meta = self.create_collection(&name, &shared.description).await?;

        let definitions = shared
            .words
            .iter()
            .map(|word| (word.to_definition(), word.origin()))
            .collect();
        let outcomes = match self.add_entries(meta.id, definitions).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                if let Err(cleanup) = self.delete_collection(meta.id).await {
                    log::warn!(
                        "Failed to remove partially imported collection {}: {cleanup}",
                        meta.id
                    );
                }
                return Err(err);
            }
        };

        let imported = outcomes.iter().filter(|outcome| outcome.is_added()).count();
        let kept: BTreeSet<String> = outcomes
            .iter()
            .filter(|outcome| outcome.is_added())
            .map(|outcome| outcome.entry().word.clone())
            .collect();
        let mut claimed = BTreeSet::new();
        let skipped = shared
            .words
            .iter()
            .map(|word| normalize_word(&word.word))
            .filter(|word| !(kept.contains(word) && claimed.insert(word.clone())))
            .collect::<Vec<_>>();
        log::info!(
            "Imported collection {} '{}' ({imported} words, {} skipped)",
            meta.id,
            meta.name,
            skipped.len()
        );
        Ok(ImportReport {
            collection: meta,
            imported,
            skipped,
        })
    }

    /// Highest collection id in use, counting leftover `collection:{id}` keys.
    async fn highest_collection_id(&self) -> Result<CollectionId> {
        let listed = self
            .list_collections()
            .await?
            .into_iter()
            .map(|meta| meta.id)
            .max()
            .unwrap_or(0);
        let stored = self
            .store
            .keys()
            .await?
            .iter()
            .filter_map(|key| keys::parse_collection_key(key))
            .max()
            .unwrap_or(0);
        Ok(listed.max(stored))
    }

    /// Reserves `count` consecutive ids above both the sequence and `floor`,
    /// returning the first. Ids reserved by a write that later fails are burnt.
    async fn reserve_ids(&self, kind: IdKind, floor: u64, count: u64) -> Result<u64> {
        let mut first = 0;
        self.writer
            .apply_json(keys::ID_SEQUENCE, |current: Option<IdSequence>| {
                let mut sequence = current.unwrap_or_default();
                let last = match kind {
                    IdKind::Collection => &mut sequence.last_collection_id,
                    IdKind::Entry => &mut sequence.last_entry_id,
                };
                *last = (*last).max(floor);
                first = *last + 1;
                *last += count.max(1);
                Ok::<_, CollectionError>(sequence)
            })
            .await?;
        Ok(first)
    }

    async fn require_collection(&self, id: CollectionId) -> Result<CollectionMeta> {
        self.get_collection(id)
            .await?
            .ok_or_else(|| CollectionError::collection_not_found(id))
    }

    async fn modify_entry<F>(&self, id: CollectionId, entry_id: EntryId, edit: F) -> Result<CollectionEntry>
    where
        F: FnOnce(&mut CollectionEntry) + Send,
    {
        let mut updated = None;
        self.writer
            .apply_json(
                &keys::collection_key(id),
                |current: Option<Vec<CollectionEntry>>| {
                    let mut entries = current.unwrap_or_default();
                    let entry = entries
                        .iter_mut()
                        .find(|entry| entry.id == entry_id)
                        .ok_or_else(|| CollectionError::entry_not_found(id, entry_id))?;
                    edit(entry);
                    updated = Some(entry.clone());
                    Ok::<_, CollectionError>(entries)
                },
            )
            .await?;
        updated.ok_or_else(|| CollectionError::entry_not_found(id, entry_id))
    }
}

#[async_trait]
impl MasterySource for CollectionStore {
    async fn scan_mastered(&self) -> Result<BTreeSet<String>> {
        self.mastered_words().await
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CollectionError::Invalid(
            "collection name must not be empty".into(),
        ));
    }
    Ok(name.to_string())
}

fn ensure_unique_name(
    metas: &[CollectionMeta],
    name: &str,
    except: Option<CollectionId>,
) -> Result<()> {
    let lowered = name.to_lowercase();
    let taken = metas
        .iter()
        .any(|meta| Some(meta.id) != except && meta.name.to_lowercase() == lowered);
    if taken {
        return Err(CollectionError::DuplicateName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum IdKind {
    Collection,
    Entry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdSequence {
    #[serde(default)]
    last_collection_id: CollectionId,
    #[serde(default)]
    last_entry_id: EntryId,
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map_or(1, |max| max + 1)
}
