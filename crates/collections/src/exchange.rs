//! Portable JSON form of a collection, for moving word lists between devices.

use crate::error::{CollectionError, Result};
use crate::model::{CollectionEntry, CollectionMeta, EntryOrigin};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use wordbook_dictionary::{clamp_difficulty, Meaning, Provenance, WordDefinition, MIN_DIFFICULTY};

/// Confidence stamped on every exported word; imports ignore it.
pub const EXPORT_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedCollection {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub words: Vec<SharedWord>,
    #[serde(default)]
    pub metadata: SharedMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedWord {
    pub word: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(default)]
    pub difficulty: Option<i64>,
    pub meanings: Vec<Meaning>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedMetadata {
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub difficulty_distribution: BTreeMap<u8, usize>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Result of importing a [`SharedCollection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub collection: CollectionMeta,
    pub imported: usize,
    /// Blank or repeated words that were not added.
    pub skipped: Vec<String>,
}

fn default_confidence() -> f32 {
    EXPORT_CONFIDENCE
}

impl SharedCollection {
    /// Builds the export document. Fails for a collection without words.
    pub fn from_entries(meta: &CollectionMeta, entries: &[CollectionEntry]) -> Result<Self> {
        if entries.is_empty() {
            return Err(CollectionError::Invalid(format!(
                "collection {} has no words to export",
                meta.id
            )));
        }

        let mut difficulty_distribution = BTreeMap::new();
        let mut tags = BTreeSet::new();
        let words = entries
            .iter()
            .map(|entry| {
                *difficulty_distribution
                    .entry(entry.definition.difficulty)
                    .or_insert(0) += 1;
                tags.extend(entry.tags.iter().cloned());
                SharedWord {
                    word: entry.definition.word.clone(),
                    pronunciation: entry.definition.pronunciation.clone(),
                    difficulty: Some(i64::from(entry.definition.difficulty)),
                    meanings: entry.definition.meanings.clone(),
                    confidence: EXPORT_CONFIDENCE,
                    source: entry.origin.as_str().to_string(),
                }
            })
            .collect();

        let now = Utc::now();
        Ok(Self {
            id: format!("shared_{}_{}", meta.id, now.timestamp_millis()),
            name: meta.name.clone(),
            description: meta.description.clone(),
            words,
            metadata: SharedMetadata {
                created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                word_count: entries.len(),
                difficulty_distribution,
                tags: tags.into_iter().collect(),
            },
        })
    }

    /// Parses and validates an export document. Every structural problem is
    /// reported in one [`CollectionError::Invalid`].
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| CollectionError::Invalid(format!("not a collection file: {err}")))?;
        let errors = validate(&value);
        if !errors.is_empty() {
            return Err(CollectionError::Invalid(format!(
                "not a collection file: {}",
                errors.join(", ")
            )));
        }
        serde_json::from_value(value)
            .map_err(|err| CollectionError::Invalid(format!("not a collection file: {err}")))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl SharedWord {
    pub(crate) fn origin(&self) -> EntryOrigin {
        EntryOrigin::parse(&self.source)
    }

    pub(crate) fn to_definition(&self) -> WordDefinition {
        let provenance = match self.origin() {
            EntryOrigin::Bundled => Provenance::Bundled,
            EntryOrigin::UserDefault | EntryOrigin::UserCustom => Provenance::UserDefault,
            EntryOrigin::Remote => Provenance::Remote,
        };
        WordDefinition {
            word: self.word.trim().to_string(),
            pronunciation: self.pronunciation.clone(),
            difficulty: self.difficulty.map_or(MIN_DIFFICULTY, clamp_difficulty),
            meanings: self.meanings.clone(),
            usage_notes: None,
            provenance,
        }
    }
}

fn validate(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    match value.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        _ => errors.push("missing collection name".to_string()),
    }

    match value.get("words").and_then(Value::as_array) {
        None => errors.push("word list is missing or not an array".to_string()),
        Some(words) if words.is_empty() => errors.push("word list is empty".to_string()),
        Some(words) => {
            let malformed = words.iter().position(|word| {
                let has_word = word
                    .get("word")
                    .and_then(Value::as_str)
                    .is_some_and(|text| !text.trim().is_empty());
                let has_meanings = word.get("meanings").is_some_and(Value::is_array);
                !(has_word && has_meanings)
            });
            if let Some(index) = malformed {
                errors.push(format!("word {} is malformed", index + 1));
            }
        }
    }

    errors
}

/// `base`, or `base (2)`, `base (3)`, ... until no collection has the name
/// (compared case-insensitively).
pub(crate) fn unique_import_name(existing: &[CollectionMeta], base: &str) -> String {
    let taken: BTreeSet<String> = existing.iter().map(|meta| meta.name.to_lowercase()).collect();
    let mut candidate = base.to_string();
    let mut counter = 2;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = format!("{base} ({counter})");
        counter += 1;
    }
    candidate
}
