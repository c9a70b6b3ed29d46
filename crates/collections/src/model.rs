use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wordbook_dictionary::{
    normalize_word, BundledCatalog, Example, Meaning, Provenance, WordDefinition,
};

pub type CollectionId = u64;
pub type EntryId = u64;

/// Where an entry's definition snapshot came from when it was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryOrigin {
    Bundled,
    Remote,
    UserDefault,
    UserCustom,
}

impl EntryOrigin {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Remote => "remote",
            Self::UserDefault => "user-default",
            Self::UserCustom => "user-custom",
        }
    }
}

impl EntryOrigin {
    /// Origin of a resolved definition. A memory hit says nothing about where
    /// the word was first found, so it counts as bundled when it still
    /// matches the catalog copy and as remote otherwise.
    #[must_use]
    pub fn for_definition(definition: &WordDefinition, catalog: &BundledCatalog) -> Self {
        match definition.provenance {
            Provenance::Bundled => Self::Bundled,
            Provenance::UserDefault => Self::UserDefault,
            Provenance::PersistentCache | Provenance::Remote => Self::Remote,
            Provenance::Memory => match catalog.get(&definition.word) {
                Some(bundled) if bundled.same_content(definition) => Self::Bundled,
                _ => Self::Remote,
            },
        }
    }

    /// Inverse of [`Self::as_str`]; unknown labels fall back to `Remote`.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "bundled" => Self::Bundled,
            "user-default" => Self::UserDefault,
            "user-custom" => Self::UserCustom,
            _ => Self::Remote,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyProgress {
    pub correct_count: u32,
    pub incorrect_count: u32,
    #[serde(default)]
    pub last_studied_unix_ms: Option<u64>,
    #[serde(default)]
    pub mastered: bool,
}

impl StudyProgress {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.correct_count + self.incorrect_count
    }
}

/// One word inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub id: EntryId,
    /// Normalized word.
    pub word: String,
    pub definition: WordDefinition,
    /// The snapshot taken before the first customization, restored on reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<WordDefinition>,
    #[serde(default)]
    pub is_customized: bool,
    pub added_at_unix_ms: u64,
    #[serde(default)]
    pub last_modified_unix_ms: Option<u64>,
    #[serde(default)]
    pub custom_note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub progress: StudyProgress,
    pub origin: EntryOrigin,
}

impl CollectionEntry {
    #[must_use]
    pub fn new(id: EntryId, definition: WordDefinition, origin: EntryOrigin, now_ms: u64) -> Self {
        Self {
            id,
            word: normalize_word(&definition.word),
            definition,
            base_definition: None,
            is_customized: false,
            added_at_unix_ms: now_ms,
            last_modified_unix_ms: None,
            custom_note: None,
            tags: Vec::new(),
            progress: StudyProgress::default(),
            origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub id: CollectionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at_unix_ms: u64,
    pub updated_at_unix_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// User edits applied by [`CollectionStore::customize_entry`](crate::CollectionStore::customize_entry).
/// `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default)]
    pub pronunciation: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub meanings: Option<Vec<Meaning>>,
    #[serde(default)]
    pub custom_note: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl EntryPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pronunciation.is_none()
            && self.difficulty.is_none()
            && self.meanings.is_none()
            && self.custom_note.is_none()
            && self.tags.is_none()
    }
}

/// A user-authored override applying to a word in every collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefaultEntry {
    pub word: String,
    #[serde(default)]
    pub pronunciation: String,
    pub difficulty: u8,
    #[serde(default)]
    pub meanings: Vec<Meaning>,
    #[serde(default)]
    pub custom_note: Option<String>,
    #[serde(default)]
    pub custom_examples: Vec<Example>,
    pub last_modified_unix_ms: u64,
}

impl UserDefaultEntry {
    /// Starts an override from an existing definition.
    #[must_use]
    pub fn from_definition(definition: &WordDefinition) -> Self {
        Self {
            word: normalize_word(&definition.word),
            pronunciation: definition.pronunciation.clone(),
            difficulty: definition.difficulty,
            meanings: definition.meanings.clone(),
            custom_note: None,
            custom_examples: Vec::new(),
            last_modified_unix_ms: 0,
        }
    }

    /// The override expressed as a standalone definition.
    #[must_use]
    pub fn to_definition(&self) -> WordDefinition {
        WordDefinition {
            word: self.word.clone(),
            pronunciation: self.pronunciation.clone(),
            difficulty: self.difficulty,
            meanings: self.meanings.clone(),
            usage_notes: None,
            provenance: Provenance::UserDefault,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStatistics {
    pub total: usize,
    pub mastered: usize,
    /// Studied at least once but not mastered.
    pub learning: usize,
    pub difficulty_distribution: BTreeMap<u8, usize>,
    pub part_of_speech_distribution: BTreeMap<String, usize>,
    pub average_difficulty: f64,
}

impl CollectionStatistics {
    #[must_use]
    pub fn from_entries(entries: &[CollectionEntry]) -> Self {
        let mut stats = Self {
            total: entries.len(),
            ..Self::default()
        };
        let mut difficulty_sum = 0u64;
        for entry in entries {
            if entry.progress.mastered {
                stats.mastered += 1;
            } else if entry.progress.attempts() > 0 {
                stats.learning += 1;
            }
            let difficulty = entry.definition.difficulty;
            difficulty_sum += u64::from(difficulty);
            *stats.difficulty_distribution.entry(difficulty).or_default() += 1;
            for meaning in &entry.definition.meanings {
                *stats
                    .part_of_speech_distribution
                    .entry(meaning.part_of_speech.as_str().to_string())
                    .or_default() += 1;
            }
        }
        if !entries.is_empty() {
            stats.average_difficulty = difficulty_sum as f64 / entries.len() as f64;
        }
        stats
    }
}

/// Result of adding one word to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddOutcome {
    Added { entry: CollectionEntry },
    /// The collection already holds the normalized word.
    Duplicate { existing: CollectionEntry },
}

impl AddOutcome {
    #[must_use]
    pub fn entry(&self) -> &CollectionEntry {
        match self {
            Self::Added { entry } => entry,
            Self::Duplicate { existing } => existing,
        }
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordbook_dictionary::testing::simple_definition;

    fn catalog() -> BundledCatalog {
        BundledCatalog::from_json_str(
            r#"{"words": [
                {"word": "book", "difficulty": 1,
                 "meanings": [{"partOfSpeech": "noun", "korean": "책"}]}
            ]}"#,
        )
        .expect("catalog")
    }

    #[test]
    fn memory_hit_of_bundled_word_keeps_bundled_origin() {
        let catalog = catalog();
        let from_memory = catalog
            .get("book")
            .expect("bundled")
            .with_provenance(Provenance::Memory);
        assert_eq!(
            EntryOrigin::for_definition(&from_memory, &catalog),
            EntryOrigin::Bundled
        );
    }

    #[test]
    fn memory_hit_of_generated_word_is_remote() {
        let catalog = catalog();
        let generated = simple_definition("apple", "사과").with_provenance(Provenance::Memory);
        assert_eq!(
            EntryOrigin::for_definition(&generated, &catalog),
            EntryOrigin::Remote
        );

        // Same word as the catalog, but a different (generated) copy.
        let regenerated = simple_definition("book", "장부").with_provenance(Provenance::Memory);
        assert_eq!(
            EntryOrigin::for_definition(&regenerated, &catalog),
            EntryOrigin::Remote
        );
    }

    #[test]
    fn user_default_definition_is_not_a_lookup_tier() {
        let entry = UserDefaultEntry::from_definition(&simple_definition("book", "공책"));
        let definition = entry.to_definition();

        assert_eq!(definition.provenance, Provenance::UserDefault);
        assert_eq!(
            EntryOrigin::for_definition(&definition, &catalog()),
            EntryOrigin::UserDefault
        );
    }

    #[test]
    fn origin_labels_parse_back() {
        for origin in [
            EntryOrigin::Bundled,
            EntryOrigin::Remote,
            EntryOrigin::UserDefault,
            EntryOrigin::UserCustom,
        ] {
            assert_eq!(EntryOrigin::parse(origin.as_str()), origin);
        }
        assert_eq!(EntryOrigin::parse("gemini"), EntryOrigin::Remote);
    }
}
