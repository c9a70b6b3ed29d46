use crate::error::{DictionaryError, Result};
use crate::types::{clamp_difficulty, normalize_word, Example, Meaning, Provenance, WordDefinition};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../data/bundled-catalog.json");

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    version: Option<String>,
    words: Vec<RawCatalogWord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalogWord {
    word: String,
    #[serde(default)]
    pronunciation: String,
    #[serde(default)]
    difficulty: Option<i64>,
    #[serde(default)]
    meanings: Vec<Meaning>,
    /// Word-level examples; attached to the first meaning that has none.
    #[serde(default)]
    examples: Vec<Example>,
}

/// Immutable word list shipped with the application.
#[derive(Debug, Clone, Default)]
pub struct BundledCatalog {
    version: Option<String>,
    words: HashMap<String, WordDefinition>,
}

impl BundledCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_CATALOG).expect("builtin catalog must parse")
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DictionaryError::CatalogError(format!("read {}: {err}", path.display()))
        })?;
        let catalog = Self::from_json_str(&raw)?;
        log::info!(
            "Loaded bundled catalog from {} ({} words)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: RawCatalog = serde_json::from_str(raw)
            .map_err(|err| DictionaryError::CatalogError(format!("invalid catalog: {err}")))?;

        let mut words = HashMap::with_capacity(parsed.words.len());
        for entry in parsed.words {
            let key = normalize_word(&entry.word);
            if key.is_empty() {
                continue;
            }
            let mut meanings = entry.meanings;
            if !entry.examples.is_empty() {
                if let Some(first) = meanings.iter_mut().find(|m| m.examples.is_empty()) {
                    first.examples = entry.examples;
                }
            }
            let definition = WordDefinition {
                word: key.clone(),
                pronunciation: entry.pronunciation,
                difficulty: clamp_difficulty(entry.difficulty.unwrap_or(1)),
                meanings,
                usage_notes: None,
                provenance: Provenance::Bundled,
            };
            if words.insert(key.clone(), definition).is_some() {
                log::debug!("Duplicate catalog entry '{key}', keeping the last one");
            }
        }

        Ok(Self {
            version: parsed.version,
            words,
        })
    }

    pub fn get(&self, word: &str) -> Option<WordDefinition> {
        self.words.get(&normalize_word(word)).cloned()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(&normalize_word(word))
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
