use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical lookup key: trimmed and lowercased.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

#[must_use]
pub fn clamp_difficulty(value: i64) -> u8 {
    value.clamp(i64::from(MIN_DIFFICULTY), i64::from(MAX_DIFFICULTY)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Preposition,
    Conjunction,
    Interjection,
    Pronoun,
    Determiner,
    Other,
}

impl PartOfSpeech {
    /// Parses English names, common abbreviations and Korean labels.
    /// Unknown labels map to [`PartOfSpeech::Other`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "noun" | "n" | "명사" => Self::Noun,
            "verb" | "v" | "동사" => Self::Verb,
            "adjective" | "adj" | "형용사" => Self::Adjective,
            "adverb" | "adv" | "부사" => Self::Adverb,
            "preposition" | "prep" | "전치사" => Self::Preposition,
            "conjunction" | "conj" | "접속사" => Self::Conjunction,
            "interjection" | "interj" | "감탄사" => Self::Interjection,
            "pronoun" | "pron" | "대명사" => Self::Pronoun,
            "determiner" | "det" | "한정사" => Self::Determiner,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adjective",
            Self::Adverb => "adverb",
            Self::Preposition => "preposition",
            Self::Conjunction => "conjunction",
            Self::Interjection => "interjection",
            Self::Pronoun => "pronoun",
            Self::Determiner => "determiner",
            Self::Other => "other",
        }
    }
}

impl From<String> for PartOfSpeech {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<PartOfSpeech> for String {
    fn from(pos: PartOfSpeech) -> Self {
        pos.as_str().to_string()
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Example sentence with its translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub en: String,
    #[serde(default, alias = "ko")]
    pub native: String,
}

/// One sense of a word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meaning {
    #[serde(alias = "part_of_speech")]
    pub part_of_speech: PartOfSpeech,
    /// Gloss in the learner's language.
    #[serde(alias = "korean", alias = "korean_meaning")]
    pub native: String,
    /// Gloss in the studied language.
    #[serde(default, alias = "english", alias = "definition_en")]
    pub foreign: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub examples: Vec<Example>,
}

/// Tier that produced the currently cached copy of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Memory,
    Bundled,
    PersistentCache,
    Remote,
    /// A user-authored override. No lookup tier produces this.
    UserDefault,
}

impl Provenance {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Bundled => "bundled",
            Self::PersistentCache => "persistent-cache",
            Self::Remote => "remote",
            Self::UserDefault => "user-default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDefinition {
    pub word: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(
        default = "default_difficulty",
        deserialize_with = "deserialize_difficulty"
    )]
    pub difficulty: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meanings: Vec<Meaning>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "usage_notes")]
    pub usage_notes: Option<String>,
    #[serde(default = "default_provenance")]
    pub provenance: Provenance,
}

/// The remote backend sends `null` for empty lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_provenance() -> Provenance {
    Provenance::Remote
}

fn default_difficulty() -> u8 {
    MIN_DIFFICULTY
}

fn deserialize_difficulty<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map_or(MIN_DIFFICULTY, clamp_difficulty))
}

impl WordDefinition {
    #[must_use]
    pub fn normalized_word(&self) -> String {
        normalize_word(&self.word)
    }

    /// Same definition re-tagged with another provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Field equality ignoring provenance.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.word == other.word
            && self.pronunciation == other.pronunciation
            && self.difficulty == other.difficulty
            && self.meanings == other.meanings
            && self.usage_notes == other.usage_notes
    }
}
