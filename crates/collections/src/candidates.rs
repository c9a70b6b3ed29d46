use crate::mastery::MasteryIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use wordbook_dictionary::normalize_word;

pub const DEFAULT_MIN_LENGTH: usize = 2;

/// Letters, optionally joined by a single apostrophe or hyphen ("don't", "well-known").
static WORD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]+(?:['’-][A-Za-z]+)*").expect("valid word regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of",
    "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "us", "was", "we", "were", "what", "when", "which", "who",
    "will", "with", "you", "your",
];

/// Turns raw text-detection output into lookup-ready words.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    min_length: usize,
    stop_words: HashSet<String>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LENGTH)
    }
}

impl CandidateFilter {
    pub fn new(min_length: usize) -> Self {
        Self {
            min_length: min_length.max(1),
            stop_words: STOP_WORDS.iter().map(|word| (*word).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_stop_words<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words
            .extend(extra.into_iter().map(|word| normalize_word(word.as_ref())));
        self
    }

    /// Normalized, deduplicated word tokens in first-seen order.
    pub fn filter<S: AsRef<str>>(&self, raw: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut words = Vec::new();
        for text in raw {
            for token in WORD_TOKEN.find_iter(text.as_ref()) {
                let word = normalize_word(&token.as_str().replace('’', "'"));
                if word.chars().count() < self.min_length || self.stop_words.contains(&word) {
                    continue;
                }
                if seen.insert(word.clone()) {
                    words.push(word);
                }
            }
        }
        words
    }

    /// Like [`Self::filter`], additionally dropping words already mastered.
    pub fn filter_unmastered<S: AsRef<str>>(&self, raw: &[S], mastery: &MasteryIndex) -> Vec<String> {
        self.filter(raw)
            .into_iter()
            .filter(|word| !mastery.is_mastered(word))
            .collect()
    }
}
