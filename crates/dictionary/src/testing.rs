//! Test doubles for the remote definition backend.

use crate::error::{DictionaryError, Result};
use crate::remote::{RemoteBatch, RemoteDefinitionClient, RemoteResult};
use crate::types::{normalize_word, Meaning, PartOfSpeech, Provenance, WordDefinition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Builds a one-meaning definition, handy in tests.
#[must_use]
pub fn simple_definition(word: &str, gloss: &str) -> WordDefinition {
    WordDefinition {
        word: word.to_string(),
        pronunciation: String::new(),
        difficulty: 2,
        meanings: vec![Meaning {
            part_of_speech: PartOfSpeech::Noun,
            native: gloss.to_string(),
            foreign: String::new(),
            examples: Vec::new(),
        }],
        usage_notes: None,
        provenance: Provenance::Remote,
    }
}

/// Remote client answering from a fixed table and recording every request.
///
/// Known words come back as `gemini` results; words listed with
/// [`ScriptedRemoteClient::with_error`] come back as per-word errors; any other
/// word is simply absent from the response.
#[derive(Default)]
pub struct ScriptedRemoteClient {
    definitions: HashMap<String, WordDefinition>,
    errors: HashMap<String, String>,
    requests: Mutex<Vec<Vec<String>>>,
    unavailable: AtomicBool,
}

impl ScriptedRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_definition(mut self, definition: WordDefinition) -> Self {
        self.definitions
            .insert(definition.normalized_word(), definition);
        self
    }

    #[must_use]
    pub fn with_error(mut self, word: &str, message: &str) -> Self {
        self.errors.insert(normalize_word(word), message.to_string());
        self
    }

    /// Makes every subsequent call fail at the transport level.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Word lists of every call received, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests mutex poisoned").len()
    }
}

#[async_trait]
impl RemoteDefinitionClient for ScriptedRemoteClient {
    async fn generate(&self, words: &[String]) -> Result<RemoteBatch> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(words.to_vec());

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DictionaryError::RemoteUnavailable(
                "scripted outage".to_string(),
            ));
        }

        let mut batch = RemoteBatch::default();
        for word in words {
            if let Some(message) = self.errors.get(word) {
                batch.results.push(RemoteResult::Error {
                    word: word.clone(),
                    message: message.clone(),
                });
            } else if let Some(definition) = self.definitions.get(word) {
                batch.gemini_calls += 1;
                batch.results.push(RemoteResult::Gemini {
                    word: word.clone(),
                    definition: definition.clone(),
                });
            }
        }
        Ok(batch)
    }
}
