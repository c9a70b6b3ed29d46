use crate::error::{DictionaryError, Result};
use crate::types::WordDefinition;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GENERATE_PATH: &str = "/api/v1/words/generate";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Request body of the batch generate call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub words: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    word: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    data: Option<WordDefinition>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBatch {
    #[serde(default)]
    results: Vec<RawResult>,
    #[serde(default)]
    cache_hits: u32,
    #[serde(default)]
    db_hits: u32,
    #[serde(default)]
    gemini_calls: u32,
}

/// One per-word outcome of a batch call, keyed by where the backend found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResult {
    /// Served from the backend's own cache.
    Cache { word: String, definition: WordDefinition },
    /// Served from the backend's curated database.
    Db { word: String, definition: WordDefinition },
    /// Generated by the metered model. Counts against the usage quota.
    Gemini { word: String, definition: WordDefinition },
    Error { word: String, message: String },
}

impl RemoteResult {
    #[must_use]
    pub fn word(&self) -> &str {
        match self {
            Self::Cache { word, .. }
            | Self::Db { word, .. }
            | Self::Gemini { word, .. }
            | Self::Error { word, .. } => word,
        }
    }

    #[must_use]
    pub fn definition(&self) -> Option<&WordDefinition> {
        match self {
            Self::Cache { definition, .. }
            | Self::Db { definition, .. }
            | Self::Gemini { definition, .. } => Some(definition),
            Self::Error { .. } => None,
        }
    }

    #[must_use]
    pub fn into_definition(self) -> Option<WordDefinition> {
        match self {
            Self::Cache { definition, .. }
            | Self::Db { definition, .. }
            | Self::Gemini { definition, .. } => Some(definition),
            Self::Error { .. } => None,
        }
    }
}

impl From<RawResult> for RemoteResult {
    fn from(raw: RawResult) -> Self {
        let RawResult {
            word,
            source,
            data,
            error,
        } = raw;

        if let Some(message) = error {
            return Self::Error { word, message };
        }
        let Some(definition) = data else {
            return Self::Error {
                word,
                message: "no data returned".to_string(),
            };
        };
        match source.as_deref() {
            Some("cache") => Self::Cache { word, definition },
            Some("db") => Self::Db { word, definition },
            Some("gemini") => Self::Gemini { word, definition },
            other => Self::Error {
                word,
                message: format!("unrecognized source {other:?}"),
            },
        }
    }
}

/// Decoded batch response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawBatch")]
pub struct RemoteBatch {
    pub results: Vec<RemoteResult>,
    pub cache_hits: u32,
    pub db_hits: u32,
    pub gemini_calls: u32,
}

impl From<RawBatch> for RemoteBatch {
    fn from(raw: RawBatch) -> Self {
        Self {
            results: raw.results.into_iter().map(RemoteResult::from).collect(),
            cache_hits: raw.cache_hits,
            db_hits: raw.db_hits,
            gemini_calls: raw.gemini_calls,
        }
    }
}

/// Opaque batch definition backend.
#[async_trait]
pub trait RemoteDefinitionClient: Send + Sync {
    /// Requests definitions for `words` (normalized, deduplicated, ordered).
    async fn generate(&self, words: &[String]) -> Result<RemoteBatch>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// `reqwest`-backed client for the generate endpoint.
pub struct HttpDefinitionClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpDefinitionClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| DictionaryError::Other(format!("Failed to build HTTP client: {err}")))?;
        let endpoint = format!("{}{GENERATE_PATH}", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            token: config.token.filter(|token| !token.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteDefinitionClient for HttpDefinitionClient {
    async fn generate(&self, words: &[String]) -> Result<RemoteBatch> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { words });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let batch = response.json::<RemoteBatch>().await?;
        log::debug!(
            "POST {} -> {} results (cache_hits={}, db_hits={}, gemini_calls={})",
            self.endpoint,
            batch.results.len(),
            batch.cache_hits,
            batch.db_hits,
            batch.gemini_calls
        );
        Ok(batch)
    }
}

/// Client used when no backend is configured: every call fails as unavailable.
pub struct OfflineClient;

#[async_trait]
impl RemoteDefinitionClient for OfflineClient {
    async fn generate(&self, _words: &[String]) -> Result<RemoteBatch> {
        Err(DictionaryError::RemoteUnavailable(
            "no remote backend configured".to_string(),
        ))
    }
}
