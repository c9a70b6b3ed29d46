use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wordbook_dictionary::{
    DEFAULT_COST_PER_CALL, DEFAULT_DAILY_LIMIT, DEFAULT_MEMORY_CAPACITY, DEFAULT_TIMEOUT_MS,
    DEFAULT_WARM_LIMIT,
};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("Unsupported store backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the definition backend; no remote lookups when unset.
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub daily_limit: u64,
    pub cost_per_call: f64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            cost_per_call: DEFAULT_COST_PER_CALL,
        }
    }
}

/// Runtime configuration.
///
/// Layers, lowest first: built-in defaults, the TOML file, `WORDBOOK_*`
/// environment variables, command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordbookConfig {
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub memory_capacity: usize,
    pub warm_limit: usize,
    pub catalog_path: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub usage: UsageConfig,
}

impl Default for WordbookConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_backend: StoreBackend::File,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            warm_limit: DEFAULT_WARM_LIMIT,
            catalog_path: None,
            remote: RemoteConfig::default(),
            usage: UsageConfig::default(),
        }
    }
}

impl WordbookConfig {
    /// Defaults, then `path` (or the default config file when it exists),
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.clamp();
        Ok(config)
    }

    /// Overrides fields from `WORDBOOK_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = var("WORDBOOK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = var("WORDBOOK_STORE_BACKEND") {
            self.store_backend = StoreBackend::parse(&backend)?;
        }
        if let Some(capacity) = var("WORDBOOK_MEMORY_CAPACITY").and_then(|v| v.parse().ok()) {
            self.memory_capacity = capacity;
        }
        if let Some(limit) = var("WORDBOOK_WARM_LIMIT").and_then(|v| v.parse().ok()) {
            self.warm_limit = limit;
        }
        if let Some(path) = var("WORDBOOK_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(url) = var("WORDBOOK_REMOTE_URL") {
            self.remote.base_url = Some(url);
        }
        if let Some(token) = var("WORDBOOK_REMOTE_TOKEN") {
            self.remote.token = Some(token);
        }
        if let Some(timeout) = var("WORDBOOK_REMOTE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.remote.timeout_ms = timeout;
        }
        if let Some(limit) = var("WORDBOOK_DAILY_LIMIT").and_then(|v| v.parse().ok()) {
            self.usage.daily_limit = limit;
        }
        if let Some(cost) = var("WORDBOOK_COST_PER_CALL").and_then(|v| v.parse().ok()) {
            self.usage.cost_per_call = cost;
        }
        self.clamp();
        Ok(())
    }

    fn clamp(&mut self) {
        self.memory_capacity = self.memory_capacity.clamp(1, 100_000);
        self.warm_limit = self.warm_limit.min(self.memory_capacity);
        self.remote.timeout_ms = self.remote.timeout_ms.clamp(100, 300_000);
        if !self.usage.cost_per_call.is_finite() || self.usage.cost_per_call < 0.0 {
            self.usage.cost_per_call = DEFAULT_COST_PER_CALL;
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("wordbook"))
        .unwrap_or_else(|| PathBuf::from(".wordbook"))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wordbook").join(CONFIG_FILE_NAME))
}
