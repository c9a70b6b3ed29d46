//! # Wordbook Dictionary
//!
//! Local-first word-definition lookup with a single batched remote fallback.
//!
//! ## Features
//!
//! - **Tiered resolution**: memory index → bundled catalog → persistent cache → remote
//! - **One remote batch per call**: the full miss-list goes out in a single request
//! - **Tagged remote results** ([`RemoteResult`]) instead of loosely-typed payloads
//! - **Advisory usage quota** for metered generation calls ([`UsageTracker`])
//!
//! ## Architecture
//!
//! ```text
//! resolve(words)
//!     │  normalize + dedupe (first-seen order)
//!     ├──> MemoryIndex (lru, 1000 entries)          hit → memory
//!     ├──> BundledCatalog (immutable)               hit → bundled, promoted
//!     ├──> PersistentCache (cache:{word})           hit → persistent-cache, promoted
//!     └──> RemoteDefinitionClient::generate(misses) once
//!             ├─> store in memory + cache           → remote
//!             ├─> per-word errors dropped (warn)
//!             └─> gemini_calls → UsageTracker
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wordbook_dictionary::{
//!     BundledCatalog, DefinitionResolver, MemoryIndex, OfflineClient, PersistentCache,
//!     UsageTracker, DEFAULT_COST_PER_CALL,
//! };
//! use wordbook_kv_store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let resolver = DefinitionResolver::new(
//!         Arc::new(MemoryIndex::default()),
//!         Arc::new(BundledCatalog::builtin()),
//!         Arc::new(PersistentCache::new(store.clone())),
//!         Arc::new(OfflineClient),
//!         Arc::new(UsageTracker::new(store, DEFAULT_COST_PER_CALL)),
//!     );
//!
//!     for definition in resolver.resolve(&["hello", "Hello "]).await {
//!         println!("{} ({})", definition.word, definition.provenance);
//!     }
//!     Ok(())
//! }
//! ```

mod catalog;
mod error;
mod memory_index;
mod persistent_cache;
mod remote;
mod resolver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;
mod usage;

pub use catalog::BundledCatalog;
pub use error::{DictionaryError, Result};
pub use memory_index::{MemoryIndex, DEFAULT_MEMORY_CAPACITY};
pub use persistent_cache::{CacheStats, CachedDefinition, PersistentCache, DEFAULT_WARM_LIMIT};
pub use remote::{
    GenerateRequest, HttpClientConfig, HttpDefinitionClient, OfflineClient, RemoteBatch,
    RemoteDefinitionClient, RemoteResult, DEFAULT_TIMEOUT_MS, GENERATE_PATH,
};
pub use resolver::{DefinitionResolver, ResolveReport, ResolverStatus};
pub use types::{
    clamp_difficulty, normalize_word, Example, Meaning, PartOfSpeech, Provenance,
    WordDefinition, MAX_DIFFICULTY, MIN_DIFFICULTY,
};
pub use usage::{QuotaStatus, UsageStats, UsageTracker, DEFAULT_COST_PER_CALL, DEFAULT_DAILY_LIMIT};
