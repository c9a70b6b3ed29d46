//! # Wordbook KV Store
//!
//! Durable key/value persistence for the Wordbook storage core.
//!
//! ## Features
//!
//! - **Pluggable backends** behind the [`DurableStore`] trait
//! - **Crash-safe file backend**: one file per key, written via temp file + rename
//! - **Namespaced key layout** shared by every component ([`keys`])
//! - **Single-key transactions** via snapshot + compensating write ([`TransactionalWriter`])
//!
//! ## Architecture
//!
//! ```text
//! component (collections, defaults, cache, ...)
//!     │
//!     ├──> TransactionalWriter::apply(key, mutate)
//!     │      ├─> snapshot = get(key)
//!     │      ├─> set(key, mutate(snapshot))
//!     │      └─> on failure: set(key, snapshot), return original error
//!     │
//!     └──> DurableStore (MemoryStore | FileStore)
//! ```
//!
//! The store offers no multi-key atomicity. Invariants that span two keys
//! (a collection list and the mastery index, for example) are repaired by
//! rebuilding the derived key, never by a joint transaction.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wordbook_kv_store::{keys, FileStore, StoreError, TransactionalWriter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileStore::open("./data").await?);
//!     let writer = TransactionalWriter::new(store);
//!
//!     let words: Vec<String> = writer
//!         .apply_json(keys::MASTERY_INDEX, |current: Option<Vec<String>>| {
//!             let mut words = current.unwrap_or_default();
//!             words.push("apple".to_string());
//!             Ok::<_, StoreError>(words)
//!         })
//!         .await?;
//!     println!("{} mastered words", words.len());
//!     Ok(())
//! }
//! ```

mod error;
mod file;
pub mod keys;
mod memory;
mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod transaction;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{get_json, set_json, DurableStore};
pub use transaction::TransactionalWriter;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating on clock errors.
#[must_use]
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
