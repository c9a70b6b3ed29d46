//! Store wrappers for exercising failure paths in tests.

use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;
use crate::store::DurableStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Wraps another store and fails writes on demand.
///
/// `fail_writes(key, n)` makes the next `n` writes (`set` or `remove`) to `key`
/// fail. With `n == 1` a transactional write fails and its rollback succeeds;
/// with `n == 2` the rollback fails as well.
pub struct FaultyStore {
    inner: Arc<dyn DurableStore>,
    pending_failures: Mutex<HashMap<String, usize>>,
    fail_everything: AtomicBool,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DurableStore>) -> Self {
        Self {
            inner,
            pending_failures: Mutex::new(HashMap::new()),
            fail_everything: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn fail_writes(&self, key: &str, count: usize) {
        self.pending_failures
            .lock()
            .expect("faulty store mutex poisoned")
            .insert(key.to_string(), count);
    }

    pub fn fail_all_writes(&self, enabled: bool) {
        self.fail_everything.store(enabled, Ordering::SeqCst);
    }

    /// Number of writes that reached the inner store.
    pub fn successful_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, key: &str) -> Result<()> {
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(StoreError::backend(key, "injected failure"));
        }
        let mut pending = self
            .pending_failures
            .lock()
            .expect("faulty store mutex poisoned");
        if let Some(remaining) = pending.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::backend(key, "injected failure"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check_write(key)?;
        self.inner.set(key, value).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write(key)?;
        self.inner.remove(key).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    fn name(&self) -> &str {
        "faulty"
    }
}
