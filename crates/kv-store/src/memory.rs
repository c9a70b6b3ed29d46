use crate::error::Result;
use crate::store::DurableStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("memory store mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries
            .lock()
            .expect("memory store mutex poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("memory store mutex poisoned")
            .remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .expect("memory store mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
