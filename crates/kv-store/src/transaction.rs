use crate::error::StoreError;
use crate::store::DurableStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Read-modify-write of a single key with snapshot + compensating write.
///
/// If the write of the mutated value fails, the snapshot is written back (or the
/// key removed when there was none) and the original error is returned. If that
/// compensating write fails too, the failure is logged and swallowed: the key may
/// be left holding the mutated value while the caller still sees the original
/// error. Nothing here covers invariants spanning more than one key.
#[derive(Clone)]
pub struct TransactionalWriter {
    store: Arc<dyn DurableStore>,
}

impl TransactionalWriter {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Applies `mutate` to the raw value under `key` and writes the result.
    ///
    /// An error returned by `mutate` aborts before anything is written.
    pub async fn apply<F, E>(&self, key: &str, mutate: F) -> Result<String, E>
    where
        F: FnOnce(Option<&str>) -> Result<String, E> + Send,
        E: From<StoreError>,
    {
        let snapshot = self.store.get(key).await?;
        let next = mutate(snapshot.as_deref())?;

        if let Err(err) = self.store.set(key, next.clone()).await {
            log::warn!("Write to '{key}' failed ({err}); restoring previous value");
            self.compensate(key, snapshot).await;
            return Err(err.into());
        }
        Ok(next)
    }

    /// Typed variant of [`apply`](Self::apply) that (de)serializes JSON.
    pub async fn apply_json<T, F, E>(&self, key: &str, mutate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<T, E> + Send,
        E: From<StoreError>,
    {
        let snapshot = self.store.get(key).await?;
        let current = match snapshot.as_deref() {
            Some(raw) => Some(serde_json::from_str::<T>(raw).map_err(StoreError::from)?),
            None => None,
        };
        let next = mutate(current)?;
        let raw = serde_json::to_string(&next).map_err(StoreError::from)?;

        if let Err(err) = self.store.set(key, raw).await {
            log::warn!("Write to '{key}' failed ({err}); restoring previous value");
            self.compensate(key, snapshot).await;
            return Err(err.into());
        }
        Ok(next)
    }

    async fn compensate(&self, key: &str, snapshot: Option<String>) {
        let restored = match snapshot {
            Some(previous) => self.store.set(key, previous).await,
            None => self.store.remove(key).await,
        };
        if let Err(err) = restored {
            log::error!(
                "Rollback of '{key}' failed: {err}; the key may hold the unconfirmed value"
            );
        }
    }
}
