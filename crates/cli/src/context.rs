use crate::config::{StoreBackend, WordbookConfig};
use crate::library::Library;
use anyhow::{Context as AnyhowContext, Result};
use std::sync::Arc;
use wordbook_collections::{
    CandidateFilter, CollectionStore, MasteryIndex, UserDefaultsStore,
};
use wordbook_dictionary::{
    BundledCatalog, DefinitionResolver, HttpClientConfig, HttpDefinitionClient, MemoryIndex,
    OfflineClient, PersistentCache, RemoteDefinitionClient, UsageTracker,
};
use wordbook_kv_store::{DurableStore, FileStore, MemoryStore};

/// Every long-lived service, built once per process and shared by reference.
pub struct AppContext {
    pub config: WordbookConfig,
    pub store: Arc<dyn DurableStore>,
    pub memory: Arc<MemoryIndex>,
    pub catalog: Arc<BundledCatalog>,
    pub cache: Arc<PersistentCache>,
    pub remote: Arc<dyn RemoteDefinitionClient>,
    pub usage: Arc<UsageTracker>,
    pub resolver: Arc<DefinitionResolver>,
    pub defaults: Arc<UserDefaultsStore>,
    pub collections: Arc<CollectionStore>,
    pub mastery: Arc<MasteryIndex>,
}

impl AppContext {
    /// Opens the configured store and remote backend, then warms up.
    pub async fn open(config: WordbookConfig) -> Result<Self> {
        let store: Arc<dyn DurableStore> = match config.store_backend {
            StoreBackend::File => Arc::new(
                FileStore::open(&config.data_dir)
                    .await
                    .with_context(|| format!("Failed to open {}", config.data_dir.display()))?,
            ),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let remote: Arc<dyn RemoteDefinitionClient> = match &config.remote.base_url {
            Some(base_url) => {
                let mut http = HttpClientConfig::new(base_url.clone());
                http.token = config.remote.token.clone();
                http.timeout = config.remote.timeout();
                Arc::new(HttpDefinitionClient::new(http).context("Failed to build remote client")?)
            }
            None => {
                log::debug!("No remote backend configured; lookups stay local");
                Arc::new(OfflineClient)
            }
        };

        let context = Self::from_parts(config, store, remote)?;
        context.warm_up().await?;
        Ok(context)
    }

    /// Wires services over an existing store and remote client without
    /// touching either.
    pub fn from_parts(
        config: WordbookConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn RemoteDefinitionClient>,
    ) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => BundledCatalog::from_file(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?,
            None => BundledCatalog::builtin(),
        };

        let memory = Arc::new(MemoryIndex::new(config.memory_capacity));
        let catalog = Arc::new(catalog);
        let cache = Arc::new(PersistentCache::new(store.clone()));
        let usage = Arc::new(UsageTracker::new(
            store.clone(),
            config.usage.cost_per_call,
        ));
        let resolver = Arc::new(DefinitionResolver::new(
            memory.clone(),
            catalog.clone(),
            cache.clone(),
            remote.clone(),
            usage.clone(),
        ));
        let defaults = Arc::new(UserDefaultsStore::new(store.clone()));
        let collections = Arc::new(CollectionStore::new(store.clone()));
        let mastery = Arc::new(MasteryIndex::new(store.clone(), collections.clone()));

        Ok(Self {
            config,
            store,
            memory,
            catalog,
            cache,
            remote,
            usage,
            resolver,
            defaults,
            collections,
            mastery,
        })
    }

    /// Preloads cached definitions, loads the mastery index and makes sure the
    /// default collection exists.
    pub async fn warm_up(&self) -> Result<()> {
        match self.resolver.warm(self.config.warm_limit).await {
            Ok(loaded) => log::debug!("Preloaded {loaded} cached definitions"),
            Err(err) => log::warn!("Failed to preload cached definitions: {err}"),
        }
        self.mastery.initialize().await;
        self.collections
            .ensure_default_collection()
            .await
            .context("Failed to prepare the default collection")?;
        Ok(())
    }

    pub fn library(&self) -> Library {
        Library::new(self, CandidateFilter::default())
    }
}
