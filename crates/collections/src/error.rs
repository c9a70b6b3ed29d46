use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Store error: {0}")]
    StoreError(#[from] wordbook_kv_store::StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A collection named '{0}' already exists")]
    DuplicateName(String),

    #[error("The default collection cannot be deleted")]
    DefaultCollection,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

impl CollectionError {
    pub fn collection_not_found(id: u64) -> Self {
        Self::NotFound(format!("collection {id}"))
    }

    pub fn entry_not_found(collection_id: u64, entry_id: u64) -> Self {
        Self::NotFound(format!("entry {entry_id} in collection {collection_id}"))
    }
}
