use thiserror::Error;

pub type Result<T> = std::result::Result<T, DictionaryError>;

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("Store error: {0}")]
    StoreError(#[from] wordbook_kv_store::StoreError),

    #[error("Remote definition service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for DictionaryError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable(err.to_string())
    }
}
