use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend error on key '{key}': {message}")]
    Backend { key: String, message: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn backend(key: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
