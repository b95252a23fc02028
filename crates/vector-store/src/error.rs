use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unsupported collection schema_version {actual} (expected {expected})")]
    SchemaVersion { expected: u32, actual: u32 },

    #[error("{0}")]
    Other(String),
}
