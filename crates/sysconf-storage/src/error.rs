//! Storage error types

use thiserror::Error;

/// Errors that can occur when reading or writing records
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// sled database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid collection or key name
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
