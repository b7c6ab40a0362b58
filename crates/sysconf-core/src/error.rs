//! Error types for the configuration engine
//!
//! Validation findings are data (see [`crate::validation`]); the variants
//! here are integration faults returned as `Err`.

use sysconf_audit::AuditError;
use sysconf_crypto::CryptoError;
use sysconf_rbac::AccessError;
use sysconf_storage::StorageError;
use thiserror::Error;

use crate::validation::ValidationResult;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Document could not be parsed in the requested format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Document could not be serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Format name not recognized
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// Format is recognized but the operation is not available for it
    #[error("Unsupported operation for format {format}: {operation}")]
    UnsupportedFormat { format: String, operation: String },

    /// Selector recognized but deliberately not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Invalid argument or path
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Stored payload does not match its checksum
    #[error("Checksum mismatch for backup {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Incoming document failed validation and was not applied
    #[error("Validation failed with {} error(s)", .0.errors.len())]
    ValidationFailed(Box<ValidationResult>),

    /// Operation conflicts with current state (e.g. deleting the active version)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Access denied: {0}")]
    Access(#[from] AccessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl ConfigError {
    pub fn parse_error(msg: impl Into<String>) -> Self {
        ConfigError::ParseError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ConfigError::InvalidInput(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        ConfigError::NotImplemented(msg.into())
    }

    pub fn unsupported(format: impl Into<String>, operation: impl Into<String>) -> Self {
        ConfigError::UnsupportedFormat {
            format: format.into(),
            operation: operation.into(),
        }
    }

    /// Whether the caller supplied something wrong (vs an internal fault)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConfigError::ParseError(_)
                | ConfigError::UnknownFormat(_)
                | ConfigError::UnsupportedFormat { .. }
                | ConfigError::NotImplemented(_)
                | ConfigError::InvalidInput(_)
                | ConfigError::VersionNotFound(_)
                | ConfigError::BackupNotFound(_)
                | ConfigError::ProfileNotFound(_)
                | ConfigError::ValidationFailed(_)
                | ConfigError::Access(_)
        )
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(format!("TOML error: {}", err))
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SerializationError(format!("TOML error: {}", err))
    }
}

impl From<prometheus::Error> for ConfigError {
    fn from(err: prometheus::Error) -> Self {
        ConfigError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
