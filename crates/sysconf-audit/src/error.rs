//! Audit error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// Serialization of entries failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// CSV writer failure
    #[error("CSV export error: {0}")]
    CsvError(String),
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for AuditError {
    fn from(err: csv::Error) -> Self {
        AuditError::CsvError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
