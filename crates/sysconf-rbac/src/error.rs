//! Access control error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::Permission;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    /// Unknown user or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials {
        /// Attempts left before lockout, when the user exists
        remaining_attempts: Option<u32>,
    },

    /// Account is locked after too many failed attempts
    #[error("Account locked until {until}")]
    LockedOut { until: DateTime<Utc> },

    /// Session token is unknown (or was removed after expiry)
    #[error("Session not found")]
    SessionNotFound,

    /// Session exists but has expired
    #[error("Session expired")]
    SessionExpired,

    /// Session lacks the required permission
    #[error("Permission denied: {permission} required")]
    PermissionDenied { permission: Permission },

    /// User already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Password hashing or hash parsing failed
    #[error("Password hash error: {0}")]
    PasswordHash(String),
}

impl AccessError {
    pub fn is_locked_out(&self) -> bool {
        matches!(self, AccessError::LockedOut { .. })
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
