//! Error types for cryptographic operations

use thiserror::Error;

/// Errors produced by key derivation, encryption, and decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material has the wrong length or shape
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid parameter such as a zero iteration count
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The system random generator failed
    #[error("Random generation failed")]
    RandomFailure,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication tag did not verify (wrong key, wrong context, or tampered data)
    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    /// Sealed data could not be decoded
    #[error("Invalid encrypted data format: {0}")]
    InvalidFormat(String),
}

impl CryptoError {
    /// Whether the error indicates a wrong password or tampered ciphertext
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CryptoError::AuthenticationFailed)
    }
}

/// Result alias for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CryptoError::InvalidKey("too short".to_string()).to_string(),
            "Invalid key: too short"
        );
        assert!(CryptoError::AuthenticationFailed.is_authentication_failure());
        assert!(!CryptoError::RandomFailure.is_authentication_failure());
    }
}
