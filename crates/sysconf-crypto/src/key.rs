//! Key material and password-based key derivation

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// Length in bytes of an AES-256 key
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key, wiped from memory when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    /// Build a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Generate a random key
    pub fn generate() -> Result<Self> {
        let bytes = random_bytes(KEY_LEN)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Fill a buffer of `len` bytes from the system CSPRNG
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf).map_err(|_| CryptoError::RandomFailure)?;
    Ok(buf)
}

/// Generate a fresh random salt
pub fn generate_salt(len: usize) -> Result<Vec<u8>> {
    if len < 8 {
        return Err(CryptoError::InvalidParameter(format!(
            "salt length must be at least 8 bytes, got {}",
            len
        )));
    }
    random_bytes(len)
}

/// Derive a 256-bit key from a password using PBKDF2-HMAC-SHA256
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Result<SecretKey> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
        CryptoError::InvalidParameter("iteration count must be non-zero".to_string())
    })?;
    if salt.is_empty() {
        return Err(CryptoError::InvalidParameter("salt must not be empty".to_string()));
    }

    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut out,
    );
    let key = SecretKey::from_bytes(&out);
    out.zeroize();
    key
}
