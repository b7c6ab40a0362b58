//! AES-256-GCM authenticated encryption
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce. The caller supplies
//! associated data that is authenticated but not encrypted; decryption with a
//! different associated data value fails the same way a wrong key does.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::key::{random_bytes, SecretKey};

/// Nonce length for AES-256-GCM
pub const NONCE_LEN: usize = 12;

/// Nonce and ciphertext (with appended tag) produced by [`encrypt`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Encode as base64 of `nonce || ciphertext`
    pub fn to_base64(&self) -> String {
        let mut buf = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        STANDARD.encode(buf)
    }

    /// Decode from base64 of `nonce || ciphertext`
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        // 16-byte GCM tag is always present
        if raw.len() < NONCE_LEN + 16 {
            return Err(CryptoError::InvalidFormat(format!(
                "sealed data too short: {} bytes",
                raw.len()
            )));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        Ok(Self {
            nonce: nonce.to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn cipher_for(key: &SecretKey) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("AES-256-GCM key rejected".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext`, binding `aad` as associated data
pub fn encrypt(key: &SecretKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedBox> {
    let cipher = cipher_for(key)?;
    let nonce_bytes = random_bytes(NONCE_LEN)?;
    let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
        .map_err(|_| CryptoError::EncryptionFailed("invalid nonce".to_string()))?;

    let mut in_out = plaintext.to_vec();
    cipher
        .seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailed("seal failed".to_string()))?;

    Ok(SealedBox {
        nonce: nonce_bytes,
        ciphertext: in_out,
    })
}

/// Decrypt a [`SealedBox`] produced by [`encrypt`] with the same key and `aad`
pub fn decrypt(key: &SecretKey, sealed: &SealedBox, aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = Nonce::try_assume_unique_for_key(&sealed.nonce)
        .map_err(|_| CryptoError::InvalidFormat("nonce must be 12 bytes".to_string()))?;

    let mut in_out = sealed.ciphertext.clone();
    let plaintext = cipher
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SecretKey::generate().unwrap();
        let sealed = encrypt(&key, b"hello world", b"ctx").unwrap();
        assert_ne!(sealed.ciphertext, b"hello world");
        assert_eq!(decrypt(&key, &sealed, b"ctx").unwrap(), b"hello world");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let key = SecretKey::generate().unwrap();
        let a = encrypt(&key, b"same", b"").unwrap();
        let b = encrypt(&key, b"same", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let k1 = SecretKey::generate().unwrap();
        let k2 = SecretKey::generate().unwrap();
        let sealed = encrypt(&k1, b"secret", b"").unwrap();
        assert_eq!(
            decrypt(&k2, &sealed, b"").unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = SecretKey::generate().unwrap();
        let sealed = encrypt(&key, b"secret", b"services.llm.apiKey").unwrap();
        assert!(decrypt(&key, &sealed, b"services.cache.password").is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let key = SecretKey::generate().unwrap();
        let sealed = encrypt(&key, b"payload", b"").unwrap();
        let decoded = SealedBox::from_base64(&sealed.to_base64()).unwrap();
        assert_eq!(decoded, sealed);
    }

    #[test]
    fn test_short_input_rejected() {
        let err = SealedBox::from_base64("AAAA").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidFormat(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SecretKey::generate().unwrap();
        let mut sealed = encrypt(&key, b"payload", b"").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(decrypt(&key, &sealed, b"").is_err());
    }
}
