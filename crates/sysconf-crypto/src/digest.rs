//! SHA-256 checksums

use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Recompute the digest of `data` and compare it with `expected`
pub fn verify_sha256_hex(data: &[u8], expected: &str) -> bool {
    let actual = sha256_hex(data);
    constant_time_eq(actual.as_bytes(), expected.to_ascii_lowercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify() {
        let digest = sha256_hex(b"payload");
        assert_eq!(digest.len(), 64);
        assert!(verify_sha256_hex(b"payload", &digest));
        assert!(verify_sha256_hex(b"payload", &digest.to_uppercase()));
        assert!(!verify_sha256_hex(b"payloae", &digest));
        assert!(!verify_sha256_hex(b"payload", "abc"));
    }
}
