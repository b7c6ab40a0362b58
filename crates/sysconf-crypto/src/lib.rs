//! Cryptographic primitives for the system configuration engine
//!
//! This crate wraps `ring` and `sha2` behind a small surface that the
//! configuration engine builds on:
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 from a password and random salt
//! - **Authenticated encryption**: AES-256-GCM with a fresh nonce per call
//! - **Checksums**: SHA-256 digests, hex-encoded
//!
//! Key material lives in [`SecretKey`], which is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use sysconf_crypto::{decrypt, derive_key, encrypt, generate_salt};
//!
//! let salt = generate_salt(16).unwrap();
//! let key = derive_key("correct horse", &salt, 10_000).unwrap();
//! let sealed = encrypt(&key, b"s3cret", b"security.authentication.jwtSecret").unwrap();
//! let opened = decrypt(&key, &sealed, b"security.authentication.jwtSecret").unwrap();
//! assert_eq!(opened, b"s3cret");
//! ```

pub mod cipher;
pub mod digest;
pub mod error;
pub mod key;

pub use cipher::{decrypt, encrypt, SealedBox, NONCE_LEN};
pub use digest::{sha256_hex, verify_sha256_hex};
pub use error::{CryptoError, Result};
pub use key::{derive_key, generate_salt, random_bytes, SecretKey, KEY_LEN};
