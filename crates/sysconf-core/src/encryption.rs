//! Field-level encryption of configuration documents
//!
//! A 256-bit key is derived from a password with PBKDF2-HMAC-SHA256 and a
//! fresh salt. Each selected field is replaced in place by
//! `enc:v1:<base64(nonce || ciphertext)>`; the plaintext is the field's
//! canonical JSON, and the dotted field path is bound as associated data so
//! a ciphertext cannot be moved to another field.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysconf_crypto::{derive_key, generate_salt, SealedBox, SecretKey};
use tracing::{debug, info};

use crate::codec::DEFAULT_SENSITIVE_FIELDS;
use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, FieldPath, PathPattern};

/// Prefix marking an encrypted leaf
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

pub const AES_256_GCM: &str = "aes-256-gcm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDerivation {
    #[default]
    Pbkdf2,
    Scrypt,
    Argon2id,
}

impl fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDerivation::Pbkdf2 => write!(f, "pbkdf2"),
            KeyDerivation::Scrypt => write!(f, "scrypt"),
            KeyDerivation::Argon2id => write!(f, "argon2id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub algorithm: String,
    pub key_derivation: KeyDerivation,
    pub iterations: u32,
    pub salt_length: usize,
    /// Dotted paths or wildcard patterns to encrypt
    pub fields: Vec<String>,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            algorithm: AES_256_GCM.to_string(),
            key_derivation: KeyDerivation::Pbkdf2,
            iterations: 100_000,
            salt_length: 16,
            fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EncryptionSettings {
    fn check_supported(algorithm: &str, kdf: KeyDerivation) -> Result<()> {
        if algorithm != AES_256_GCM {
            return Err(ConfigError::not_implemented(format!("cipher '{}'", algorithm)));
        }
        if kdf != KeyDerivation::Pbkdf2 {
            return Err(ConfigError::not_implemented(format!("key derivation '{}'", kdf)));
        }
        Ok(())
    }
}

/// Everything needed, besides the password, to decrypt a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    pub algorithm: String,
    pub key_derivation: KeyDerivation,
    /// Base64 salt
    pub salt: String,
    pub iterations: u32,
    pub encrypted_fields: Vec<String>,
    pub encrypted_at: DateTime<Utc>,
}

pub fn is_encrypted_value(value: &ConfigValue) -> bool {
    value.as_str().map_or(false, |s| s.starts_with(ENCRYPTED_PREFIX))
}

/// Encrypt every present field named by `settings.fields`
pub fn encrypt(
    config: &ConfigValue,
    password: &str,
    settings: &EncryptionSettings,
) -> Result<(ConfigValue, EncryptionMetadata)> {
    EncryptionSettings::check_supported(&settings.algorithm, settings.key_derivation)?;

    let salt = generate_salt(settings.salt_length)?;
    let key = derive_key(password, &salt, settings.iterations)?;

    let mut selected: Vec<FieldPath> = Vec::new();
    for pattern in &settings.fields {
        for path in PathPattern::parse(pattern).expand(config) {
            if !selected.contains(&path) {
                selected.push(path);
            }
        }
    }

    // Overlapping selections seal the outermost field only
    let mut doc = config.clone();
    let mut encrypted_fields = Vec::new();
    for path in selected.iter().filter(|p| !selected.iter().any(|other| other.is_ancestor_of(p))) {
        let Some(value) = config.get_path(path) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if is_encrypted_value(value) {
            return Err(ConfigError::invalid_input(format!("field '{}' is already encrypted", path)));
        }
        let field = path.to_string();
        let sealed = seal_value(&key, &field, value)?;
        doc.set_path(path, ConfigValue::String(sealed))?;
        debug!(field = %field, "Field encrypted");
        encrypted_fields.push(field);
    }

    info!(fields = encrypted_fields.len(), "Configuration encrypted");
    let metadata = EncryptionMetadata {
        algorithm: settings.algorithm.clone(),
        key_derivation: settings.key_derivation,
        salt: STANDARD.encode(&salt),
        iterations: settings.iterations,
        encrypted_fields,
        encrypted_at: Utc::now(),
    };
    Ok((doc, metadata))
}

/// Restore every field in `metadata.encrypted_fields`; nothing is returned
/// unless all of them decrypt
pub fn decrypt(
    config: &ConfigValue,
    password: &str,
    metadata: &EncryptionMetadata,
) -> Result<ConfigValue> {
    EncryptionSettings::check_supported(&metadata.algorithm, metadata.key_derivation)?;

    let salt = STANDARD
        .decode(&metadata.salt)
        .map_err(|e| ConfigError::invalid_input(format!("encryption salt: {}", e)))?;
    let key = derive_key(password, &salt, metadata.iterations)?;

    // Reverse order opens an enclosing field before anything sealed inside it
    let mut doc = config.clone();
    for field in metadata.encrypted_fields.iter().rev() {
        let path = FieldPath::parse(field);
        let sealed = doc
            .get_path(&path)
            .and_then(ConfigValue::as_str)
            .and_then(|s| s.strip_prefix(ENCRYPTED_PREFIX))
            .map(str::to_owned)
            .ok_or_else(|| {
                ConfigError::invalid_input(format!("field '{}' does not hold an encrypted value", field))
            })?;
        let value = open_value(&key, field, &sealed)?;
        doc.set_path(&path, value)?;
    }

    info!(fields = metadata.encrypted_fields.len(), "Configuration decrypted");
    Ok(doc)
}

fn seal_value(key: &SecretKey, field: &str, value: &ConfigValue) -> Result<String> {
    let plaintext = serde_json::to_vec(value).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
    let sealed = sysconf_crypto::encrypt(key, &plaintext, field.as_bytes())?;
    Ok(format!("{}{}", ENCRYPTED_PREFIX, sealed.to_base64()))
}

fn open_value(key: &SecretKey, field: &str, encoded: &str) -> Result<ConfigValue> {
    let sealed = SealedBox::from_base64(encoded)?;
    let plaintext = sysconf_crypto::decrypt(key, &sealed, field.as_bytes())?;
    Ok(serde_json::from_slice(&plaintext)?)
}
