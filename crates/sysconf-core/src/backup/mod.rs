//! Checksummed configuration backups
//!
//! A backup stores the document as canonical JSON, or as base64-encoded
//! gzip of that JSON when compressed. The SHA-256 checksum always covers
//! the stored payload string, so tampering is caught before decoding.
//! Retention runs after every backup: entries older than the optional age
//! limit go first, then the lowest creation sequence until the count cap
//! holds.

pub mod schedule;

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sysconf_crypto::sha256_hex;
use sysconf_storage::{get_json, list_json, Storage};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::DEFAULT_SENSITIVE_FIELDS;
use crate::diff::{diff_as, ConfigurationChange};
use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, PathPattern};

pub use schedule::{
    spawn_schedule_sweep, BackupFrequency, BackupSchedule, ConfigurationSource, ScheduleOutcome,
    ScheduleRun,
};

pub(crate) const COLLECTION: &str = "backups";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupType {
    Manual,
    Scheduled,
    PreImport,
    PreRestore,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupType::Manual => write!(f, "manual"),
            BackupType::Scheduled => write!(f, "scheduled"),
            BackupType::PreImport => write!(f, "pre-import"),
            BackupType::PreRestore => write!(f, "pre-restore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationBackup {
    pub id: String,
    /// `backup-<type>-<timestamp>`
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    /// Canonical JSON, or base64 gzip of it when `compressed`
    pub payload: String,
    pub compressed: bool,
    /// SHA-256 hex of `payload`
    pub checksum: String,
    /// Stored payload length in bytes
    pub size: usize,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sequence: u64,
}

impl ConfigurationBackup {
    /// Whether the stored checksum matches the payload
    pub fn checksum_matches(&self) -> bool {
        sysconf_crypto::verify_sha256_hex(self.payload.as_bytes(), &self.checksum)
    }

    /// Decode the payload back into a document
    pub fn decode(&self) -> Result<ConfigValue> {
        let json = if self.compressed {
            let compressed = STANDARD
                .decode(&self.payload)
                .map_err(|e| ConfigError::parse_error(format!("backup payload: {}", e)))?;
            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut text = String::new();
            decoder.read_to_string(&mut text)?;
            text
        } else {
            self.payload.clone()
        };
        Ok(serde_json::from_str(&json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    pub backup_type: BackupType,
    pub created_by: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub compress: bool,
    pub include_sensitive: bool,
    /// Removed from the snapshot when `include_sensitive` is false
    pub sensitive_fields: Vec<String>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            backup_type: BackupType::Manual,
            created_by: crate::diff::SYSTEM_USER.to_string(),
            description: None,
            tags: Vec::new(),
            compress: false,
            include_sensitive: true,
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BackupOptions {
    pub fn new(backup_type: BackupType, created_by: impl Into<String>) -> Self {
        Self {
            backup_type,
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn without_sensitive(mut self) -> Self {
        self.include_sensitive = false;
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Retention limits applied after every backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupPolicy {
    pub max_backups: usize,
    pub max_age_days: Option<i64>,
}

impl BackupPolicy {
    /// Count cap in force; the newest backup is always kept
    pub fn retained_count(&self) -> usize {
        self.max_backups.max(1)
    }
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_backups: 100,
            max_age_days: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupFilter {
    pub backup_type: Option<BackupType>,
    pub created_by: Option<String>,
    /// Every listed tag must be present
    pub tags: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl BackupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, backup_type: BackupType) -> Self {
        self.backup_type = Some(backup_type);
        self
    }

    pub fn with_creator(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, backup: &ConfigurationBackup) -> bool {
        self.backup_type.map_or(true, |t| backup.backup_type == t)
            && self.created_by.as_ref().map_or(true, |u| &backup.created_by == u)
            && self.tags.iter().all(|t| backup.tags.contains(t))
            && self.start_date.map_or(true, |d| backup.created_at >= d)
            && self.end_date.map_or(true, |d| backup.created_at <= d)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub create_pre_restore_backup: bool,
    pub restored_by: String,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            create_pre_restore_backup: true,
            restored_by: crate::diff::SYSTEM_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub configuration: ConfigValue,
    /// `diff(current, restored)`
    pub changes: Vec<ConfigurationChange>,
    pub pre_restore_backup_id: Option<String>,
}

/// Backup store over an injected [`Storage`] backend
#[derive(Debug)]
pub struct BackupManager {
    pub(crate) storage: Arc<dyn Storage>,
    policy: BackupPolicy,
    write_lock: Mutex<()>,
}

impl BackupManager {
    pub fn new(storage: Arc<dyn Storage>, policy: BackupPolicy) -> Self {
        Self {
            storage,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &BackupPolicy {
        &self.policy
    }

    pub async fn create_backup(
        &self,
        config: &ConfigValue,
        options: &BackupOptions,
    ) -> Result<ConfigurationBackup> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = config.clone();
        if !options.include_sensitive {
            for pattern in &options.sensitive_fields {
                for path in PathPattern::parse(pattern).expand(&snapshot) {
                    snapshot.remove_path(&path);
                }
            }
        }

        let json = serde_json::to_string(&snapshot)?;
        let payload = if options.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(json.as_bytes())?;
            STANDARD.encode(encoder.finish()?)
        } else {
            json
        };

        let existing = self.all().await?;
        let sequence = existing.iter().map(|b| b.sequence).max().unwrap_or(0) + 1;
        let created_at = Utc::now();

        let backup = ConfigurationBackup {
            id: Uuid::new_v4().to_string(),
            name: format!(
                "backup-{}-{}",
                options.backup_type,
                created_at.format("%Y%m%dT%H%M%S%.3fZ")
            ),
            created_at,
            created_by: options.created_by.clone(),
            backup_type: options.backup_type,
            checksum: sha256_hex(payload.as_bytes()),
            size: payload.len(),
            payload,
            compressed: options.compress,
            tags: options.tags.clone(),
            description: options.description.clone(),
            sequence,
        };

        let bytes = serde_json::to_vec(&backup)?;
        self.storage.put(COLLECTION, &backup.id, bytes).await?;
        info!(
            id = %backup.id,
            name = %backup.name,
            backup_type = %backup.backup_type,
            size = backup.size,
            compressed = backup.compressed,
            "Backup created"
        );

        let mut retained = existing;
        retained.push(backup.clone());
        self.apply_retention(retained, created_at).await?;
        Ok(backup)
    }

    /// Evict by age, then by count; returns evicted ids
    async fn apply_retention(
        &self,
        mut backups: Vec<ConfigurationBackup>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        backups.sort_by_key(|b| b.sequence);
        let mut evict: BTreeSet<String> = BTreeSet::new();

        if let Some(days) = self.policy.max_age_days {
            let cutoff = now - Duration::days(days);
            evict.extend(
                backups
                    .iter()
                    .filter(|b| b.created_at < cutoff)
                    .map(|b| b.id.clone()),
            );
        }

        let remaining: Vec<&ConfigurationBackup> =
            backups.iter().filter(|b| !evict.contains(&b.id)).collect();
        let excess = remaining.len().saturating_sub(self.policy.retained_count());
        evict.extend(remaining.iter().take(excess).map(|b| b.id.clone()));

        for id in &evict {
            self.storage.delete(COLLECTION, id).await?;
        }
        if !evict.is_empty() {
            info!(evicted = evict.len(), "Backup retention applied");
        }
        Ok(evict.into_iter().collect())
    }

    /// Restore a backup; the checksum is verified before anything else
    pub async fn restore_from_backup(
        &self,
        id: &str,
        current: &ConfigValue,
        options: &RestoreOptions,
    ) -> Result<RestoreOutcome> {
        let backup = self.get_backup(id).await?;

        if !backup.checksum_matches() {
            let actual = sha256_hex(backup.payload.as_bytes());
            warn!(id = %id, expected = %backup.checksum, actual = %actual, "Backup checksum mismatch");
            return Err(ConfigError::ChecksumMismatch {
                id: id.to_string(),
                expected: backup.checksum,
                actual,
            });
        }
        let configuration = backup.decode()?;

        let pre_restore_backup_id = if options.create_pre_restore_backup {
            let pre = self
                .create_backup(
                    current,
                    &BackupOptions::new(BackupType::PreRestore, &options.restored_by)
                        .with_description(format!("Before restoring {}", backup.name)),
                )
                .await?;
            Some(pre.id)
        } else {
            None
        };

        let changes = diff_as(current, &configuration, &options.restored_by, Some("restore"));
        info!(id = %id, changes = changes.len(), "Backup restored");
        Ok(RestoreOutcome {
            configuration,
            changes,
            pre_restore_backup_id,
        })
    }

    /// Checksum matches and the payload decodes
    pub async fn verify_backup(&self, id: &str) -> Result<bool> {
        let backup = self.get_backup(id).await?;
        let ok = backup.checksum_matches() && backup.decode().is_ok();
        debug!(id = %id, ok, "Backup verified");
        Ok(ok)
    }

    pub async fn get_backup(&self, id: &str) -> Result<ConfigurationBackup> {
        get_json(self.storage.as_ref(), COLLECTION, id)
            .await?
            .ok_or_else(|| ConfigError::BackupNotFound(id.to_string()))
    }

    pub async fn delete_backup(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let deleted = self.storage.delete(COLLECTION, id).await?;
        if deleted {
            info!(id = %id, "Backup deleted");
        }
        Ok(deleted)
    }

    /// Matching backups, newest first, capped at `filter.limit`
    pub async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<ConfigurationBackup>> {
        let mut backups: Vec<ConfigurationBackup> = self
            .all()
            .await?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        backups.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        if let Some(limit) = filter.limit {
            backups.truncate(limit);
        }
        Ok(backups)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.storage.count(COLLECTION).await?)
    }

    async fn all(&self) -> Result<Vec<ConfigurationBackup>> {
        Ok(list_json(self.storage.as_ref(), COLLECTION).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_document;
    use sysconf_storage::MemoryStorage;

    fn manager(policy: BackupPolicy) -> (Arc<MemoryStorage>, BackupManager) {
        let storage = Arc::new(MemoryStorage::new());
        let manager = BackupManager::new(storage.clone(), policy);
        (storage, manager)
    }

    fn secret_document() -> ConfigValue {
        let mut doc = default_document();
        doc.set("services.llm.apiKey", "sk-live-abcdef").unwrap();
        doc.set("security.authentication.jwtSecret", "jwt-signing-secret").unwrap();
        doc
    }

    #[tokio::test]
    async fn test_create_and_restore() {
        let (_, backups) = manager(BackupPolicy::default());
        let doc = default_document();
        let backup = backups
            .create_backup(&doc, &BackupOptions::new(BackupType::Manual, "alice"))
            .await
            .unwrap();

        assert!(backup.name.starts_with("backup-manual-"));
        assert_eq!(backup.checksum, sha256_hex(backup.payload.as_bytes()));
        assert_eq!(backup.size, backup.payload.len());

        let mut current = doc.clone();
        current.set("api.port", 9000).unwrap();
        let outcome = backups
            .restore_from_backup(&backup.id, &current, &RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.configuration, doc);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].field, "api.port");

        let pre = backups
            .get_backup(outcome.pre_restore_backup_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(pre.backup_type, BackupType::PreRestore);
        assert_eq!(pre.decode().unwrap(), current);
    }

    #[tokio::test]
    async fn test_compressed_round_trip() {
        let (_, backups) = manager(BackupPolicy::default());
        let doc = secret_document();
        let backup = backups
            .create_backup(&doc, &BackupOptions::default().compressed())
            .await
            .unwrap();
        assert!(backup.compressed);
        assert!(!backup.payload.contains("jwtSecret"));
        assert_eq!(backup.decode().unwrap(), doc);
        assert!(backups.verify_backup(&backup.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sensitive_fields_stripped() {
        let (_, backups) = manager(BackupPolicy::default());
        let backup = backups
            .create_backup(&secret_document(), &BackupOptions::default().without_sensitive())
            .await
            .unwrap();
        let restored = backup.decode().unwrap();
        assert!(restored.get("services.llm.apiKey").is_none());
        assert!(restored.get("security.authentication.jwtSecret").is_none());
        assert!(restored.get("services.llm.host").is_some());
    }

    #[tokio::test]
    async fn test_tampered_payload_fails_restore() {
        let (storage, backups) = manager(BackupPolicy::default());
        let doc = default_document();
        let backup = backups
            .create_backup(&doc, &BackupOptions::default())
            .await
            .unwrap();

        let mut tampered = backup.clone();
        tampered.payload = tampered.payload.replace("8080", "8081");
        storage
            .put(COLLECTION, &backup.id, serde_json::to_vec(&tampered).unwrap())
            .await
            .unwrap();

        let err = backups
            .restore_from_backup(&backup.id, &doc, &RestoreOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ChecksumMismatch { .. }));
        assert!(!backups.verify_backup(&backup.id).await.unwrap());
        // no pre-restore backup was taken
        assert_eq!(backups.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_newest() {
        let (_, backups) = manager(BackupPolicy {
            max_backups: 5,
            max_age_days: None,
        });
        let doc = default_document();
        for _ in 0..8 {
            backups.create_backup(&doc, &BackupOptions::default()).await.unwrap();
        }
        let listed = backups.list_backups(&BackupFilter::new()).await.unwrap();
        let sequences: Vec<u64> = listed.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![8, 7, 6, 5, 4]);
    }

    #[tokio::test]
    async fn test_zero_cap_keeps_latest_backup() {
        let (_, backups) = manager(BackupPolicy {
            max_backups: 0,
            max_age_days: None,
        });
        let doc = default_document();
        backups.create_backup(&doc, &BackupOptions::default()).await.unwrap();
        let latest = backups.create_backup(&doc, &BackupOptions::default()).await.unwrap();

        assert_eq!(backups.count().await.unwrap(), 1);
        assert_eq!(backups.get_backup(&latest.id).await.unwrap().id, latest.id);
    }

    #[tokio::test]
    async fn test_age_retention() {
        let (storage, backups) = manager(BackupPolicy {
            max_backups: 100,
            max_age_days: Some(30),
        });
        let doc = default_document();
        let old = backups.create_backup(&doc, &BackupOptions::default()).await.unwrap();

        let mut aged = old.clone();
        aged.created_at = Utc::now() - Duration::days(45);
        storage
            .put(COLLECTION, &old.id, serde_json::to_vec(&aged).unwrap())
            .await
            .unwrap();

        backups.create_backup(&doc, &BackupOptions::default()).await.unwrap();
        assert_eq!(backups.count().await.unwrap(), 1);
        assert!(matches!(
            backups.get_backup(&old.id).await,
            Err(ConfigError::BackupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filtering() {
        let (_, backups) = manager(BackupPolicy::default());
        let doc = default_document();
        backups
            .create_backup(&doc, &BackupOptions::new(BackupType::Manual, "alice").with_tags(["nightly"]))
            .await
            .unwrap();
        backups
            .create_backup(&doc, &BackupOptions::new(BackupType::Scheduled, "cron"))
            .await
            .unwrap();
        backups
            .create_backup(&doc, &BackupOptions::new(BackupType::Manual, "bob"))
            .await
            .unwrap();

        let manual = backups
            .list_backups(&BackupFilter::new().with_type(BackupType::Manual))
            .await
            .unwrap();
        let creators: Vec<&str> = manual.iter().map(|b| b.created_by.as_str()).collect();
        assert_eq!(creators, vec!["bob", "alice"]);

        let tagged = backups
            .list_backups(&BackupFilter::new().with_tag("nightly"))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let newest = backups
            .list_backups(&BackupFilter::new().with_limit(1))
            .await
            .unwrap();
        assert_eq!(newest[0].created_by, "bob");
    }

    #[tokio::test]
    async fn test_missing_backup() {
        let (_, backups) = manager(BackupPolicy::default());
        assert!(matches!(
            backups.get_backup("nope").await,
            Err(ConfigError::BackupNotFound(_))
        ));
        assert!(!backups.delete_backup("nope").await.unwrap());
    }

    #[test]
    fn test_backup_type_serde() {
        assert_eq!(
            serde_json::to_string(&BackupType::PreImport).unwrap(),
            "\"pre-import\""
        );
        assert_eq!(BackupType::PreRestore.to_string(), "pre-restore");
    }
}
