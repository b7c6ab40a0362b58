//! End-to-end behavior of the configuration engine

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use sysconf_core::backup::{BackupFilter, BackupManager, BackupOptions, BackupPolicy, RestoreOptions};
use sysconf_core::codec::DEFAULT_SENSITIVE_FIELDS;
use sysconf_core::diff::apply_changes;
use sysconf_core::encryption::{self, EncryptionSettings};
use sysconf_core::{
    default_document, diff, merge, BackupType, ConfigError, ConfigValidator, ConfigValue,
    ConfigurationBackup, ConfigurationManager, EngineSettings, MergePolicy, MergeStrategy,
};
use sysconf_rbac::{AccessControl, AccessError, AccessPolicy, Permission};
use sysconf_storage::{MemoryStorage, SledStorage, Storage};

fn leaf() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        Just(ConfigValue::Null),
        any::<bool>().prop_map(ConfigValue::Boolean),
        any::<i64>().prop_map(ConfigValue::Integer),
        "[a-z0-9 ]{0,8}".prop_map(ConfigValue::String),
    ]
}

fn document() -> impl Strategy<Value = ConfigValue> {
    let value = leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(ConfigValue::Array),
            prop::collection::btree_map("[a-e]{1,2}", inner, 0..4).prop_map(ConfigValue::Object),
        ]
    });
    prop::collection::btree_map("[a-e]{1,2}", value, 0..5).prop_map(ConfigValue::Object)
}

proptest! {
    #[test]
    fn prop_diff_then_apply_reproduces_target(a in document(), b in document()) {
        let changes = diff(&a, &b);
        prop_assert_eq!(apply_changes(&a, &changes).unwrap(), b);
    }

    #[test]
    fn prop_self_diff_is_empty(a in document()) {
        prop_assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn prop_self_merge_is_identity(a in document()) {
        let outcome = merge(&a, &a, &MergeStrategy::Merge, &MergePolicy::default()).unwrap();
        prop_assert_eq!(outcome.merged, a);
        prop_assert!(outcome.changes.is_empty());
    }
}

#[tokio::test]
async fn tampered_backup_fails_restore() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let backups = BackupManager::new(Arc::clone(&storage), BackupPolicy::default());
    let doc = default_document();
    let backup = backups
        .create_backup(&doc, &BackupOptions::new(BackupType::Manual, "ops"))
        .await
        .unwrap();
    assert!(backups.verify_backup(&backup.id).await.unwrap());

    let raw = storage.get("backups", &backup.id).await.unwrap().unwrap();
    let mut stored: ConfigurationBackup = serde_json::from_slice(&raw).unwrap();
    stored.payload = stored.payload.replace("\"localhost\"", "\"evil.example\"");
    storage
        .put("backups", &backup.id, serde_json::to_vec(&stored).unwrap())
        .await
        .unwrap();

    let err = backups
        .restore_from_backup(&backup.id, &doc, &RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::ChecksumMismatch { .. }), "{:?}", err);
    assert!(!backups.verify_backup(&backup.id).await.unwrap());
}

#[test]
fn every_default_sensitive_path_round_trips() {
    let mut doc = default_document();
    doc.set("services.llm.apiKey", "sk-live-123").unwrap();
    doc.set("services.database.password", "pg-pass").unwrap();
    doc.set("security.authentication.jwtSecret", "jwt-secret-value").unwrap();
    doc.set("security.encryption.masterKey", "master-key").unwrap();
    doc.set("monitoring.alerting.webhookUrl", "https://hooks.example.com/x").unwrap();

    let settings = EncryptionSettings {
        iterations: 1_000,
        ..EncryptionSettings::default()
    };
    assert_eq!(settings.fields.len(), DEFAULT_SENSITIVE_FIELDS.len());

    let (encrypted, metadata) = encryption::encrypt(&doc, "correct horse", &settings).unwrap();
    assert_eq!(metadata.encrypted_fields.len(), 5);
    for field in &metadata.encrypted_fields {
        let value = encrypted.get(field).unwrap();
        assert!(encryption::is_encrypted_value(value), "{} left in clear", field);
    }

    let decrypted = encryption::decrypt(&encrypted, "correct horse", &metadata).unwrap();
    assert_eq!(decrypted, doc);

    assert!(encryption::decrypt(&encrypted, "wrong horse", &metadata).is_err());
}

#[test]
fn https_without_certificate_is_one_error() {
    let validator = ConfigValidator::new();
    let mut doc = default_document();
    doc.set("security.https.enabled", true).unwrap();

    let result = validator.validate(&doc);
    assert!(!result.is_valid);
    let matching: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.code == "DEP_HTTPS_REQUIRES_CERTIFICATE")
        .collect();
    assert_eq!(matching.len(), 1);

    doc.set("security.https.certificatePath", "/etc/ssl/server.pem").unwrap();
    let result = validator.validate(&doc);
    assert!(result
        .errors
        .iter()
        .all(|e| e.code != "DEP_HTTPS_REQUIRES_CERTIFICATE"));
    assert!(result.is_valid);
}

#[test]
fn five_failures_lock_alice_out() {
    let mut access = AccessControl::new(AccessPolicy {
        max_failed_attempts: 5,
        ..AccessPolicy::default()
    });
    access.add_user("alice", "s3cret-pass", [Permission::Read]).unwrap();

    for _ in 0..5 {
        assert!(access.authenticate("alice", "nope").is_err());
    }
    let err = access.authenticate("alice", "s3cret-pass").unwrap_err();
    assert!(matches!(err, AccessError::LockedOut { .. }), "{:?}", err);
}

#[tokio::test]
async fn retention_keeps_newest_hundred() {
    let backups = BackupManager::new(
        Arc::new(MemoryStorage::new()),
        BackupPolicy {
            max_backups: 100,
            max_age_days: None,
        },
    );

    let mut created = Vec::new();
    for i in 0..105i64 {
        let mut doc = default_document();
        doc.set("api.timeout", 1_000 + i).unwrap();
        let backup = backups
            .create_backup(&doc, &BackupOptions::new(BackupType::Scheduled, "cron"))
            .await
            .unwrap();
        created.push(backup.id);
    }

    assert_eq!(backups.count().await.unwrap(), 100);
    let listed = backups.list_backups(&BackupFilter::new()).await.unwrap();
    let kept: Vec<_> = listed.iter().map(|b| b.id.clone()).collect();
    let mut expected: Vec<_> = created[5..].to_vec();
    expected.reverse();
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn manager_persists_through_sled() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path().join("store")).unwrap());

    let manager = ConfigurationManager::new(Arc::clone(&storage), EngineSettings::default())
        .await
        .unwrap();
    manager.add_user("ops", "ops-password", [Permission::Admin]).await.unwrap();
    let token = manager.login("ops", "ops-password").await.unwrap().token;

    let patch: ConfigValue = json!({"features": {"debugMode": true}}).into();
    let outcome = manager
        .apply_update(&token, &patch, &MergeStrategy::Merge, "debug on")
        .await
        .unwrap();
    let version_id = outcome.version.unwrap().id;
    manager
        .create_backup(&token, BackupOptions::new(BackupType::Manual, "ignored").compressed())
        .await
        .unwrap();
    drop(manager);

    let reopened = ConfigurationManager::new(storage, EngineSettings::default())
        .await
        .unwrap();
    let active = reopened.versions().active_version().await.unwrap().unwrap();
    assert_eq!(active.id, version_id);
    assert_eq!(reopened.current().await, active.configuration);
    assert_eq!(
        active.configuration.get("features.debugMode"),
        Some(&ConfigValue::Boolean(true))
    );
    let backups = reopened.backups().list_backups(&BackupFilter::new()).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].created_by, "ops");
    assert!(backups[0].compressed);

    reopened.add_user("ops", "ops-password", [Permission::Admin]).await.unwrap();
    let token = reopened.login("ops", "ops-password").await.unwrap().token;
    let patch: ConfigValue = json!({"api": {"port": 9000}}).into();
    let outcome = reopened
        .apply_update(&token, &patch, &MergeStrategy::Merge, "move port")
        .await
        .unwrap();
    assert_eq!(outcome.changes.len(), 1);
    let latest = outcome.version.unwrap().configuration;
    assert_eq!(latest.get("features.debugMode"), Some(&ConfigValue::Boolean(true)));
    assert_eq!(latest.get("api.port"), Some(&ConfigValue::Integer(9000)));
}

#[test]
fn selective_merge_copies_mapped_fields_only() {
    let current = default_document();
    let incoming: ConfigValue = json!({"net": {"port": 7000}, "noise": true}).into();
    let mapping: BTreeMap<String, String> = [("net.port".to_string(), "api.port".to_string())]
        .into_iter()
        .collect();

    let outcome = merge(
        &current,
        &incoming,
        &MergeStrategy::Selective(mapping),
        &MergePolicy::default(),
    )
    .unwrap();
    assert_eq!(outcome.merged.get("api.port"), Some(&ConfigValue::Integer(7000)));
    assert!(outcome.merged.get("noise").is_none());
    assert_eq!(outcome.changes.len(), 1);
}
