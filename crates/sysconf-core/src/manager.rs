//! Permission-checked facade over the engine
//!
//! [`ConfigurationManager`] owns the current document and every store. Each
//! operation takes a session token, checks the permission it needs, does
//! its work, writes audit entries, and updates the metrics registry.
//! Updates are serialized by holding the document lock for the whole
//! merge, validate, version sequence.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sysconf_audit::{AuditEvent, AuditEventType, AuditFilter, AuditLogger, AuditSeverity};
use sysconf_rbac::{AccessControl, AccessError, Permission, Session};
use sysconf_storage::Storage;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backup::{
    spawn_schedule_sweep, BackupFilter, BackupManager, BackupOptions, BackupType,
    ConfigurationBackup, ConfigurationSource, RestoreOptions, RestoreOutcome,
};
use crate::codec::{self, ExportOptions, Format};
use crate::diff::ConfigurationChange;
use crate::encryption::{self, EncryptionMetadata};
use crate::error::{ConfigError, Result};
use crate::merge::{merge, ConfigurationConflict, MergeStrategy};
use crate::metrics::EngineMetrics;
use crate::model::{default_document, Environment};
use crate::optimizer::{analyze, OptimizationReport};
use crate::profile::ProfileManager;
use crate::settings::EngineSettings;
use crate::validation::{ConfigValidator, ValidationResult};
use crate::value::ConfigValue;
use crate::version::{ConfigurationVersion, VersionManager};

/// Result of an applied update or import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    /// New active version; `None` when nothing changed
    pub version: Option<ConfigurationVersion>,
    pub changes: Vec<ConfigurationChange>,
    pub conflicts: Vec<ConfigurationConflict>,
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_import_backup_id: Option<String>,
}

pub struct ConfigurationManager {
    current: RwLock<ConfigValue>,
    settings: EngineSettings,
    validator: ConfigValidator,
    versions: VersionManager,
    backups: Arc<BackupManager>,
    profiles: ProfileManager,
    access: Mutex<AccessControl>,
    audit: Mutex<AuditLogger>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn auth_failure_reason(err: &AccessError) -> &'static str {
    match err {
        AccessError::InvalidCredentials { .. } => "invalid_credentials",
        AccessError::LockedOut { .. } => "locked_out",
        AccessError::SessionNotFound => "session_not_found",
        AccessError::SessionExpired => "session_expired",
        AccessError::PermissionDenied { .. } => "permission_denied",
        _ => "other",
    }
}

impl ConfigurationManager {
    /// A manager resuming from the stored active version, or from the
    /// default document when the store has none
    pub async fn new(storage: Arc<dyn Storage>, settings: EngineSettings) -> Result<Self> {
        let manager = Self::with_document(storage, settings, default_document())?;
        if let Some(active) = manager.versions.active_version().await? {
            info!(version = %active.version, id = %active.id, "Resuming from active version");
            *manager.current.write().await = active.configuration;
        }
        Ok(manager)
    }

    pub fn with_document(
        storage: Arc<dyn Storage>,
        settings: EngineSettings,
        document: ConfigValue,
    ) -> Result<Self> {
        Ok(Self {
            current: RwLock::new(document),
            validator: ConfigValidator::new(),
            versions: VersionManager::new(Arc::clone(&storage)),
            backups: Arc::new(BackupManager::new(storage, settings.backup.clone())),
            profiles: ProfileManager::new(),
            access: Mutex::new(AccessControl::new(settings.access.clone())),
            audit: Mutex::new(AuditLogger::new(settings.audit.clone())),
            metrics: EngineMetrics::new()?,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn backups(&self) -> Arc<BackupManager> {
        Arc::clone(&self.backups)
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Snapshot of the current document
    pub async fn current(&self) -> ConfigValue {
        self.current.read().await.clone()
    }

    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<()> {
        self.access.lock().await.add_user(username, password, permissions)?;
        self.record(
            AuditEvent::new(AuditEventType::Security, "system", "user_added", username),
        )
        .await;
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let result = self.access.lock().await.authenticate(username, password);
        match result {
            Ok(session) => {
                self.record(AuditEvent::new(AuditEventType::Access, username, "login", "session"))
                    .await;
                Ok(session)
            }
            Err(err) => {
                let reason = auth_failure_reason(&err);
                self.metrics.record_auth_failure(reason);
                let severity = if err.is_locked_out() {
                    AuditSeverity::Error
                } else {
                    AuditSeverity::Warning
                };
                self.record(
                    AuditEvent::security(username, "login_failed", "session")
                        .with_severity(severity)
                        .with_details(json!({ "reason": reason })),
                )
                .await;
                Err(err.into())
            }
        }
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.access.lock().await.logout(token)
    }

    async fn authorize(&self, token: &str, permission: Permission) -> Result<Session> {
        let (result, actor) = {
            let mut access = self.access.lock().await;
            let result = access.require_permission(token, permission);
            // A denied permission still has a live session naming the actor
            let actor = match &result {
                Err(AccessError::PermissionDenied { .. }) => {
                    access.validate_session(token).ok().map(|s| s.username)
                }
                _ => None,
            };
            (result, actor)
        };
        match result {
            Ok(session) => Ok(session),
            Err(err) => {
                self.metrics.record_auth_failure(auth_failure_reason(&err));
                let actor = actor.unwrap_or_else(|| "unknown".to_string());
                self.record(
                    AuditEvent::security(actor, "access_denied", permission.to_string())
                        .with_details(json!({ "reason": err.to_string() })),
                )
                .await;
                Err(err.into())
            }
        }
    }

    async fn record(&self, event: AuditEvent) {
        self.audit.lock().await.log(event);
    }

    /// Validate a document and count the outcome
    pub fn validate(&self, doc: &ConfigValue) -> ValidationResult {
        let started = Instant::now();
        let result = self.validator.validate(doc);
        self.metrics
            .record_validation(result.is_valid, started.elapsed().as_secs_f64());
        result
    }

    /// Merge `incoming`, validate, then record and activate a new version
    pub async fn apply_update(
        &self,
        token: &str,
        incoming: &ConfigValue,
        strategy: &MergeStrategy,
        reason: &str,
    ) -> Result<UpdateOutcome> {
        let session = self.authorize(token, Permission::Write).await?;
        self.apply_as(&session, incoming, strategy, reason).await
    }

    async fn apply_as(
        &self,
        session: &Session,
        incoming: &ConfigValue,
        strategy: &MergeStrategy,
        reason: &str,
    ) -> Result<UpdateOutcome> {
        let mut current = self.current.write().await;

        let outcome = merge(&current, incoming, strategy, &self.settings.merge)?;
        let validation = self.validate(&outcome.merged);
        if !validation.is_valid {
            warn!(
                user = %session.username,
                errors = validation.errors.len(),
                "Update rejected by validation"
            );
            self.record(
                AuditEvent::new(
                    AuditEventType::ConfigurationChange,
                    &session.username,
                    "update_rejected",
                    "configuration",
                )
                .with_severity(AuditSeverity::Warning)
                .with_details(json!({
                    "reason": reason,
                    "errors": validation.errors.iter().map(|e| e.code.clone()).collect::<Vec<_>>(),
                })),
            )
            .await;
            return Err(ConfigError::ValidationFailed(Box::new(validation)));
        }

        if outcome.changes.is_empty() {
            return Ok(UpdateOutcome {
                version: None,
                changes: Vec::new(),
                conflicts: outcome.conflicts,
                validation,
                pre_import_backup_id: None,
            });
        }

        let parent = self.versions.active_version().await?.map(|v| v.id);
        let created = self
            .versions
            .create_version(&outcome.merged, parent.as_deref(), &session.username, reason)
            .await?;
        self.metrics
            .record_version(&created.metadata.compatibility.to_string());
        let activated = self.versions.activate_version(&created.id).await?;
        *current = outcome.merged;

        for change in &outcome.changes {
            self.record(
                AuditEvent::new(
                    AuditEventType::ConfigurationChange,
                    &session.username,
                    change.operation.to_string(),
                    &change.field,
                )
                .with_details(json!({
                    "old": change.old_value,
                    "new": change.new_value,
                    "reason": reason,
                    "version": activated.version,
                })),
            )
            .await;
        }
        info!(
            user = %session.username,
            version = %activated.version,
            changes = outcome.changes.len(),
            "Configuration updated"
        );

        Ok(UpdateOutcome {
            version: Some(activated),
            changes: outcome.changes,
            conflicts: outcome.conflicts,
            validation,
            pre_import_backup_id: None,
        })
    }

    /// Parse `text` and merge it in, taking a pre-import backup first
    pub async fn import(
        &self,
        token: &str,
        text: &str,
        format: Format,
        strategy: &MergeStrategy,
    ) -> Result<UpdateOutcome> {
        let session = self.authorize(token, Permission::Import).await?;
        let incoming = codec::parse(text, format)?;

        let snapshot = self.current().await;
        let backup = self
            .backups
            .create_backup(
                &snapshot,
                &BackupOptions::new(BackupType::PreImport, &session.username)
                    .with_description(format!("Before {} import", format)),
            )
            .await?;
        self.metrics.record_backup(&BackupType::PreImport.to_string());

        let result = self
            .apply_as(&session, &incoming, strategy, &format!("import ({})", format))
            .await;
        self.record(
            AuditEvent::new(AuditEventType::Import, &session.username, "import", format.to_string())
                .with_severity(if result.is_ok() {
                    AuditSeverity::Info
                } else {
                    AuditSeverity::Warning
                })
                .with_details(json!({
                    "strategy": strategy.to_string(),
                    "backup": backup.id,
                    "ok": result.is_ok(),
                })),
        )
        .await;

        let mut outcome = result?;
        outcome.pre_import_backup_id = Some(backup.id);
        Ok(outcome)
    }

    pub async fn export(&self, token: &str, format: Format, options: &ExportOptions) -> Result<String> {
        let session = self.authorize(token, Permission::Export).await?;
        let text = codec::serialize(&*self.current.read().await, format, options)?;
        self.record(
            AuditEvent::new(AuditEventType::Export, &session.username, "export", format.to_string())
                .with_details(json!({
                    "sensitive": options.sensitive,
                    "bytes": text.len(),
                })),
        )
        .await;
        Ok(text)
    }

    pub async fn create_backup(&self, token: &str, options: BackupOptions) -> Result<ConfigurationBackup> {
        let session = self.authorize(token, Permission::Backup).await?;
        let options = BackupOptions {
            created_by: session.username.clone(),
            ..options
        };
        let snapshot = self.current().await;
        let backup = self.backups.create_backup(&snapshot, &options).await?;
        self.metrics.record_backup(&backup.backup_type.to_string());
        self.record(
            AuditEvent::new(AuditEventType::Backup, &session.username, "create", &backup.id)
                .with_details(json!({ "name": backup.name, "type": backup.backup_type })),
        )
        .await;
        Ok(backup)
    }

    pub async fn list_backups(&self, token: &str, filter: &BackupFilter) -> Result<Vec<ConfigurationBackup>> {
        self.authorize(token, Permission::Read).await?;
        self.backups.list_backups(filter).await
    }

    /// Restore a backup as a new active version; nothing changes on failure
    pub async fn restore_backup(
        &self,
        token: &str,
        id: &str,
        create_pre_restore_backup: bool,
    ) -> Result<RestoreOutcome> {
        let session = self.authorize(token, Permission::Restore).await?;
        let options = RestoreOptions {
            create_pre_restore_backup,
            restored_by: session.username.clone(),
        };

        let mut current = self.current.write().await;
        let result = self.backups.restore_from_backup(id, &current, &options).await;
        self.metrics.record_restore(result.is_ok());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record(
                    AuditEvent::new(AuditEventType::Restore, &session.username, "restore_failed", id)
                        .with_severity(AuditSeverity::Error)
                        .with_details(json!({ "error": err.to_string() })),
                )
                .await;
                return Err(err);
            }
        };
        if outcome.pre_restore_backup_id.is_some() {
            self.metrics.record_backup(&BackupType::PreRestore.to_string());
        }

        if !outcome.changes.is_empty() {
            let parent = self.versions.active_version().await?.map(|v| v.id);
            let created = self
                .versions
                .create_version(
                    &outcome.configuration,
                    parent.as_deref(),
                    &session.username,
                    &format!("restore {}", id),
                )
                .await?;
            self.metrics
                .record_version(&created.metadata.compatibility.to_string());
            self.versions.activate_version(&created.id).await?;
        }
        *current = outcome.configuration.clone();

        self.record(
            AuditEvent::new(AuditEventType::Restore, &session.username, "restore", id)
                .with_details(json!({
                    "changes": outcome.changes.len(),
                    "preRestoreBackup": outcome.pre_restore_backup_id,
                })),
        )
        .await;
        Ok(outcome)
    }

    /// Make `id` the active version and its snapshot the current document
    pub async fn activate_version(&self, token: &str, id: &str) -> Result<ConfigurationVersion> {
        let session = self.authorize(token, Permission::Write).await?;
        let mut current = self.current.write().await;
        let activated = self.versions.activate_version(id).await?;
        *current = activated.configuration.clone();
        self.record(
            AuditEvent::new(AuditEventType::VersionActivation, &session.username, "activate", id)
                .with_details(json!({ "version": activated.version })),
        )
        .await;
        Ok(activated)
    }

    /// Resolve a profile, activate it, and replace the current document with it
    pub async fn apply_profile(&self, token: &str, profile_id: &str) -> Result<UpdateOutcome> {
        let session = self.authorize(token, Permission::Write).await?;
        let resolved = self.profiles.resolve(profile_id).await?;
        let profile = self.profiles.get(profile_id).await?;
        let outcome = self
            .apply_as(
                &session,
                &resolved,
                &MergeStrategy::Replace,
                &format!("profile {}", profile.name),
            )
            .await?;
        self.profiles.activate(profile_id).await?;
        Ok(outcome)
    }

    pub async fn analyze(&self, token: &str, environment: Option<Environment>) -> Result<OptimizationReport> {
        self.authorize(token, Permission::Read).await?;
        let env = environment.unwrap_or(self.settings.environment);
        Ok(analyze(&*self.current.read().await, env))
    }

    /// Encrypted copy of the current document; the stored document is unchanged
    pub async fn encrypt_current(
        &self,
        token: &str,
        password: &str,
    ) -> Result<(ConfigValue, EncryptionMetadata)> {
        let session = self.authorize(token, Permission::Encrypt).await?;
        let result = encryption::encrypt(&*self.current.read().await, password, &self.settings.encryption);
        self.metrics.record_encryption("encrypt", result.is_ok());
        if let Ok((_, metadata)) = &result {
            self.record(
                AuditEvent::new(AuditEventType::Security, &session.username, "encrypt", "configuration")
                    .with_details(json!({ "fields": metadata.encrypted_fields })),
            )
            .await;
        }
        result
    }

    pub async fn decrypt_document(
        &self,
        token: &str,
        document: &ConfigValue,
        password: &str,
        metadata: &EncryptionMetadata,
    ) -> Result<ConfigValue> {
        let session = self.authorize(token, Permission::Encrypt).await?;
        let result = encryption::decrypt(document, password, metadata);
        self.metrics.record_encryption("decrypt", result.is_ok());
        if result.is_err() {
            self.record(
                AuditEvent::security(&session.username, "decrypt_failed", "configuration"),
            )
            .await;
        }
        result
    }

    pub async fn audit_events(&self, token: &str, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        self.authorize(token, Permission::Admin).await?;
        Ok(self.audit.lock().await.query(filter).into_iter().cloned().collect())
    }

    /// Audit export as JSON or CSV
    pub async fn export_audit(&self, token: &str, filter: &AuditFilter, csv: bool) -> Result<String> {
        self.authorize(token, Permission::Admin).await?;
        let audit = self.audit.lock().await;
        Ok(if csv {
            audit.export_csv(filter)?
        } else {
            audit.export_json(filter)?
        })
    }

    /// Run the scheduled-backup sweep against this manager's document
    pub fn start_backup_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let source: Arc<dyn ConfigurationSource> = Arc::clone(self) as Arc<dyn ConfigurationSource>;
        spawn_schedule_sweep(self.backups(), source, self.settings.schedule_sweep_period())
    }
}

#[async_trait]
impl ConfigurationSource for ConfigurationManager {
    async fn current_configuration(&self) -> Result<ConfigValue> {
        Ok(self.current().await)
    }
}
