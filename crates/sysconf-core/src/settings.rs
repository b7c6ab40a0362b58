//! Settings for the engine itself
//!
//! Loaded from a TOML file (every table optional), then overridden by
//! `SYSCONF_*` environment variables. Unparseable overrides are ignored with
//! a warning and the file or default value stays in effect.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysconf_audit::AuditConfig;
use sysconf_rbac::AccessPolicy;
use tracing::{debug, warn};

use crate::backup::BackupPolicy;
use crate::encryption::EncryptionSettings;
use crate::error::Result;
use crate::merge::MergePolicy;
use crate::model::Environment;

pub const ENV_PREFIX: &str = "SYSCONF_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Environment used for analysis and templates when none is given
    pub environment: Environment,
    pub backup: BackupPolicy,
    pub access: AccessPolicy,
    pub audit: AuditConfig,
    pub encryption: EncryptionSettings,
    pub merge: MergePolicy,
    /// Period of the scheduled-backup sweep
    pub schedule_sweep_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            backup: BackupPolicy::default(),
            access: AccessPolicy::default(),
            audit: AuditConfig::default(),
            encryption: EncryptionSettings::default(),
            merge: MergePolicy::default(),
            schedule_sweep_secs: 60,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut settings = Self::from_toml_str(&text)?;
        settings.apply_env_overrides();
        debug!(path = %path.as_ref().display(), "Engine settings loaded");
        Ok(settings)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by full variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T> {
            let key = format!("{}{}", ENV_PREFIX, name);
            let raw = lookup(&key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(variable = %key, value = %raw, "Ignoring unparseable override");
                    None
                }
            }
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        if let Some(env) = parsed::<Environment>(lookup, "ENVIRONMENT") {
            self.environment = env;
        }
        if let Some(v) = parsed(lookup, "MAX_BACKUPS") {
            self.backup.max_backups = v;
        }
        if let Some(v) = parsed(lookup, "BACKUP_MAX_AGE_DAYS") {
            self.backup.max_age_days = Some(v);
        }
        if let Some(v) = parsed(lookup, "MAX_FAILED_ATTEMPTS") {
            self.access.max_failed_attempts = v;
        }
        if let Some(v) = parsed(lookup, "LOCKOUT_MINUTES") {
            self.access.lockout_minutes = v;
        }
        if let Some(v) = parsed(lookup, "SESSION_TTL_MINUTES") {
            self.access.session_ttl_minutes = v;
        }
        if let Some(v) = parsed(lookup, "AUDIT_RETENTION_DAYS") {
            self.audit.retention_days = v;
        }
        if let Some(v) = parsed(lookup, "AUDIT_MAX_ENTRIES") {
            self.audit.max_entries = v;
        }
        if let Some(v) = parsed(lookup, "KDF_ITERATIONS") {
            self.encryption.iterations = v;
        }
        if let Some(v) = parsed(lookup, "SCHEDULE_SWEEP_SECS") {
            self.schedule_sweep_secs = v;
        }
    }

    pub fn schedule_sweep_period(&self) -> Duration {
        Duration::from_secs(self.schedule_sweep_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = EngineSettings::from_toml_str(
            r#"
            environment = "production"

            [backup]
            max_backups = 20

            [access]
            lockout_minutes = 30
            "#,
        )
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.backup.max_backups, 20);
        assert_eq!(settings.backup.max_age_days, None);
        assert_eq!(settings.access.lockout_minutes, 30);
        assert_eq!(settings.access.max_failed_attempts, 5);
        assert_eq!(settings.encryption.iterations, 100_000);
        assert_eq!(settings.audit.retention_days, 90);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SYSCONF_MAX_BACKUPS", "7"),
            ("SYSCONF_BACKUP_MAX_AGE_DAYS", "30"),
            ("SYSCONF_ENVIRONMENT", "prod"),
            ("SYSCONF_KDF_ITERATIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut settings = EngineSettings::default();
        settings.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.backup.max_backups, 7);
        assert_eq!(settings.backup.max_age_days, Some(30));
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.encryption.iterations, 100_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "schedule_sweep_secs = 5\n[audit]\nmax_entries = 50").unwrap();

        let settings = EngineSettings::load(file.path()).unwrap();
        assert_eq!(settings.audit.max_entries, 50);
        assert_eq!(settings.schedule_sweep_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EngineSettings::from_toml_str("backup = 3").is_err());
    }
}
