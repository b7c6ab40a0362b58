//! System configuration engine
//!
//! Configurations are JSON-like documents ([`ConfigValue`]) checked against
//! a three-stage validator (schema, dependency rules, cross-references).
//! Around that sit:
//!
//! - **Diff and merge**: path-level change lists and strategy-driven merges
//!   with conflict detection ([`diff`], [`merge`])
//! - **Versioning**: immutable snapshots with semantic version bumps and
//!   compatibility classification ([`VersionManager`])
//! - **Backups**: checksummed, optionally compressed snapshots with
//!   retention and scheduling ([`BackupManager`])
//! - **Codecs**: JSON, YAML, TOML, ENV and XML export with masking
//!   ([`codec`])
//! - **Field encryption**: AES-256-GCM for sensitive paths ([`encryption`])
//! - **Profiles and templates** per environment ([`ProfileManager`])
//! - **Optimization analysis** across performance, security, maintenance
//!   and cost ([`optimizer`])
//!
//! [`ConfigurationManager`] ties these together behind session-based
//! permission checks, an audit trail, and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sysconf_core::{ConfigurationManager, EngineSettings, MergeStrategy};
//! use sysconf_rbac::Permission;
//! use sysconf_storage::MemoryStorage;
//!
//! # async fn run() -> sysconf_core::Result<()> {
//! let manager = ConfigurationManager::new(Arc::new(MemoryStorage::new()), EngineSettings::default()).await?;
//! manager.add_user("ops", "hunter22", [Permission::Admin]).await?;
//! let session = manager.login("ops", "hunter22").await?;
//!
//! let patch = serde_json::json!({ "api": { "port": 9000 } }).into();
//! let outcome = manager
//!     .apply_update(&session.token, &patch, &MergeStrategy::Merge, "move api port")
//!     .await?;
//! println!("now at {:?}", outcome.version.map(|v| v.version));
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod codec;
pub mod diff;
pub mod encryption;
pub mod error;
pub mod manager;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod profile;
pub mod settings;
pub mod validation;
pub mod value;
pub mod version;

pub use backup::{
    BackupFilter, BackupFrequency, BackupManager, BackupOptions, BackupPolicy, BackupSchedule,
    BackupType, ConfigurationBackup, ConfigurationSource, RestoreOptions, RestoreOutcome,
};
pub use codec::{ExportOptions, ExportScope, Format, SensitiveHandling};
pub use diff::{diff, ChangeOperation, ConfigurationChange};
pub use encryption::{EncryptionMetadata, EncryptionSettings, KeyDerivation};
pub use error::{ConfigError, Result};
pub use manager::{ConfigurationManager, UpdateOutcome};
pub use merge::{merge, ConfigurationConflict, ConflictResolution, MergeOutcome, MergePolicy, MergeStrategy};
pub use metrics::EngineMetrics;
pub use model::{default_document, Environment, SystemConfiguration};
pub use optimizer::{analyze, OptimizationReport, Priority, Recommendation};
pub use profile::{ConfigurationProfile, ProfileManager};
pub use settings::EngineSettings;
pub use validation::{ConfigValidator, ValidationResult};
pub use value::{ConfigValue, FieldPath, PathPattern};
pub use version::{Compatibility, ConfigurationVersion, VersionManager, VersionStatus};
