//! Immutable, parent-linked configuration versions
//!
//! Every version holds its own deep copy of the document and the change set
//! against its parent. Versions are persisted through the [`Storage`] trait
//! in the `versions` collection; at most one is `active` at a time.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysconf_storage::{get_json, list_json, Storage};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::diff::{diff, diff_as, ChangeOperation, ConfigurationChange};
use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, PathPattern};

const COLLECTION: &str = "versions";

/// Paths whose modification breaks running clients
pub const DEFAULT_SENSITIVE_PATHS: [&str; 6] = [
    "api.host",
    "api.port",
    "services.*.host",
    "services.*.port",
    "services.*.url",
    "security.https.enabled",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Active,
    Archived,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStatus::Draft => write!(f, "draft"),
            VersionStatus::Active => write!(f, "active"),
            VersionStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Impact of a change set, from least to most disruptive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    /// Updates only
    Patch,
    /// Additions
    Minor,
    /// Deletions
    Major,
    /// A sensitive path was touched
    Breaking,
}

impl Compatibility {
    pub fn is_compatible(self) -> bool {
        matches!(self, Compatibility::Patch | Compatibility::Minor)
    }

    pub fn requires_migration(self) -> bool {
        !self.is_compatible()
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Patch => write!(f, "patch"),
            Compatibility::Minor => write!(f, "minor"),
            Compatibility::Major => write!(f, "major"),
            Compatibility::Breaking => write!(f, "breaking"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub author: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub compatibility: Compatibility,
    /// Creation order, used for stable listing
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationVersion {
    pub id: String,
    /// Semantic version string
    pub version: String,
    /// Id of the parent version
    pub parent_version: Option<String>,
    pub configuration: ConfigValue,
    pub changes: Vec<ConfigurationChange>,
    pub status: VersionStatus,
    pub metadata: VersionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionComparison {
    pub from: String,
    pub to: String,
    pub changes: Vec<ConfigurationChange>,
    pub compatibility: Compatibility,
    pub compatible: bool,
    pub migration_required: bool,
    /// Changed paths that touch a sensitive pattern
    pub breaking_paths: Vec<String>,
}

/// Classifies change sets against a list of sensitive path patterns
#[derive(Debug, Clone)]
pub struct CompatibilityClassifier {
    sensitive: Vec<PathPattern>,
}

impl Default for CompatibilityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_PATHS.iter().copied())
    }
}

impl CompatibilityClassifier {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            sensitive: patterns.into_iter().map(PathPattern::parse).collect(),
        }
    }

    /// Changed paths that match a sensitive pattern or replace an ancestor of one
    pub fn breaking_paths(&self, changes: &[ConfigurationChange]) -> Vec<String> {
        changes
            .iter()
            .filter(|c| self.sensitive.iter().any(|p| p.touches(&c.path)))
            .map(|c| c.field.clone())
            .collect()
    }

    pub fn classify(&self, changes: &[ConfigurationChange]) -> Compatibility {
        if !self.breaking_paths(changes).is_empty() {
            Compatibility::Breaking
        } else if changes.iter().any(|c| c.operation == ChangeOperation::Delete) {
            Compatibility::Major
        } else if changes.iter().any(|c| c.operation == ChangeOperation::Add) {
            Compatibility::Minor
        } else {
            Compatibility::Patch
        }
    }
}

/// Next semantic version after `current` for a change of `compatibility`
pub fn bump_version(current: &str, compatibility: Compatibility) -> Result<String> {
    let core = current
        .split(['-', '+'])
        .next()
        .unwrap_or(current);
    let parts: Vec<u64> = core
        .split('.')
        .map(|p| p.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| ConfigError::invalid_input(format!("not a semantic version: {}", current)))?;
    let [major, minor, patch] = parts[..] else {
        return Err(ConfigError::invalid_input(format!(
            "not a semantic version: {}",
            current
        )));
    };

    Ok(match compatibility {
        Compatibility::Breaking | Compatibility::Major => format!("{}.0.0", major + 1),
        Compatibility::Minor => format!("{}.{}.0", major, minor + 1),
        Compatibility::Patch => format!("{}.{}.{}", major, minor, patch + 1),
    })
}

/// Version store over an injected [`Storage`] backend
#[derive(Debug)]
pub struct VersionManager {
    storage: Arc<dyn Storage>,
    classifier: CompatibilityClassifier,
    // serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl VersionManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            classifier: CompatibilityClassifier::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_classifier(mut self, classifier: CompatibilityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &CompatibilityClassifier {
        &self.classifier
    }

    /// Snapshot `config` as a new draft version
    pub async fn create_version(
        &self,
        config: &ConfigValue,
        parent_id: Option<&str>,
        author: &str,
        description: &str,
    ) -> Result<ConfigurationVersion> {
        let _guard = self.write_lock.lock().await;

        let (version, changes, compatibility) = match parent_id {
            Some(parent_id) => {
                let parent = self.load(parent_id).await?;
                let changes = diff_as(&parent.configuration, config, author, Some(description));
                let compatibility = self.classifier.classify(&changes);
                let version = bump_version(&parent.version, compatibility)?;
                (version, changes, compatibility)
            }
            None => ("1.0.0".to_string(), Vec::new(), Compatibility::Patch),
        };

        let sequence = self
            .all()
            .await?
            .iter()
            .map(|v| v.metadata.sequence)
            .max()
            .unwrap_or(0)
            + 1;

        let record = ConfigurationVersion {
            id: Uuid::new_v4().to_string(),
            version,
            parent_version: parent_id.map(str::to_string),
            configuration: config.clone(),
            changes,
            status: VersionStatus::Draft,
            metadata: VersionMetadata {
                author: author.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
                compatibility,
                sequence,
            },
        };
        self.store(&record).await?;

        info!(
            id = %record.id,
            version = %record.version,
            compatibility = %compatibility,
            changes = record.changes.len(),
            "Version created"
        );
        Ok(record)
    }

    /// Activate `id`, archiving the previously active version atomically
    pub async fn activate_version(&self, id: &str) -> Result<ConfigurationVersion> {
        let _guard = self.write_lock.lock().await;

        let versions = self.all().await?;
        let mut target = versions
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| ConfigError::VersionNotFound(id.to_string()))?;

        let mut batch = Vec::new();
        for previous in versions
            .iter()
            .filter(|v| v.status == VersionStatus::Active && v.id != id)
        {
            let mut archived = previous.clone();
            archived.status = VersionStatus::Archived;
            debug!(id = %archived.id, "Archiving previously active version");
            batch.push((archived.id.clone(), serde_json::to_vec(&archived)?));
        }
        target.status = VersionStatus::Active;
        batch.push((target.id.clone(), serde_json::to_vec(&target)?));

        self.storage.put_batch(COLLECTION, batch).await?;
        info!(id = %target.id, version = %target.version, "Version activated");
        Ok(target)
    }

    /// Re-activate an earlier version
    pub async fn rollback(&self, id: &str) -> Result<ConfigurationVersion> {
        let activated = self.activate_version(id).await?;
        info!(id = %id, version = %activated.version, "Rolled back");
        Ok(activated)
    }

    pub async fn compare_versions(&self, from_id: &str, to_id: &str) -> Result<VersionComparison> {
        let from = self.load(from_id).await?;
        let to = self.load(to_id).await?;
        Ok(self.compare_documents(&from.id, &from.configuration, &to.id, &to.configuration))
    }

    /// Compare two arbitrary documents with this manager's classifier
    pub fn compare_documents(
        &self,
        from_label: &str,
        from: &ConfigValue,
        to_label: &str,
        to: &ConfigValue,
    ) -> VersionComparison {
        let changes = diff(from, to);
        let compatibility = self.classifier.classify(&changes);
        VersionComparison {
            from: from_label.to_string(),
            to: to_label.to_string(),
            breaking_paths: self.classifier.breaking_paths(&changes),
            changes,
            compatibility,
            compatible: compatibility.is_compatible(),
            migration_required: compatibility.requires_migration(),
        }
    }

    pub async fn get_version(&self, id: &str) -> Result<ConfigurationVersion> {
        self.load(id).await
    }

    /// All versions in creation order
    pub async fn list_versions(&self) -> Result<Vec<ConfigurationVersion>> {
        self.all().await
    }

    pub async fn active_version(&self) -> Result<Option<ConfigurationVersion>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|v| v.status == VersionStatus::Active))
    }

    /// `id` followed by its ancestors up to the root
    pub async fn history(&self, id: &str) -> Result<Vec<ConfigurationVersion>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                return Err(ConfigError::Conflict(format!(
                    "version parent chain loops at {}",
                    current
                )));
            }
            let version = self.load(&current).await?;
            next = version.parent_version.clone();
            out.push(version);
        }
        Ok(out)
    }

    /// Delete a version that is neither active nor a parent
    pub async fn delete_version(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let versions = self.all().await?;
        let target = versions
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| ConfigError::VersionNotFound(id.to_string()))?;
        if target.status == VersionStatus::Active {
            return Err(ConfigError::Conflict(format!("version {} is active", id)));
        }
        if versions.iter().any(|v| v.parent_version.as_deref() == Some(id)) {
            return Err(ConfigError::Conflict(format!("version {} has children", id)));
        }
        self.storage.delete(COLLECTION, id).await?;
        info!(id = %id, "Version deleted");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<ConfigurationVersion> {
        get_json(self.storage.as_ref(), COLLECTION, id)
            .await?
            .ok_or_else(|| ConfigError::VersionNotFound(id.to_string()))
    }

    async fn store(&self, version: &ConfigurationVersion) -> Result<()> {
        let bytes = serde_json::to_vec(version)?;
        self.storage.put(COLLECTION, &version.id, bytes).await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ConfigurationVersion>> {
        let mut versions: Vec<ConfigurationVersion> =
            list_json(self.storage.as_ref(), COLLECTION).await?;
        versions.sort_by_key(|v| v.metadata.sequence);
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_document;
    use sysconf_storage::MemoryStorage;

    fn manager() -> VersionManager {
        VersionManager::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("1.2.3", Compatibility::Patch).unwrap(), "1.2.4");
        assert_eq!(bump_version("1.2.3", Compatibility::Minor).unwrap(), "1.3.0");
        assert_eq!(bump_version("1.2.3", Compatibility::Major).unwrap(), "2.0.0");
        assert_eq!(bump_version("1.2.3-rc.1", Compatibility::Breaking).unwrap(), "2.0.0");
        assert!(bump_version("1.2", Compatibility::Patch).is_err());
        assert!(bump_version("x.y.z", Compatibility::Patch).is_err());
    }

    #[test]
    fn test_classification() {
        let classifier = CompatibilityClassifier::default();
        let base = default_document();

        let mut updated = base.clone();
        updated.set("api.timeout", 45_000).unwrap();
        assert_eq!(classifier.classify(&diff(&base, &updated)), Compatibility::Patch);

        let mut added = base.clone();
        added.set("features.experimental", true).unwrap();
        assert_eq!(classifier.classify(&diff(&base, &added)), Compatibility::Minor);

        let mut deleted = base.clone();
        deleted.remove_path(&"features.analytics".into());
        assert_eq!(classifier.classify(&diff(&base, &deleted)), Compatibility::Major);

        let mut moved = base.clone();
        moved.set("services.cache.port", 6380).unwrap();
        let changes = diff(&base, &moved);
        assert_eq!(classifier.classify(&changes), Compatibility::Breaking);
        assert_eq!(classifier.breaking_paths(&changes), vec!["services.cache.port"]);
    }

    #[test]
    fn test_ancestor_replacement_is_breaking() {
        let classifier = CompatibilityClassifier::default();
        let base = default_document();
        let mut gone = base.clone();
        gone.remove_path(&"services.vectorStore".into());
        assert_eq!(classifier.classify(&diff(&base, &gone)), Compatibility::Breaking);
    }

    #[tokio::test]
    async fn test_create_version_chain() {
        let versions = manager();
        let base = default_document();

        let root = versions.create_version(&base, None, "alice", "initial").await.unwrap();
        assert_eq!(root.version, "1.0.0");
        assert!(root.changes.is_empty());
        assert_eq!(root.status, VersionStatus::Draft);

        let mut next = base.clone();
        next.set("api.timeout", 45_000).unwrap();
        let child = versions
            .create_version(&next, Some(&root.id), "bob", "raise timeout")
            .await
            .unwrap();
        assert_eq!(child.version, "1.0.1");
        assert_eq!(child.changes.len(), 1);
        assert_eq!(child.changes[0].user, "bob");

        let mut breaking = next.clone();
        breaking.set("api.port", 8443).unwrap();
        let major = versions
            .create_version(&breaking, Some(&child.id), "bob", "move port")
            .await
            .unwrap();
        assert_eq!(major.version, "2.0.0");
        assert_eq!(major.metadata.compatibility, Compatibility::Breaking);

        let history: Vec<String> = versions
            .history(&major.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(history, vec!["2.0.0", "1.0.1", "1.0.0"]);
    }

    #[tokio::test]
    async fn test_unknown_parent() {
        let err = manager()
            .create_version(&default_document(), Some("nope"), "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_single_active_version() {
        let versions = manager();
        let doc = default_document();
        let v1 = versions.create_version(&doc, None, "a", "one").await.unwrap();
        let v2 = versions.create_version(&doc, Some(&v1.id), "a", "two").await.unwrap();

        versions.activate_version(&v1.id).await.unwrap();
        versions.activate_version(&v2.id).await.unwrap();

        let all = versions.list_versions().await.unwrap();
        let active: Vec<&str> = all
            .iter()
            .filter(|v| v.status == VersionStatus::Active)
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(active, vec![v2.id.as_str()]);
        assert_eq!(all[0].status, VersionStatus::Archived);

        // unknown id leaves state untouched
        assert!(versions.activate_version("missing").await.is_err());
        assert_eq!(versions.active_version().await.unwrap().unwrap().id, v2.id);

        versions.rollback(&v1.id).await.unwrap();
        assert_eq!(versions.active_version().await.unwrap().unwrap().id, v1.id);
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let versions = manager();
        let base = default_document();
        let v1 = versions.create_version(&base, None, "a", "one").await.unwrap();

        let mut trimmed = base.clone();
        trimmed.remove_path(&"features.analytics".into());
        let v2 = versions.create_version(&trimmed, Some(&v1.id), "a", "two").await.unwrap();

        let cmp = versions.compare_versions(&v1.id, &v2.id).await.unwrap();
        assert_eq!(cmp.compatibility, Compatibility::Major);
        assert!(!cmp.compatible);
        assert!(cmp.migration_required);
        assert!(cmp.breaking_paths.is_empty());

        let mut https = base.clone();
        https.set("security.https.enabled", true).unwrap();
        let cmp = versions.compare_documents("a", &base, "b", &https);
        assert_eq!(cmp.compatibility, Compatibility::Breaking);
        assert!(!cmp.compatible && cmp.migration_required);
        assert_eq!(cmp.breaking_paths, vec!["security.https.enabled"]);
    }

    #[tokio::test]
    async fn test_delete_version_rules() {
        let versions = manager();
        let doc = default_document();
        let v1 = versions.create_version(&doc, None, "a", "one").await.unwrap();
        let v2 = versions.create_version(&doc, Some(&v1.id), "a", "two").await.unwrap();

        assert!(matches!(
            versions.delete_version(&v1.id).await,
            Err(ConfigError::Conflict(_))
        ));
        versions.activate_version(&v2.id).await.unwrap();
        assert!(matches!(
            versions.delete_version(&v2.id).await,
            Err(ConfigError::Conflict(_))
        ));

        let v3 = versions.create_version(&doc, Some(&v2.id), "a", "three").await.unwrap();
        versions.delete_version(&v3.id).await.unwrap();
        assert!(matches!(
            versions.get_version(&v3.id).await,
            Err(ConfigError::VersionNotFound(_))
        ));
    }
}
