//! Environment profiles and templates
//!
//! A profile is an override document layered on the default configuration,
//! optionally on top of a parent profile. Resolution walks the parent chain
//! to the root and deep-merges `defaults <- root ... <- profile`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConfigError, Result};
use crate::merge::{merge, MergePolicy, MergeStrategy};
use crate::model::{default_document, Environment};
use crate::value::ConfigValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationProfile {
    pub id: String,
    pub name: String,
    pub environment: Environment,
    /// Partial document applied over the parent's resolution
    pub overrides: ConfigValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Override document for a built-in template
pub fn template_overrides(environment: Environment) -> Result<ConfigValue> {
    let overrides = match environment {
        Environment::Development => json!({
            "api": {
                "cors": {"origins": ["http://localhost:3000", "http://localhost:5173"]}
            },
            "features": {"debugMode": true},
            "monitoring": {
                "logLevel": "debug",
                "tracing": {"enabled": true, "sampleRate": 1.0}
            },
            "performance": {"workerThreads": 2}
        }),
        Environment::Production => json!({
            "api": {
                "cors": {"origins": ["https://app.example.com"]},
                "rateLimit": {"requestsPerMinute": 1200, "burst": 100}
            },
            "features": {"debugMode": false},
            "security": {
                "https": {
                    "enabled": true,
                    "certificatePath": "/etc/sysconf/tls/cert.pem",
                    "keyPath": "/etc/sysconf/tls/key.pem"
                }
            },
            "monitoring": {
                "logLevel": "warn",
                "tracing": {"enabled": true, "sampleRate": 0.05}
            },
            "performance": {
                "maxConcurrentRequests": 500,
                "workerThreads": 8,
                "connectionPool": {"min": 5, "max": 50}
            }
        }),
        Environment::Testing => json!({
            "api": {"port": 18080},
            "services": {"llm": {"timeout": 5000}},
            "features": {"caching": {"enabled": false}},
            "monitoring": {
                "logLevel": "error",
                "metrics": {"enabled": false},
                "healthCheck": {"enabled": false}
            },
            "performance": {
                "workerThreads": 1,
                "connectionPool": {"min": 1, "max": 2}
            }
        }),
        other => {
            return Err(ConfigError::invalid_input(format!(
                "no built-in template for environment '{}'",
                other
            )))
        }
    };
    Ok(ConfigValue::from(overrides))
}

/// Defaults with a template's overrides applied
pub fn render_template(environment: Environment) -> Result<ConfigValue> {
    layer(&default_document(), &template_overrides(environment)?)
}

fn layer(base: &ConfigValue, overrides: &ConfigValue) -> Result<ConfigValue> {
    Ok(merge(base, overrides, &MergeStrategy::Merge, &MergePolicy::default())?.merged)
}

#[derive(Debug, Default)]
pub struct ProfileManager {
    profiles: RwLock<BTreeMap<String, ConfigurationProfile>>,
}

impl ProfileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_profile(
        &self,
        name: &str,
        environment: Environment,
        overrides: ConfigValue,
        parent: Option<&str>,
    ) -> Result<ConfigurationProfile> {
        if !overrides.is_object() {
            return Err(ConfigError::invalid_input("profile overrides must be an object"));
        }
        let mut profiles = self.profiles.write().await;
        if profiles.values().any(|p| p.name == name) {
            return Err(ConfigError::Conflict(format!("profile '{}' already exists", name)));
        }
        if let Some(parent) = parent {
            if !profiles.contains_key(parent) {
                return Err(ConfigError::ProfileNotFound(parent.to_string()));
            }
        }

        let profile = ConfigurationProfile {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            environment,
            overrides,
            parent: parent.map(str::to_string),
            active: false,
            created_at: Utc::now(),
        };
        profiles.insert(profile.id.clone(), profile.clone());
        info!(id = %profile.id, name = %name, environment = %environment, "Profile created");
        Ok(profile)
    }

    /// New profile seeded with a built-in template's overrides
    pub async fn from_template(&self, environment: Environment) -> Result<ConfigurationProfile> {
        let overrides = template_overrides(environment)?;
        self.create_profile(&environment.to_string(), environment, overrides, None)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<ConfigurationProfile> {
        self.profiles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(id.to_string()))
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ConfigurationProfile> {
        self.profiles
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .cloned()
    }

    /// All profiles, ordered by name
    pub async fn list(&self) -> Vec<ConfigurationProfile> {
        let mut profiles: Vec<ConfigurationProfile> =
            self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// Re-parent a profile; refuses to create a cycle
    pub async fn set_parent(&self, id: &str, parent: Option<&str>) -> Result<ConfigurationProfile> {
        let mut profiles = self.profiles.write().await;
        if !profiles.contains_key(id) {
            return Err(ConfigError::ProfileNotFound(id.to_string()));
        }
        if let Some(parent) = parent {
            let mut cursor = Some(parent.to_string());
            while let Some(current) = cursor {
                if current == id {
                    return Err(ConfigError::Conflict(format!(
                        "making '{}' the parent of '{}' would create a cycle",
                        parent, id
                    )));
                }
                cursor = profiles
                    .get(&current)
                    .ok_or_else(|| ConfigError::ProfileNotFound(current.clone()))?
                    .parent
                    .clone();
            }
        }
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| ConfigError::ProfileNotFound(id.to_string()))?;
        profile.parent = parent.map(str::to_string);
        Ok(profile.clone())
    }

    /// Defaults, then each ancestor from the root down, then the profile
    pub async fn resolve(&self, id: &str) -> Result<ConfigValue> {
        let profiles = self.profiles.read().await;

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id.to_string());
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                return Err(ConfigError::Conflict(format!(
                    "profile inheritance cycle through '{}'",
                    current
                )));
            }
            let profile = profiles
                .get(&current)
                .ok_or_else(|| ConfigError::ProfileNotFound(current.clone()))?;
            cursor = profile.parent.clone();
            chain.push(profile);
        }

        let mut doc = default_document();
        for profile in chain.iter().rev() {
            doc = layer(&doc, &profile.overrides)?;
        }
        debug!(id = %id, depth = chain.len(), "Profile resolved");
        Ok(doc)
    }

    /// Make `id` the only active profile
    pub async fn activate(&self, id: &str) -> Result<ConfigurationProfile> {
        let mut profiles = self.profiles.write().await;
        if !profiles.contains_key(id) {
            return Err(ConfigError::ProfileNotFound(id.to_string()));
        }
        for profile in profiles.values_mut() {
            profile.active = profile.id == id;
        }
        let activated = profiles
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(id.to_string()))?;
        info!(id = %id, name = %activated.name, "Profile activated");
        Ok(activated)
    }

    pub async fn active(&self) -> Option<ConfigurationProfile> {
        self.profiles
            .read()
            .await
            .values()
            .find(|p| p.active)
            .cloned()
    }

    /// Remove an inactive profile that no other profile inherits from
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get(id)
            .ok_or_else(|| ConfigError::ProfileNotFound(id.to_string()))?;
        if profile.active {
            return Err(ConfigError::Conflict(format!("profile '{}' is active", profile.name)));
        }
        if profiles.values().any(|p| p.parent.as_deref() == Some(id)) {
            return Err(ConfigError::Conflict(format!(
                "profile '{}' has child profiles",
                profile.name
            )));
        }
        profiles.remove(id);
        info!(id = %id, "Profile deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ConfigValidator;

    #[test]
    fn test_templates_validate_cleanly() {
        let validator = ConfigValidator::new();
        for env in [Environment::Development, Environment::Production, Environment::Testing] {
            let doc = render_template(env).unwrap();
            let result = validator.validate(&doc);
            assert!(result.is_valid, "{}: {:?}", env, result.errors);
        }
    }

    #[test]
    fn test_template_values() {
        let prod = render_template(Environment::Production).unwrap();
        assert_eq!(prod.get("security.https.enabled"), Some(&ConfigValue::Boolean(true)));
        assert_eq!(prod.get("monitoring.logLevel"), Some(&ConfigValue::from("warn")));
        // untouched defaults survive
        assert_eq!(prod.get("api.port"), Some(&ConfigValue::Integer(8080)));

        assert!(template_overrides(Environment::Staging).is_err());
    }

    #[tokio::test]
    async fn test_resolve_parent_chain() {
        let profiles = ProfileManager::new();
        let base = profiles.from_template(Environment::Production).await.unwrap();
        let eu = profiles
            .create_profile(
                "prod-eu",
                Environment::Production,
                ConfigValue::from(json!({"api": {"host": "eu.example.com"}, "performance": {"workerThreads": 16}})),
                Some(&base.id),
            )
            .await
            .unwrap();

        let doc = profiles.resolve(&eu.id).await.unwrap();
        assert_eq!(doc.get("api.host"), Some(&ConfigValue::from("eu.example.com")));
        assert_eq!(doc.get("performance.workerThreads"), Some(&ConfigValue::Integer(16)));
        assert_eq!(doc.get("security.https.enabled"), Some(&ConfigValue::Boolean(true)));
        assert_eq!(doc.get("api.timeout"), Some(&ConfigValue::Integer(30_000)));
    }

    #[tokio::test]
    async fn test_cycle_rejected() {
        let profiles = ProfileManager::new();
        let a = profiles
            .create_profile("a", Environment::Custom, ConfigValue::object(), None)
            .await
            .unwrap();
        let b = profiles
            .create_profile("b", Environment::Custom, ConfigValue::object(), Some(&a.id))
            .await
            .unwrap();

        let err = profiles.set_parent(&a.id, Some(&b.id)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
        assert!(profiles.resolve(&b.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_single_active_profile() {
        let profiles = ProfileManager::new();
        let dev = profiles.from_template(Environment::Development).await.unwrap();
        let test = profiles.from_template(Environment::Testing).await.unwrap();

        profiles.activate(&dev.id).await.unwrap();
        profiles.activate(&test.id).await.unwrap();

        let active: Vec<_> = profiles.list().await.into_iter().filter(|p| p.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, test.id);
        assert!(matches!(profiles.delete(&test.id).await, Err(ConfigError::Conflict(_))));
        profiles.delete(&dev.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_parent_and_duplicates() {
        let profiles = ProfileManager::new();
        assert!(matches!(
            profiles
                .create_profile("x", Environment::Custom, ConfigValue::object(), Some("missing"))
                .await,
            Err(ConfigError::ProfileNotFound(_))
        ));
        profiles.from_template(Environment::Testing).await.unwrap();
        assert!(matches!(
            profiles.from_template(Environment::Testing).await,
            Err(ConfigError::Conflict(_))
        ));
        assert!(matches!(
            profiles.resolve("missing").await,
            Err(ConfigError::ProfileNotFound(_))
        ));
    }
}
