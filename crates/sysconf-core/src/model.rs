//! Typed system configuration model and default factory
//!
//! The typed tree is what the default factory and templates are written
//! against. Engine operations convert it to a [`ConfigValue`] document with
//! [`SystemConfiguration::to_document`], using the camelCase keys that
//! external documents use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::value::ConfigValue;

/// The six top-level sections of a full document
pub const SECTIONS: [&str; 6] = [
    "api",
    "services",
    "features",
    "security",
    "monitoring",
    "performance",
];

/// Deployment environment a profile or analysis targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
    Testing,
    Custom,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
            Environment::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            "custom" => Ok(Environment::Custom),
            other => Err(ConfigError::invalid_input(format!("unknown environment: {}", other))),
        }
    }
}

/// Root aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemConfiguration {
    /// Semantic version of the configuration format
    pub version: String,
    pub api: ApiConfig,
    pub services: ServicesConfig,
    pub features: FeaturesConfig,
    pub security: SecurityConfig,
    pub monitoring: MonitoringConfig,
    pub performance: PerformanceConfig,
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            api: ApiConfig::default(),
            services: ServicesConfig::default(),
            features: FeaturesConfig::default(),
            security: SecurityConfig::default(),
            monitoring: MonitoringConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl SystemConfiguration {
    /// Convert to the untyped document every engine operation works on
    pub fn to_document(&self) -> ConfigValue {
        // plain structs with string keys always serialize
        ConfigValue::from_serializable(self).unwrap_or_default()
    }

    /// Parse a full document back into the typed tree
    pub fn from_document(doc: &ConfigValue) -> Result<Self> {
        doc.to_typed()
    }
}

/// The default configuration as a document
pub fn default_document() -> ConfigValue {
    SystemConfiguration::default().to_document()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    /// Request timeout in milliseconds
    pub timeout: u64,
    /// Maximum request body in bytes
    pub max_request_size: u64,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_path: "/api/v1".to_string(),
            timeout: 30_000,
            max_request_size: 10 * 1024 * 1024,
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
    pub credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: vec!["http://localhost:3000".to_string()],
            credentials: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 600,
            burst: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicesConfig {
    pub llm: LlmServiceConfig,
    pub vector_store: ServiceEndpoint,
    pub cache: ServiceEndpoint,
    pub database: DatabaseConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            llm: LlmServiceConfig::default(),
            vector_store: ServiceEndpoint::default(),
            cache: ServiceEndpoint::cache(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmServiceConfig {
    pub enabled: bool,
    pub url: String,
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub models: ModelsConfig,
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:11434".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            timeout: 30_000,
            retries: 3,
            api_key: None,
            models: ModelsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsConfig {
    pub available: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            available: vec!["llama3".to_string(), "mistral".to_string()],
            selected: Some("llama3".to_string()),
        }
    }
}

/// A generic network service dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceEndpoint {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub timeout: u64,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 6333,
            protocol: "http".to_string(),
            timeout: 10_000,
            retries: 3,
            api_key: None,
        }
    }
}

impl ServiceEndpoint {
    pub fn cache() -> Self {
        Self {
            port: 6379,
            protocol: "tcp".to_string(),
            timeout: 2_000,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub pool_size: u32,
    pub timeout: u64,
    pub retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            name: "sysconf".to_string(),
            username: "sysconf".to_string(),
            password: None,
            pool_size: 10,
            timeout: 5_000,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeaturesConfig {
    pub caching: FeatureToggle,
    pub rag: RagConfig,
    pub streaming: FeatureToggle,
    pub analytics: FeatureToggle,
    pub debug_mode: bool,
    pub anonymous_access: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            caching: FeatureToggle { enabled: true },
            rag: RagConfig::default(),
            streaming: FeatureToggle { enabled: true },
            analytics: FeatureToggle { enabled: false },
            debug_mode: false,
            anonymous_access: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagConfig {
    pub enabled: bool,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub top_k: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub https: HttpsConfig,
    pub authentication: AuthenticationConfig,
    pub encryption: EncryptionSettingsConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpsConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "apiKey")]
    ApiKey,
    #[serde(rename = "jwt")]
    Jwt,
    #[serde(rename = "oauth")]
    OAuth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthenticationConfig {
    pub enabled: bool,
    pub method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Session lifetime in seconds
    pub session_timeout: u64,
    pub max_login_attempts: u32,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: AuthMethod::ApiKey,
            jwt_secret: None,
            session_timeout: 3600,
            max_login_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionSettingsConfig {
    pub enabled: bool,
    pub algorithm: String,
    pub key_rotation_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
}

impl Default for EncryptionSettingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: "aes-256-gcm".to_string(),
            key_rotation_days: 90,
            master_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: LogLevel,
    pub metrics: MetricsConfig,
    pub health_check: HealthCheckConfig,
    pub alerting: AlertingConfig,
    pub tracing: TracingConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: LogLevel::Info,
            metrics: MetricsConfig::default(),
            health_check: HealthCheckConfig::default(),
            alerting: AlertingConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    /// Scrape interval in seconds
    pub interval: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            interval: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval: u64,
    pub timeout: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 30,
            timeout: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertingConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub sample_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConfig {
    pub max_concurrent_requests: u32,
    pub worker_threads: u32,
    pub connection_pool: ConnectionPoolConfig,
    pub caching: CachingConfig,
    pub compression: CompressionConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            worker_threads: 4,
            connection_pool: ConnectionPoolConfig::default(),
            caching: CachingConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub min: u32,
    pub max: u32,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self { min: 2, max: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachingConfig {
    pub enabled: bool,
    /// Maximum cached entries
    pub max_size: u64,
    /// Entry lifetime in seconds
    pub ttl: u64,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::ApiKey
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document_shape() {
        let doc = default_document();
        for section in SECTIONS {
            assert!(doc.child(section).is_some(), "missing section {}", section);
        }
        assert_eq!(doc.get("version").and_then(|v| v.as_str()), Some("1.0.0"));
        assert_eq!(doc.get("api.basePath").and_then(|v| v.as_str()), Some("/api/v1"));
        assert_eq!(
            doc.get("security.authentication.method").and_then(|v| v.as_str()),
            Some("apiKey")
        );
        // absent optionals are omitted, not null
        assert!(doc.get("security.https.certificatePath").is_none());
    }

    #[test]
    fn test_typed_round_trip() {
        let config = SystemConfiguration::default();
        let doc = config.to_document();
        let back = SystemConfiguration::from_document(&doc).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let doc = ConfigValue::from(serde_json::json!({"api": {"port": 9000}}));
        let config = SystemConfiguration::from_document(&doc).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.performance.connection_pool.max, 10);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Testing".parse::<Environment>().unwrap(), Environment::Testing);
        assert!("moon".parse::<Environment>().is_err());
    }
}
