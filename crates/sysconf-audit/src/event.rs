//! Audit event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What kind of activity an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ConfigurationChange,
    Export,
    Import,
    Backup,
    Restore,
    VersionActivation,
    Security,
    Access,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditEventType::ConfigurationChange => "configuration_change",
            AuditEventType::Export => "export",
            AuditEventType::Import => "import",
            AuditEventType::Backup => "backup",
            AuditEventType::Restore => "restore",
            AuditEventType::VersionActivation => "version_activation",
            AuditEventType::Security => "security",
            AuditEventType::Access => "access",
        };
        f.write_str(s)
    }
}

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "info"),
            AuditSeverity::Warning => write!(f, "warning"),
            AuditSeverity::Error => write!(f, "error"),
            AuditSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// Actor that performed the action
    pub username: String,
    /// Verb describing the action (e.g. "update", "export", "login_failed")
    pub action: String,
    /// What was acted upon (a configuration path, backup id, format, ...)
    pub resource: String,
    /// Free-form structured context
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Create an informational event stamped with the current time
    pub fn new(
        event_type: AuditEventType,
        username: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            severity: AuditSeverity::Info,
            username: username.into(),
            action: action.into(),
            resource: resource.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Security event; defaults to warning severity
    pub fn security(
        username: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::new(AuditEventType::Security, username, action, resource)
            .with_severity(AuditSeverity::Warning)
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builders() {
        let event = AuditEvent::new(AuditEventType::Export, "alice", "export", "yaml")
            .with_details(serde_json::json!({"fields": 3}));
        assert_eq!(event.severity, AuditSeverity::Info);
        assert_eq!(event.details["fields"], 3);

        let security = AuditEvent::security("bob", "login_failed", "session");
        assert_eq!(security.event_type, AuditEventType::Security);
        assert_eq!(security.severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(AuditEventType::ConfigurationChange.to_string(), "configuration_change");
        assert_eq!(AuditSeverity::Critical.to_string(), "critical");
        assert!(AuditSeverity::Info < AuditSeverity::Critical);
    }
}
