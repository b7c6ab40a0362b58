//! Retention-bounded audit logger

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::event::{AuditEvent, AuditEventType, AuditSeverity};

/// Fixed CSV column order for exports
pub const CSV_COLUMNS: [&str; 7] = [
    "timestamp",
    "type",
    "severity",
    "username",
    "action",
    "resource",
    "details",
];

/// Retention settings for the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries older than this many days are purged on every write
    pub retention_days: i64,
    /// Hard cap on retained entries; the oldest are evicted first
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            max_entries: 10_000,
        }
    }
}

/// Filter used by [`AuditLogger::query`] and the export functions
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub username: Option<String>,
    /// Minimum severity (inclusive)
    pub min_severity: Option<AuditSeverity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_min_severity(mut self, severity: AuditSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(t) = self.event_type {
            if event.event_type != t {
                return false;
            }
        }
        if let Some(ref user) = self.username {
            if &event.username != user {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Append-only audit log held in memory
#[derive(Debug, Default)]
pub struct AuditLogger {
    config: AuditConfig,
    entries: VecDeque<AuditEvent>,
}

impl AuditLogger {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            entries: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Append an event, then apply retention
    pub fn log(&mut self, event: AuditEvent) -> Uuid {
        let id = event.id;
        debug!(
            event_type = %event.event_type,
            severity = %event.severity,
            username = %event.username,
            action = %event.action,
            resource = %event.resource,
            "Audit event recorded"
        );
        self.entries.push_back(event);
        self.apply_retention(Utc::now());
        id
    }

    /// Purge entries outside the retention window and over the size cap
    fn apply_retention(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.retention_days);
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp >= cutoff);
        while self.entries.len() > self.config.max_entries {
            self.entries.pop_front();
        }
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!(purged, "Audit retention purged entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter()
    }

    /// Matching entries in insertion order, limited to the most recent `limit`
    pub fn query(&self, filter: &AuditFilter) -> Vec<&AuditEvent> {
        let matched: Vec<&AuditEvent> = self.entries.iter().filter(|e| filter.matches(e)).collect();
        match filter.limit {
            Some(limit) if matched.len() > limit => matched[matched.len() - limit..].to_vec(),
            _ => matched,
        }
    }

    /// Export matching entries as a pretty JSON array
    pub fn export_json(&self, filter: &AuditFilter) -> Result<String> {
        let entries = self.query(filter);
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    /// Export matching entries as CSV with [`CSV_COLUMNS`]
    pub fn export_csv(&self, filter: &AuditFilter) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_COLUMNS)?;

        for event in self.query(filter) {
            let details = if event.details.is_null() {
                String::new()
            } else {
                serde_json::to_string(&event.details)?
            };
            writer.write_record([
                event.timestamp.to_rfc3339(),
                event.event_type.to_string(),
                event.severity.to_string(),
                event.username.clone(),
                event.action.clone(),
                event.resource.clone(),
                details,
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AuditError::CsvError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| AuditError::CsvError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(user: &str, resource: &str) -> AuditEvent {
        AuditEvent::new(AuditEventType::ConfigurationChange, user, "update", resource)
    }

    #[test]
    fn test_log_and_query() {
        let mut logger = AuditLogger::new(AuditConfig::default());

        logger.log(change("alice", "api.port"));
        logger.log(AuditEvent::security("bob", "login_failed", "session"));
        logger.log(change("alice", "security.https.enabled"));

        assert_eq!(logger.len(), 3);
        let alice = logger.query(&AuditFilter::new().with_username("alice"));
        assert_eq!(alice.len(), 2);

        let warnings = logger.query(&AuditFilter::new().with_min_severity(AuditSeverity::Warning));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].username, "bob");

        let last = logger.query(&AuditFilter::new().with_limit(1));
        assert_eq!(last[0].resource, "security.https.enabled");
    }

    #[test]
    fn test_retention_window_purges_on_write() {
        let mut logger = AuditLogger::new(AuditConfig {
            retention_days: 30,
            max_entries: 100,
        });

        logger.log(change("alice", "old").with_timestamp(Utc::now() - Duration::days(45)));
        logger.log(change("alice", "recent"));

        let resources: Vec<&str> = logger.entries().map(|e| e.resource.as_str()).collect();
        assert_eq!(resources, vec!["recent"]);
    }

    #[test]
    fn test_size_cap_evicts_oldest() {
        let mut logger = AuditLogger::new(AuditConfig {
            retention_days: 30,
            max_entries: 3,
        });
        for i in 0..5 {
            logger.log(change("alice", &format!("field{}", i)));
        }
        let resources: Vec<&str> = logger.entries().map(|e| e.resource.as_str()).collect();
        assert_eq!(resources, vec!["field2", "field3", "field4"]);
    }

    #[test]
    fn test_csv_export_column_order() {
        let mut logger = AuditLogger::default();
        logger.log(
            change("alice", "api.port").with_details(serde_json::json!({"old": 8080, "new": 9090})),
        );

        let csv = logger.export_csv(&AuditFilter::new()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,type,severity,username,action,resource,details"
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",configuration_change,info,alice,update,api.port,"));
        // JSON details contain quotes and commas, so the field is quoted
        assert!(row.contains("\"\"old\"\":8080"));
        assert!(row.contains("\"\"new\"\":9090"));
    }

    #[test]
    fn test_json_export() {
        let mut logger = AuditLogger::default();
        logger.log(change("alice", "api.port"));
        let json = logger.export_json(&AuditFilter::new()).unwrap();
        let parsed: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].username, "alice");
    }
}
