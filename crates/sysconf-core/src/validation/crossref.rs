//! Whole-document invariants spanning several sections

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use super::{ValidationEntry, ValidationResult};
use crate::value::{ConfigValue, FieldPath, PathPattern};

pub const PORT_COLLISION: &str = "CROSSREF_PORT_COLLISION";
pub const UNKNOWN_MODEL: &str = "CROSSREF_UNKNOWN_MODEL";
pub const POOL_BOUNDS: &str = "CROSSREF_POOL_BOUNDS";
pub const TIMEOUT_ORDERING: &str = "CROSSREF_TIMEOUT_ORDERING";

/// Named cross-reference checks, run in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossCheck {
    /// No two addressed endpoints share a host:port pair
    PortCollision,
    /// Selected models appear in the available list
    ModelReference,
    /// Pool minimum does not exceed maximum
    PoolBounds,
    /// Service timeouts do not exceed the API request timeout
    TimeoutOrdering,
}

impl CrossCheck {
    pub const ALL: [CrossCheck; 4] = [
        CrossCheck::PortCollision,
        CrossCheck::ModelReference,
        CrossCheck::PoolBounds,
        CrossCheck::TimeoutOrdering,
    ];
}

impl fmt::Display for CrossCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossCheck::PortCollision => write!(f, "port_collision"),
            CrossCheck::ModelReference => write!(f, "model_reference"),
            CrossCheck::PoolBounds => write!(f, "pool_bounds"),
            CrossCheck::TimeoutOrdering => write!(f, "timeout_ordering"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrossReferenceChecker {
    checks: Vec<CrossCheck>,
}

impl Default for CrossReferenceChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossReferenceChecker {
    pub fn new() -> Self {
        Self {
            checks: CrossCheck::ALL.to_vec(),
        }
    }

    pub fn with_checks(checks: Vec<CrossCheck>) -> Self {
        Self { checks }
    }

    pub fn check(&self, doc: &ConfigValue, result: &mut ValidationResult) {
        for check in &self.checks {
            let before = result.total();
            match check {
                CrossCheck::PortCollision => port_collision(doc, result),
                CrossCheck::ModelReference => model_reference(doc, result),
                CrossCheck::PoolBounds => pool_bounds(doc, result),
                CrossCheck::TimeoutOrdering => timeout_ordering(doc, result),
            }
            debug!(check = %check, findings = result.total() - before, "Cross-reference check run");
        }
    }
}

/// Loopback and unspecified addresses all land on the local machine
fn normalize_host(host: &str) -> String {
    match host.to_ascii_lowercase().as_str() {
        "localhost" | "127.0.0.1" | "0.0.0.0" | "::1" | "::" => "localhost".to_string(),
        other => other.to_string(),
    }
}

struct Endpoint {
    name: String,
    port_path: String,
    host: String,
    port: i64,
}

fn enabled_services(doc: &ConfigValue) -> Vec<(&String, &ConfigValue)> {
    doc.get("services")
        .and_then(ConfigValue::as_object)
        .map(|services| {
            services
                .iter()
                .filter(|(_, svc)| svc.child("enabled").map(ConfigValue::is_truthy).unwrap_or(false))
                .collect()
        })
        .unwrap_or_default()
}

fn endpoints(doc: &ConfigValue) -> Vec<Endpoint> {
    let mut out = Vec::new();
    let api_host = doc.get("api.host").and_then(ConfigValue::as_str);

    if let (Some(host), Some(port)) = (api_host, doc.get("api.port").and_then(ConfigValue::as_i64)) {
        out.push(Endpoint {
            name: "api".to_string(),
            port_path: "api.port".to_string(),
            host: normalize_host(host),
            port,
        });
    }

    for (name, svc) in enabled_services(doc) {
        let host = svc.child("host").and_then(ConfigValue::as_str);
        let port = svc.child("port").and_then(ConfigValue::as_i64);
        if let (Some(host), Some(port)) = (host, port) {
            out.push(Endpoint {
                name: format!("services.{}", name),
                port_path: format!("services.{}.port", name),
                host: normalize_host(host),
                port,
            });
        }
    }

    let metrics_enabled = doc
        .get("monitoring.metrics.enabled")
        .map(ConfigValue::is_truthy)
        .unwrap_or(false);
    if metrics_enabled {
        if let Some(port) = doc.get("monitoring.metrics.port").and_then(ConfigValue::as_i64) {
            // exporter binds on the API host
            out.push(Endpoint {
                name: "monitoring.metrics".to_string(),
                port_path: "monitoring.metrics.port".to_string(),
                host: normalize_host(api_host.unwrap_or("0.0.0.0")),
                port,
            });
        }
    }
    out
}

fn port_collision(doc: &ConfigValue, result: &mut ValidationResult) {
    let mut seen: BTreeMap<(String, i64), String> = BTreeMap::new();
    for endpoint in endpoints(doc) {
        let key = (endpoint.host.clone(), endpoint.port);
        if let Some(owner) = seen.get(&key) {
            result.push(
                ValidationEntry::error(
                    PORT_COLLISION,
                    &endpoint.port_path,
                    format!(
                        "{} uses {}:{} which is already taken by {}",
                        endpoint.name, endpoint.host, endpoint.port, owner
                    ),
                )
                .with_value(ConfigValue::Integer(endpoint.port))
                .with_suggestion(format!("Assign a different port to {}", endpoint.name)),
            );
        } else {
            seen.insert(key, endpoint.name);
        }
    }
}

fn model_reference(doc: &ConfigValue, result: &mut ValidationResult) {
    for selected_path in PathPattern::parse("services.*.models.selected").expand(doc) {
        let Some(selected) = doc.get_path(&selected_path).and_then(ConfigValue::as_str) else {
            continue;
        };
        let available_path = selected_path
            .parent()
            .map(|p| p.child("available"))
            .unwrap_or_else(|| FieldPath::parse("available"));
        let Some(available) = doc.get_path(&available_path).and_then(ConfigValue::as_array) else {
            continue;
        };
        if !available.iter().any(|m| m.as_str() == Some(selected)) {
            result.push(
                ValidationEntry::warning(
                    UNKNOWN_MODEL,
                    selected_path.to_string(),
                    format!("Selected model '{}' is not in {}", selected, available_path),
                )
                .with_value(ConfigValue::from(selected))
                .with_suggestion(format!("Add '{}' to {}", selected, available_path)),
            );
        }
    }
}

fn pool_bounds(doc: &ConfigValue, result: &mut ValidationResult) {
    let min = doc.get("performance.connectionPool.min").and_then(ConfigValue::as_i64);
    let max = doc.get("performance.connectionPool.max").and_then(ConfigValue::as_i64);
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            result.push(
                ValidationEntry::error(
                    POOL_BOUNDS,
                    "performance.connectionPool.min",
                    format!("Connection pool min ({}) exceeds max ({})", min, max),
                )
                .with_value(ConfigValue::Integer(min)),
            );
        }
    }
}

fn timeout_ordering(doc: &ConfigValue, result: &mut ValidationResult) {
    let Some(api_timeout) = doc.get("api.timeout").and_then(ConfigValue::as_i64) else {
        return;
    };
    for (name, svc) in enabled_services(doc) {
        let Some(timeout) = svc.child("timeout").and_then(ConfigValue::as_i64) else {
            continue;
        };
        if timeout > api_timeout {
            result.push(
                ValidationEntry::warning(
                    TIMEOUT_ORDERING,
                    format!("services.{}.timeout", name),
                    format!(
                        "Service timeout {}ms exceeds the API request timeout {}ms",
                        timeout, api_timeout
                    ),
                )
                .with_value(ConfigValue::Integer(timeout)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_document;

    fn run(doc: &ConfigValue) -> ValidationResult {
        let mut result = ValidationResult::new();
        CrossReferenceChecker::new().check(doc, &mut result);
        result
    }

    #[test]
    fn test_default_document_passes() {
        assert_eq!(run(&default_document()).total(), 0);
    }

    #[test]
    fn test_port_collision_between_api_and_service() {
        let mut doc = default_document();
        doc.set("services.cache.port", 8080).unwrap();
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, PORT_COLLISION);
        assert_eq!(result.errors[0].path, "services.cache.port");
    }

    #[test]
    fn test_disabled_service_does_not_collide() {
        let mut doc = default_document();
        doc.set("services.database.port", 8080).unwrap();
        assert!(run(&doc).is_valid);
    }

    #[test]
    fn test_different_hosts_do_not_collide() {
        let mut doc = default_document();
        doc.set("services.cache.host", "cache.internal").unwrap();
        doc.set("services.cache.port", 8080).unwrap();
        assert!(run(&doc).is_valid);
    }

    #[test]
    fn test_metrics_port_collision() {
        let mut doc = default_document();
        doc.set("monitoring.metrics.port", 8080).unwrap();
        let result = run(&doc);
        assert_eq!(result.errors[0].path, "monitoring.metrics.port");
    }

    #[test]
    fn test_unknown_model_is_warning() {
        let mut doc = default_document();
        doc.set("services.llm.models.selected", "gpt-x").unwrap();
        let result = run(&doc);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, UNKNOWN_MODEL);
    }

    #[test]
    fn test_pool_bounds_and_timeouts() {
        let mut doc = default_document();
        doc.set("performance.connectionPool.min", 50).unwrap();
        doc.set("services.llm.timeout", 120_000).unwrap();
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, POOL_BOUNDS);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "services.llm.timeout");
    }
}
