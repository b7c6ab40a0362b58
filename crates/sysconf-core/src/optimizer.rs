//! Rule-based optimization analysis
//!
//! [`analyze`] runs a fixed table of checks against a document. Each hit
//! produces a dimension finding (bottleneck, vulnerability, issue, or
//! opportunity) that costs its dimension some score, and a recommendation.
//! Dimension scores start at 100 and bottom out at 0; the overall score is
//! their mean.

use std::cmp::Reverse;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Environment;
use crate::value::{ConfigValue, PathPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn hours(self) -> u32 {
        match self {
            Effort::Low => 2,
            Effort::Medium => 4,
            Effort::High => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Performance,
    Security,
    Maintenance,
    Cost,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Performance => write!(f, "performance"),
            Dimension::Security => write!(f, "security"),
            Dimension::Maintenance => write!(f, "maintenance"),
            Dimension::Cost => write!(f, "cost"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Bottleneck,
    Vulnerability,
    Issue,
    Opportunity,
}

impl From<Dimension> for FindingKind {
    fn from(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Performance => FindingKind::Bottleneck,
            Dimension::Security => FindingKind::Vulnerability,
            Dimension::Maintenance => FindingKind::Issue,
            Dimension::Cost => FindingKind::Opportunity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub check: String,
    pub kind: FindingKind,
    pub path: String,
    pub description: String,
    pub penalty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionAnalysis {
    pub dimension: Dimension,
    pub score: u32,
    pub findings: Vec<Finding>,
}

impl DimensionAnalysis {
    fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            score: 100,
            findings: Vec::new(),
        }
    }

    fn record(&mut self, finding: Finding) {
        self.score = self.score.saturating_sub(finding.penalty);
        self.findings.push(finding);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub dimension: Dimension,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<ConfigValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<ConfigValue>,
    pub effort: Effort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSummary {
    pub overall_score: f64,
    pub performance_score: u32,
    pub security_score: u32,
    pub maintenance_score: u32,
    pub cost_score: u32,
    pub total_recommendations: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub estimated_effort_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub environment: Environment,
    pub analyzed_at: DateTime<Utc>,
    /// Highest priority first; ties keep check order
    pub recommendations: Vec<Recommendation>,
    pub performance: DimensionAnalysis,
    pub security: DimensionAnalysis,
    pub maintenance: DimensionAnalysis,
    pub cost: DimensionAnalysis,
    pub summary: OptimizationSummary,
}

struct Detection {
    path: String,
    current: Option<ConfigValue>,
    suggested: Option<ConfigValue>,
    detail: String,
    priority: Option<Priority>,
}

impl Detection {
    fn at(doc: &ConfigValue, path: impl Into<String>, detail: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            current: doc.get(&path).cloned(),
            path,
            suggested: None,
            detail: detail.into(),
            priority: None,
        }
    }

    fn suggest(mut self, value: impl Into<ConfigValue>) -> Self {
        self.suggested = Some(value.into());
        self
    }

    fn escalate(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

struct Check {
    id: &'static str,
    dimension: Dimension,
    priority: Priority,
    effort: Effort,
    penalty: u32,
    title: &'static str,
    detect: fn(&ConfigValue, Environment) -> Vec<Detection>,
}

const SERVICE_TIMEOUT_FLOOR_MS: i64 = 1_000;
const WEAK_SECRETS: [&str; 7] = ["password", "admin", "changeme", "secret", "default", "123456", "test"];

fn flag(doc: &ConfigValue, path: &str) -> Option<bool> {
    doc.get(path).and_then(ConfigValue::as_bool)
}

fn int(doc: &ConfigValue, path: &str) -> Option<i64> {
    doc.get(path).and_then(ConfigValue::as_i64)
}

fn is_deployed(env: Environment) -> bool {
    matches!(env, Environment::Production | Environment::Staging)
}

fn enabled_services(doc: &ConfigValue) -> Vec<String> {
    doc.get("services")
        .and_then(ConfigValue::as_object)
        .map(|services| {
            services
                .iter()
                .filter(|(_, svc)| svc.child("enabled").map_or(false, ConfigValue::is_truthy))
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn service_timeout_floor(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    enabled_services(doc)
        .into_iter()
        .filter_map(|name| {
            let path = format!("services.{}.timeout", name);
            let timeout = int(doc, &path)?;
            (timeout < SERVICE_TIMEOUT_FLOOR_MS).then(|| {
                Detection::at(
                    doc,
                    &path,
                    format!("{} times out after {}ms and will fail under load", name, timeout),
                )
                .suggest(SERVICE_TIMEOUT_FLOOR_MS * 5)
            })
        })
        .collect()
}

fn caching_disabled(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    ["features.caching.enabled", "performance.caching.enabled"]
        .iter()
        .filter(|path| flag(doc, path) == Some(false))
        .map(|path| Detection::at(doc, *path, "Response caching is disabled").suggest(true))
        .take(1)
        .collect()
}

fn compression_disabled(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    if flag(doc, "performance.compression.enabled") == Some(false) {
        vec![Detection::at(doc, "performance.compression.enabled", "Response compression is disabled").suggest(true)]
    } else {
        Vec::new()
    }
}

fn worker_threads_low(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    match int(doc, "performance.workerThreads") {
        Some(n) if is_deployed(env) && n < 2 => vec![Detection::at(
            doc,
            "performance.workerThreads",
            format!("{} worker thread(s) serialize request handling", n),
        )
        .suggest(4)],
        _ => Vec::new(),
    }
}

fn default_credentials(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    let mut paths = Vec::new();
    for pattern in ["services.*.apiKey", "services.*.password", "security.authentication.jwtSecret"] {
        paths.extend(PathPattern::parse(pattern).expand(doc));
    }
    paths
        .into_iter()
        .filter_map(|path| {
            let value = doc.get_path(&path)?.as_str()?;
            WEAK_SECRETS
                .iter()
                .any(|weak| value.eq_ignore_ascii_case(weak))
                .then(|| Detection {
                    path: path.to_string(),
                    // never echo the secret
                    current: None,
                    suggested: None,
                    detail: format!("{} holds a well-known default credential", path),
                    priority: None,
                })
        })
        .collect()
}

fn cors_wildcard(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    let wildcard = doc
        .get("api.cors.origins")
        .and_then(ConfigValue::as_array)
        .map_or(false, |origins| origins.iter().any(|o| o.as_str() == Some("*")));
    if wildcard && flag(doc, "api.cors.enabled") != Some(false) {
        vec![Detection::at(doc, "api.cors.origins", "CORS accepts requests from any origin")]
    } else {
        Vec::new()
    }
}

fn https_disabled(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    if env == Environment::Production && flag(doc, "security.https.enabled") != Some(true) {
        vec![Detection::at(doc, "security.https.enabled", "Production traffic is served without TLS").suggest(true)]
    } else {
        Vec::new()
    }
}

fn authentication_disabled(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    if flag(doc, "security.authentication.enabled") == Some(false) {
        let detection =
            Detection::at(doc, "security.authentication.enabled", "API requests are not authenticated")
                .suggest(true);
        if is_deployed(env) {
            vec![detection.escalate(Priority::Critical)]
        } else {
            vec![detection]
        }
    } else {
        Vec::new()
    }
}

fn rate_limit_disabled(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    if flag(doc, "api.rateLimit.enabled") == Some(false) {
        vec![Detection::at(doc, "api.rateLimit.enabled", "No request rate limit is enforced").suggest(true)]
    } else {
        Vec::new()
    }
}

fn debug_mode_deployed(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    if is_deployed(env) && flag(doc, "features.debugMode") == Some(true) {
        vec![Detection::at(doc, "features.debugMode", "Debug mode exposes internals").suggest(false)]
    } else {
        Vec::new()
    }
}

fn verbose_logging(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    let level = doc.get("monitoring.logLevel").and_then(ConfigValue::as_str);
    match level {
        Some(level @ ("debug" | "trace")) if env == Environment::Production => vec![Detection::at(
            doc,
            "monitoring.logLevel",
            format!("'{}' logging in production floods log storage", level),
        )
        .suggest("info")],
        _ => Vec::new(),
    }
}

fn monitoring_disabled(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    if flag(doc, "monitoring.enabled") == Some(false) {
        vec![Detection::at(doc, "monitoring.enabled", "Monitoring is switched off").suggest(true)]
    } else {
        Vec::new()
    }
}

fn health_checks_disabled(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    if flag(doc, "monitoring.healthCheck.enabled") == Some(false) {
        vec![Detection::at(doc, "monitoring.healthCheck.enabled", "Health checks are disabled").suggest(true)]
    } else {
        Vec::new()
    }
}

fn metrics_disabled(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    if is_deployed(env) && flag(doc, "monitoring.metrics.enabled") == Some(false) {
        vec![Detection::at(doc, "monitoring.metrics.enabled", "Metrics export is disabled").suggest(true)]
    } else {
        Vec::new()
    }
}

fn key_rotation_slow(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    match int(doc, "security.encryption.keyRotationDays") {
        Some(days) if flag(doc, "security.encryption.enabled") == Some(true) && days > 365 => {
            vec![Detection::at(
                doc,
                "security.encryption.keyRotationDays",
                format!("Keys rotate only every {} days", days),
            )
            .suggest(90)]
        }
        _ => Vec::new(),
    }
}

fn full_trace_sampling(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    let rate = doc.get("monitoring.tracing.sampleRate").and_then(ConfigValue::as_f64);
    match rate {
        Some(rate)
            if is_deployed(env) && flag(doc, "monitoring.tracing.enabled") == Some(true) && rate >= 1.0 =>
        {
            vec![Detection::at(
                doc,
                "monitoring.tracing.sampleRate",
                "Every request is traced; sampling a fraction gives the same signal",
            )
            .suggest(0.1)]
        }
        _ => Vec::new(),
    }
}

fn oversized_pool(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    let max = int(doc, "performance.connectionPool.max");
    let concurrency = int(doc, "performance.maxConcurrentRequests");
    match (max, concurrency) {
        (Some(max), Some(concurrency)) if max > concurrency.max(100) => vec![Detection::at(
            doc,
            "performance.connectionPool.max",
            format!("{} pooled connections for {} concurrent requests", max, concurrency),
        )
        .suggest(concurrency.clamp(10, 100))],
        _ => Vec::new(),
    }
}

fn excess_workers(doc: &ConfigValue, env: Environment) -> Vec<Detection> {
    match int(doc, "performance.workerThreads") {
        Some(n) if n > 64 || (!is_deployed(env) && n > 16) => vec![Detection::at(
            doc,
            "performance.workerThreads",
            format!("{} worker threads for a {} deployment", n, env),
        )
        .suggest(if is_deployed(env) { 32 } else { 4 })],
        _ => Vec::new(),
    }
}

fn short_cache_ttl(doc: &ConfigValue, _: Environment) -> Vec<Detection> {
    match int(doc, "performance.caching.ttl") {
        Some(ttl) if flag(doc, "performance.caching.enabled") == Some(true) && ttl < 60 => {
            vec![Detection::at(
                doc,
                "performance.caching.ttl",
                format!("A {}s cache TTL sends most requests upstream", ttl),
            )
            .suggest(300)]
        }
        _ => Vec::new(),
    }
}

fn checks() -> Vec<Check> {
    use Dimension::*;
    vec![
        Check {
            id: "service_timeout_floor",
            dimension: Performance,
            priority: Priority::High,
            effort: Effort::Low,
            penalty: 15,
            title: "Raise service timeout",
            detect: service_timeout_floor,
        },
        Check {
            id: "caching_disabled",
            dimension: Performance,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Enable caching",
            detect: caching_disabled,
        },
        Check {
            id: "compression_disabled",
            dimension: Performance,
            priority: Priority::Low,
            effort: Effort::Low,
            penalty: 5,
            title: "Enable compression",
            detect: compression_disabled,
        },
        Check {
            id: "worker_threads_low",
            dimension: Performance,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Add worker threads",
            detect: worker_threads_low,
        },
        Check {
            id: "default_credential",
            dimension: Security,
            priority: Priority::Critical,
            effort: Effort::Low,
            penalty: 30,
            title: "Replace default credential",
            detect: default_credentials,
        },
        Check {
            id: "cors_wildcard",
            dimension: Security,
            priority: Priority::High,
            effort: Effort::Low,
            penalty: 15,
            title: "Restrict CORS origins",
            detect: cors_wildcard,
        },
        Check {
            id: "https_disabled",
            dimension: Security,
            priority: Priority::Critical,
            effort: Effort::Medium,
            penalty: 25,
            title: "Enable HTTPS",
            detect: https_disabled,
        },
        Check {
            id: "authentication_disabled",
            dimension: Security,
            priority: Priority::High,
            effort: Effort::Medium,
            penalty: 25,
            title: "Enable authentication",
            detect: authentication_disabled,
        },
        Check {
            id: "rate_limit_disabled",
            dimension: Security,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Enable rate limiting",
            detect: rate_limit_disabled,
        },
        Check {
            id: "debug_mode_deployed",
            dimension: Security,
            priority: Priority::High,
            effort: Effort::Low,
            penalty: 15,
            title: "Disable debug mode",
            detect: debug_mode_deployed,
        },
        Check {
            id: "verbose_logging",
            dimension: Maintenance,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Lower log verbosity",
            detect: verbose_logging,
        },
        Check {
            id: "monitoring_disabled",
            dimension: Maintenance,
            priority: Priority::High,
            effort: Effort::Medium,
            penalty: 20,
            title: "Enable monitoring",
            detect: monitoring_disabled,
        },
        Check {
            id: "health_checks_disabled",
            dimension: Maintenance,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Enable health checks",
            detect: health_checks_disabled,
        },
        Check {
            id: "metrics_disabled",
            dimension: Maintenance,
            priority: Priority::Low,
            effort: Effort::Low,
            penalty: 5,
            title: "Enable metrics export",
            detect: metrics_disabled,
        },
        Check {
            id: "key_rotation_slow",
            dimension: Maintenance,
            priority: Priority::Low,
            effort: Effort::Medium,
            penalty: 5,
            title: "Rotate encryption keys more often",
            detect: key_rotation_slow,
        },
        Check {
            id: "full_trace_sampling",
            dimension: Cost,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 15,
            title: "Sample traces",
            detect: full_trace_sampling,
        },
        Check {
            id: "oversized_pool",
            dimension: Cost,
            priority: Priority::Medium,
            effort: Effort::Low,
            penalty: 10,
            title: "Shrink connection pool",
            detect: oversized_pool,
        },
        Check {
            id: "excess_workers",
            dimension: Cost,
            priority: Priority::Low,
            effort: Effort::Low,
            penalty: 5,
            title: "Reduce worker threads",
            detect: excess_workers,
        },
        Check {
            id: "short_cache_ttl",
            dimension: Cost,
            priority: Priority::Low,
            effort: Effort::Low,
            penalty: 5,
            title: "Lengthen cache TTL",
            detect: short_cache_ttl,
        },
    ]
}

pub fn analyze(config: &ConfigValue, environment: Environment) -> OptimizationReport {
    let mut performance = DimensionAnalysis::new(Dimension::Performance);
    let mut security = DimensionAnalysis::new(Dimension::Security);
    let mut maintenance = DimensionAnalysis::new(Dimension::Maintenance);
    let mut cost = DimensionAnalysis::new(Dimension::Cost);
    let mut recommendations = Vec::new();

    for check in checks() {
        for detection in (check.detect)(config, environment) {
            let analysis = match check.dimension {
                Dimension::Performance => &mut performance,
                Dimension::Security => &mut security,
                Dimension::Maintenance => &mut maintenance,
                Dimension::Cost => &mut cost,
            };
            analysis.record(Finding {
                check: check.id.to_string(),
                kind: check.dimension.into(),
                path: detection.path.clone(),
                description: detection.detail.clone(),
                penalty: check.penalty,
            });
            recommendations.push(Recommendation {
                id: format!("{}:{}", check.id, detection.path),
                dimension: check.dimension,
                priority: detection.priority.unwrap_or(check.priority),
                title: check.title.to_string(),
                description: detection.detail,
                path: detection.path,
                current_value: detection.current,
                suggested_value: detection.suggested,
                effort: check.effort,
            });
        }
    }

    // stable, so equal priorities keep check order
    recommendations.sort_by_key(|r| Reverse(r.priority));

    let count = |p: Priority| recommendations.iter().filter(|r| r.priority == p).count();
    let summary = OptimizationSummary {
        overall_score: f64::from(performance.score + security.score + maintenance.score + cost.score) / 4.0,
        performance_score: performance.score,
        security_score: security.score,
        maintenance_score: maintenance.score,
        cost_score: cost.score,
        total_recommendations: recommendations.len(),
        critical: count(Priority::Critical),
        high: count(Priority::High),
        medium: count(Priority::Medium),
        low: count(Priority::Low),
        estimated_effort_hours: recommendations.iter().map(|r| r.effort.hours()).sum(),
    };
    debug!(
        environment = %environment,
        recommendations = summary.total_recommendations,
        overall = summary.overall_score,
        "Configuration analyzed"
    );

    OptimizationReport {
        environment,
        analyzed_at: Utc::now(),
        recommendations,
        performance,
        security,
        maintenance,
        cost,
        summary,
    }
}
