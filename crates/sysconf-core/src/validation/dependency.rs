//! Declarative cross-field dependency rules
//!
//! Rules are data: a source path, a target path, a [`DependencyKind`], and a
//! [`Condition`] from a small comparison language. Every rule is evaluated
//! in table order and independently of the others. A rule that cannot be
//! evaluated (source missing, condition applied to the wrong type) yields a
//! `DEPENDENCY_UNEVALUABLE` warning instead of an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{codes, Severity, ValidationEntry, ValidationResult};
use crate::value::{ConfigValue, FieldPath};

/// Relationship a rule enforces between source and target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// If the condition holds on the source, the target must be present
    Requires,
    /// Source and target must not both be truthy while the condition holds
    /// on the target
    Conflicts,
    /// If the condition holds on the source, the target must be truthy
    Implies,
    /// If the condition holds on the source, the target must not be truthy
    Excludes,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Requires => write!(f, "requires"),
            DependencyKind::Conflicts => write!(f, "conflicts"),
            DependencyKind::Implies => write!(f, "implies"),
            DependencyKind::Excludes => write!(f, "excludes"),
        }
    }
}

/// Predicate over a single value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Condition {
    Truthy,
    Equals(ConfigValue),
    NotEquals(ConfigValue),
    OneOf(Vec<ConfigValue>),
    /// Array element membership or substring
    Contains(ConfigValue),
    GreaterThan(f64),
    LessThan(f64),
}

impl Condition {
    /// Evaluate against `value`; `Err` describes a type mismatch
    pub fn evaluate(&self, value: &ConfigValue) -> Result<bool, String> {
        match self {
            Condition::Truthy => Ok(value.is_truthy()),
            Condition::Equals(expected) => values_equal(value, expected),
            Condition::NotEquals(expected) => values_equal(value, expected).map(|eq| !eq),
            Condition::OneOf(candidates) => {
                let mut mismatches = 0;
                for candidate in candidates {
                    match values_equal(value, candidate) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(_) => mismatches += 1,
                    }
                }
                if !candidates.is_empty() && mismatches == candidates.len() {
                    Err(format!("no candidate has the type of {}", value.type_name()))
                } else {
                    Ok(false)
                }
            }
            Condition::Contains(needle) => match (value, needle) {
                (ConfigValue::Array(items), _) => Ok(items.contains(needle)),
                (ConfigValue::String(haystack), ConfigValue::String(n)) => Ok(haystack.contains(n.as_str())),
                _ => Err(format!(
                    "cannot test {} for containment of {}",
                    value.type_name(),
                    needle.type_name()
                )),
            },
            Condition::GreaterThan(limit) => value
                .as_f64()
                .map(|n| n > *limit)
                .ok_or_else(|| format!("expected a number, found {}", value.type_name())),
            Condition::LessThan(limit) => value
                .as_f64()
                .map(|n| n < *limit)
                .ok_or_else(|| format!("expected a number, found {}", value.type_name())),
        }
    }
}

fn values_equal(a: &ConfigValue, b: &ConfigValue) -> Result<bool, String> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(x == y),
        _ if std::mem::discriminant(a) == std::mem::discriminant(b) => Ok(a == b),
        _ => Err(format!("cannot compare {} with {}", a.type_name(), b.type_name())),
    }
}

/// One row of the dependency table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: DependencyKind,
    pub condition: Condition,
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl DependencyRule {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        kind: DependencyKind,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind,
            condition: Condition::Truthy,
            severity: Severity::Error,
            code: String::new(),
            message: String::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Built-in rules for the system configuration document
pub fn builtin_rules() -> Vec<DependencyRule> {
    use DependencyKind::*;

    vec![
        DependencyRule::new(
            "https_requires_certificate",
            "security.https.enabled",
            Requires,
            "security.https.certificatePath",
        )
        .code("DEP_HTTPS_REQUIRES_CERTIFICATE")
        .message("HTTPS is enabled but no certificate path is configured"),
        DependencyRule::new(
            "jwt_requires_secret",
            "security.authentication.method",
            Requires,
            "security.authentication.jwtSecret",
        )
        .when(Condition::Equals(ConfigValue::from("jwt")))
        .code("DEP_JWT_REQUIRES_SECRET")
        .message("JWT authentication requires a signing secret"),
        DependencyRule::new(
            "alerting_requires_webhook",
            "monitoring.alerting.enabled",
            Requires,
            "monitoring.alerting.webhookUrl",
        )
        .code("DEP_ALERTING_REQUIRES_WEBHOOK")
        .message("Alerting is enabled but no webhook URL is configured"),
        DependencyRule::new(
            "database_requires_password",
            "services.database.enabled",
            Requires,
            "services.database.password",
        )
        .code("DEP_DATABASE_REQUIRES_PASSWORD")
        .message("The database service is enabled without a password"),
        DependencyRule::new(
            "encryption_requires_master_key",
            "security.encryption.enabled",
            Requires,
            "security.encryption.masterKey",
        )
        .code("DEP_ENCRYPTION_REQUIRES_MASTER_KEY")
        .message("Encryption at rest is enabled without a master key"),
        DependencyRule::new(
            "rag_implies_vector_store",
            "features.rag.enabled",
            Implies,
            "services.vectorStore.enabled",
        )
        .code("DEP_RAG_REQUIRES_VECTOR_STORE")
        .message("RAG is enabled but the vector store service is disabled"),
        DependencyRule::new(
            "caching_implies_cache_service",
            "features.caching.enabled",
            Implies,
            "services.cache.enabled",
        )
        .severity(Severity::Warning)
        .code("DEP_CACHING_REQUIRES_CACHE_SERVICE")
        .message("Caching is enabled but the cache service is disabled"),
        DependencyRule::new(
            "cors_credentials_wildcard",
            "api.cors.credentials",
            Conflicts,
            "api.cors.origins",
        )
        .when(Condition::Contains(ConfigValue::from("*")))
        .code("DEP_CORS_CREDENTIALS_WILDCARD")
        .message("CORS credentials cannot be combined with a wildcard origin"),
        DependencyRule::new(
            "anonymous_excludes_authentication",
            "features.anonymousAccess",
            Excludes,
            "security.authentication.enabled",
        )
        .severity(Severity::Warning)
        .code("DEP_ANONYMOUS_WITH_AUTHENTICATION")
        .message("Anonymous access is enabled while authentication is required"),
    ]
}

enum Outcome {
    Satisfied,
    Violated,
    Unevaluable(String),
}

/// Evaluates a dependency table against documents
#[derive(Debug, Clone)]
pub struct DependencyEvaluator {
    rules: Vec<DependencyRule>,
}

impl Default for DependencyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyEvaluator {
    pub fn new() -> Self {
        Self::with_rules(builtin_rules())
    }

    pub fn with_rules(rules: Vec<DependencyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DependencyRule] {
        &self.rules
    }

    /// Append one entry per violated or unevaluable rule
    pub fn evaluate(&self, doc: &ConfigValue, result: &mut ValidationResult) {
        for rule in &self.rules {
            let source = doc.get_path(&FieldPath::parse(&rule.source));
            let target = doc.get_path(&FieldPath::parse(&rule.target));

            match evaluate_rule(rule, source, target) {
                Outcome::Satisfied => {}
                Outcome::Violated => {
                    debug!(rule = %rule.id, kind = %rule.kind, "Dependency violated");
                    let mut entry = ValidationEntry::new(
                        rule.severity,
                        &rule.code,
                        &rule.source,
                        &rule.message,
                    )
                    .with_suggestion(fix_hint(rule));
                    if let Some(value) = source {
                        entry = entry.with_value(value.clone());
                    }
                    result.push(entry);
                }
                Outcome::Unevaluable(reason) => {
                    debug!(rule = %rule.id, reason = %reason, "Dependency unevaluable");
                    result.push(ValidationEntry::warning(
                        codes::DEPENDENCY_UNEVALUABLE,
                        &rule.source,
                        format!("Rule '{}' could not be evaluated: {}", rule.id, reason),
                    ));
                }
            }
        }
    }
}

fn evaluate_rule(
    rule: &DependencyRule,
    source: Option<&ConfigValue>,
    target: Option<&ConfigValue>,
) -> Outcome {
    let Some(source) = source else {
        return Outcome::Unevaluable(format!("source '{}' is missing", rule.source));
    };
    let target_truthy = target.map(ConfigValue::is_truthy).unwrap_or(false);

    let violated = match rule.kind {
        DependencyKind::Conflicts => {
            if !source.is_truthy() || !target_truthy {
                false
            } else {
                match target.map(|t| rule.condition.evaluate(t)) {
                    Some(Ok(holds)) => holds,
                    Some(Err(reason)) => return Outcome::Unevaluable(reason),
                    None => false,
                }
            }
        }
        kind => {
            let holds = match rule.condition.evaluate(source) {
                Ok(holds) => holds,
                Err(reason) => return Outcome::Unevaluable(reason),
            };
            holds
                && match kind {
                    DependencyKind::Requires => !target.map(ConfigValue::is_present).unwrap_or(false),
                    DependencyKind::Implies => !target_truthy,
                    _ => target_truthy,
                }
        }
    };

    if violated {
        Outcome::Violated
    } else {
        Outcome::Satisfied
    }
}

fn fix_hint(rule: &DependencyRule) -> String {
    match rule.kind {
        DependencyKind::Requires => format!("Set {}", rule.target),
        DependencyKind::Implies => format!("Enable {} or disable {}", rule.target, rule.source),
        DependencyKind::Excludes => format!("Disable {} or {}", rule.target, rule.source),
        DependencyKind::Conflicts => format!("Change {} or {}", rule.target, rule.source),
    }
}
