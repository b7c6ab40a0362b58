//! Document validation
//!
//! A document passes through three stages, always in this order:
//!
//! 1. [`SchemaValidator`]: structural type, range, enum, and format checks
//! 2. [`DependencyEvaluator`]: declarative cross-field rules
//! 3. [`CrossReferenceChecker`]: whole-document invariants
//!
//! Findings accumulate in a single [`ValidationResult`]. Validation never
//! returns `Err` for bad input; a fault inside the validator itself is
//! reported as a `VALIDATION_EXCEPTION` error entry.

pub mod crossref;
pub mod dependency;
pub mod schema;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::value::ConfigValue;

pub use crossref::{CrossCheck, CrossReferenceChecker};
pub use dependency::{builtin_rules, Condition, DependencyEvaluator, DependencyKind, DependencyRule};
pub use schema::{FieldKind, FieldSpec, SchemaValidator, StringFormat};

/// Machine-readable codes emitted by the schema stage
pub mod codes {
    pub const REQUIRED_FIELD: &str = "REQUIRED_FIELD";
    pub const INVALID_TYPE: &str = "INVALID_TYPE";
    pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";
    pub const INVALID_ENUM: &str = "INVALID_ENUM";
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    pub const MISSING_VERSION: &str = "MISSING_VERSION";
    pub const UNKNOWN_FIELD: &str = "UNKNOWN_FIELD";
    pub const VALIDATION_EXCEPTION: &str = "VALIDATION_EXCEPTION";
    pub const DEPENDENCY_UNEVALUABLE: &str = "DEPENDENCY_UNEVALUABLE";
}

/// How much a finding matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks acceptance of the document
    Error,
    /// Surfaced but non-blocking
    Warning,
    /// Advisory only
    Suggestion,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Suggestion => write!(f, "suggestion"),
        }
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEntry {
    /// Dotted path of the offending field
    pub path: String,
    pub message: String,
    pub severity: Severity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ValidationEntry {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity,
            code: code.into(),
            value: None,
            suggestions: Vec::new(),
        }
    }

    pub fn error(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, path, message)
    }

    pub fn warning(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, path, message)
    }

    pub fn suggestion(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Suggestion, code, path, message)
    }

    pub fn with_value(mut self, value: ConfigValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} at '{}': {}", self.severity, self.code, self.path, self.message)
    }
}

/// Outcome of validating one document
///
/// `is_valid` is kept equal to `errors.is_empty()` by [`push`](Self::push).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationEntry>,
    pub warnings: Vec<ValidationEntry>,
    pub suggestions: Vec<ValidationEntry>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Route an entry into the list for its severity
    pub fn push(&mut self, entry: ValidationEntry) {
        match entry.severity {
            Severity::Error => self.errors.push(entry),
            Severity::Warning => self.warnings.push(entry),
            Severity::Suggestion => self.suggestions.push(entry),
        }
        self.is_valid = self.errors.is_empty();
    }

    /// Every entry, errors first
    pub fn entries(&self) -> impl Iterator<Item = &ValidationEntry> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.suggestions.iter())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.entries().any(|e| e.code == code)
    }

    /// Entries carrying `code`, across all severities
    pub fn with_code(&self, code: &str) -> Vec<&ValidationEntry> {
        self.entries().filter(|e| e.code == code).collect()
    }

    pub fn total(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.suggestions.len()
    }
}

/// Whether `doc` carries all six top-level sections
pub fn is_full_document(doc: &ConfigValue) -> bool {
    doc.as_object()
        .map(|map| crate::model::SECTIONS.iter().all(|s| map.contains_key(*s)))
        .unwrap_or(false)
}

/// Runs the three validation stages in order
#[derive(Debug)]
pub struct ConfigValidator {
    schema: SchemaValidator,
    dependencies: DependencyEvaluator,
    cross_refs: CrossReferenceChecker,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            schema: SchemaValidator::new(),
            dependencies: DependencyEvaluator::new(),
            cross_refs: CrossReferenceChecker::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencyEvaluator) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn schema(&self) -> &SchemaValidator {
        &self.schema
    }

    pub fn dependencies(&self) -> &DependencyEvaluator {
        &self.dependencies
    }

    pub fn validate(&self, doc: &ConfigValue) -> ValidationResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut result = ValidationResult::new();
            self.schema.validate(doc, &mut result);
            self.dependencies.evaluate(doc, &mut result);
            self.cross_refs.check(doc, &mut result);
            result
        }));

        match outcome {
            Ok(result) => {
                debug!(
                    valid = result.is_valid,
                    errors = result.errors.len(),
                    warnings = result.warnings.len(),
                    suggestions = result.suggestions.len(),
                    "Validation complete"
                );
                result
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown failure".to_string());
                error!(detail = %detail, "Validator fault");
                let mut result = ValidationResult::new();
                result.push(ValidationEntry::error(
                    codes::VALIDATION_EXCEPTION,
                    "",
                    format!("Validator failed: {}", detail),
                ));
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_document;

    #[test]
    fn test_default_document_is_clean() {
        let result = ConfigValidator::new().validate(&default_document());
        assert!(result.is_valid, "unexpected errors: {:?}", result.errors);
        assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
    }

    #[test]
    fn test_validity_tracks_errors() {
        let mut result = ValidationResult::new();
        result.push(ValidationEntry::warning("W", "a", "warn"));
        assert!(result.is_valid);
        result.push(ValidationEntry::error("E", "a", "err"));
        assert!(!result.is_valid);
        assert_eq!(result.total(), 2);
        assert!(result.has_code("W"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let mut doc = default_document();
        doc.set("api.port", 0).unwrap();
        doc.set("security.https.enabled", true).unwrap();
        doc.set("api.cors.credentials", true).unwrap();
        doc.set("api.cors.origins", vec![ConfigValue::from("*")]).unwrap();

        let validator = ConfigValidator::new();
        assert_eq!(validator.validate(&doc), validator.validate(&doc));
    }

    #[test]
    fn test_full_document_detection() {
        assert!(is_full_document(&default_document()));
        let partial = ConfigValue::from(serde_json::json!({"version": "1.0.0", "api": {}}));
        assert!(!is_full_document(&partial));
        assert!(!is_full_document(&ConfigValue::Integer(3)));
    }
}
