//! Structural schema checks
//!
//! The schema is a flat table of [`FieldSpec`]s walked in table order, so
//! the same document always yields the same entries in the same order.
//! Full validation runs only when the document carries all six sections;
//! otherwise only the presence of `version` is checked.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::{debug, warn};

use super::{codes, is_full_document, ValidationEntry, ValidationResult};
use crate::model::SECTIONS;
use crate::value::{ConfigValue, FieldPath};

/// String shape checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Any,
    /// `MAJOR.MINOR.PATCH` with optional pre-release and build metadata
    SemVer,
    /// `scheme://authority[/...]`
    Url,
    /// DNS name, IPv4, or bracket-less IPv6 literal
    Host,
    /// Begins with `/`
    AbsolutePath,
    /// Non-empty filesystem path without control characters
    FilePath,
}

/// Expected type and constraints of one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Object,
    Boolean,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    String(StringFormat),
    Enum(Vec<&'static str>),
    StringArray,
}

/// One row of the schema table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub path: FieldPath,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    fn new(path: &str, kind: FieldKind) -> Self {
        Self {
            path: FieldPath::parse(path),
            kind,
            required: true,
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

fn object(path: &str) -> FieldSpec {
    FieldSpec::new(path, FieldKind::Object)
}

fn boolean(path: &str) -> FieldSpec {
    FieldSpec::new(path, FieldKind::Boolean)
}

fn int(path: &str, min: i64, max: i64) -> FieldSpec {
    FieldSpec::new(
        path,
        FieldKind::Integer {
            min: Some(min),
            max: Some(max),
        },
    )
}

fn number(path: &str, min: f64, max: f64) -> FieldSpec {
    FieldSpec::new(
        path,
        FieldKind::Number {
            min: Some(min),
            max: Some(max),
        },
    )
}

fn string(path: &str, format: StringFormat) -> FieldSpec {
    FieldSpec::new(path, FieldKind::String(format))
}

fn one_of(path: &str, values: &[&'static str]) -> FieldSpec {
    FieldSpec::new(path, FieldKind::Enum(values.to_vec()))
}

fn strings(path: &str) -> FieldSpec {
    FieldSpec::new(path, FieldKind::StringArray)
}

const MAX_TIMEOUT_MS: i64 = 600_000;

fn service_specs(name: &str, with_protocol: bool) -> Vec<FieldSpec> {
    let p = |field: &str| format!("services.{}.{}", name, field);
    let mut specs = vec![
        object(&format!("services.{}", name)),
        boolean(&p("enabled")),
        string(&p("host"), StringFormat::Host),
        int(&p("port"), 1, 65_535),
        int(&p("timeout"), 100, MAX_TIMEOUT_MS),
        int(&p("retries"), 0, 10),
    ];
    if with_protocol {
        specs.push(one_of(&p("protocol"), &["http", "https", "grpc", "tcp"]));
    }
    specs.push(string(&p("apiKey"), StringFormat::Any).optional());
    specs
}

/// The built-in schema for a full system configuration document
pub fn default_schema() -> Vec<FieldSpec> {
    use StringFormat::*;

    let mut specs = vec![
        string("version", SemVer),
        // api
        object("api"),
        string("api.host", Host),
        int("api.port", 1, 65_535),
        string("api.basePath", AbsolutePath),
        int("api.timeout", 100, MAX_TIMEOUT_MS),
        int("api.maxRequestSize", 1_024, 1_073_741_824),
        object("api.cors"),
        boolean("api.cors.enabled"),
        strings("api.cors.origins"),
        boolean("api.cors.credentials"),
        object("api.rateLimit"),
        boolean("api.rateLimit.enabled"),
        int("api.rateLimit.requestsPerMinute", 1, 1_000_000),
        int("api.rateLimit.burst", 0, 100_000),
        // services
        object("services"),
        object("services.llm"),
        boolean("services.llm.enabled"),
        string("services.llm.url", Url),
        string("services.llm.host", Host),
        int("services.llm.port", 1, 65_535),
        int("services.llm.timeout", 100, MAX_TIMEOUT_MS),
        int("services.llm.retries", 0, 10),
        string("services.llm.apiKey", Any).optional(),
        object("services.llm.models"),
        strings("services.llm.models.available"),
        string("services.llm.models.selected", Any).optional(),
    ];
    specs.extend(service_specs("vectorStore", true));
    specs.extend(service_specs("cache", true));
    specs.extend([
        object("services.database"),
        boolean("services.database.enabled"),
        string("services.database.host", Host),
        int("services.database.port", 1, 65_535),
        string("services.database.name", Any),
        string("services.database.username", Any),
        string("services.database.password", Any).optional(),
        int("services.database.poolSize", 1, 1_000),
        int("services.database.timeout", 100, MAX_TIMEOUT_MS),
        int("services.database.retries", 0, 10),
        // features
        object("features"),
        object("features.caching"),
        boolean("features.caching.enabled"),
        object("features.rag"),
        boolean("features.rag.enabled"),
        int("features.rag.chunkSize", 64, 32_768),
        int("features.rag.chunkOverlap", 0, 8_192),
        int("features.rag.topK", 1, 100),
        object("features.streaming"),
        boolean("features.streaming.enabled"),
        object("features.analytics"),
        boolean("features.analytics.enabled"),
        boolean("features.debugMode"),
        boolean("features.anonymousAccess"),
        // security
        object("security"),
        object("security.https"),
        boolean("security.https.enabled"),
        string("security.https.certificatePath", FilePath).optional(),
        string("security.https.keyPath", FilePath).optional(),
        object("security.authentication"),
        boolean("security.authentication.enabled"),
        one_of("security.authentication.method", &["none", "apiKey", "jwt", "oauth"]),
        string("security.authentication.jwtSecret", Any).optional(),
        int("security.authentication.sessionTimeout", 60, 604_800),
        int("security.authentication.maxLoginAttempts", 1, 100),
        object("security.encryption"),
        boolean("security.encryption.enabled"),
        one_of("security.encryption.algorithm", &["aes-256-gcm"]),
        int("security.encryption.keyRotationDays", 1, 3_650),
        string("security.encryption.masterKey", Any).optional(),
        // monitoring
        object("monitoring"),
        boolean("monitoring.enabled"),
        one_of("monitoring.logLevel", &["error", "warn", "info", "debug", "trace"]),
        object("monitoring.metrics"),
        boolean("monitoring.metrics.enabled"),
        int("monitoring.metrics.port", 1, 65_535),
        int("monitoring.metrics.interval", 1, 86_400),
        object("monitoring.healthCheck"),
        boolean("monitoring.healthCheck.enabled"),
        int("monitoring.healthCheck.interval", 1, 86_400),
        int("monitoring.healthCheck.timeout", 1, 3_600),
        object("monitoring.alerting"),
        boolean("monitoring.alerting.enabled"),
        string("monitoring.alerting.webhookUrl", Url).optional(),
        object("monitoring.tracing"),
        boolean("monitoring.tracing.enabled"),
        number("monitoring.tracing.sampleRate", 0.0, 1.0),
        // performance
        object("performance"),
        int("performance.maxConcurrentRequests", 1, 100_000),
        int("performance.workerThreads", 1, 1_024),
        object("performance.connectionPool"),
        int("performance.connectionPool.min", 0, 10_000),
        int("performance.connectionPool.max", 1, 10_000),
        object("performance.caching"),
        boolean("performance.caching.enabled"),
        int("performance.caching.maxSize", 1, 100_000_000),
        int("performance.caching.ttl", 0, 2_592_000),
        object("performance.compression"),
        boolean("performance.compression.enabled"),
        int("performance.compression.level", 1, 9),
    ]);
    specs
}

#[derive(Debug)]
struct Formats {
    semver: Regex,
    url: Regex,
    host: Regex,
}

impl Formats {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            semver: Regex::new(
                r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$",
            )?,
            url: Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s/?#]+([/?#]\S*)?$")?,
            host: Regex::new(
                r"^(([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*|[0-9A-Fa-f:]*:[0-9A-Fa-f:.]*)$",
            )?,
        })
    }

    fn check(&self, format: StringFormat, s: &str) -> bool {
        match format {
            StringFormat::Any => true,
            StringFormat::SemVer => self.semver.is_match(s),
            StringFormat::Url => self.url.is_match(s),
            StringFormat::Host => s.len() <= 253 && self.host.is_match(s),
            StringFormat::AbsolutePath => s.starts_with('/') && !s.chars().any(char::is_whitespace),
            StringFormat::FilePath => !s.is_empty() && !s.chars().any(char::is_control),
        }
    }
}

fn describe(format: StringFormat) -> &'static str {
    match format {
        StringFormat::Any => "string",
        StringFormat::SemVer => "semantic version (MAJOR.MINOR.PATCH)",
        StringFormat::Url => "URL (scheme://host[/path])",
        StringFormat::Host => "host name or IP address",
        StringFormat::AbsolutePath => "absolute path starting with '/'",
        StringFormat::FilePath => "file path",
    }
}

/// Table-driven structural validator
#[derive(Debug)]
pub struct SchemaValidator {
    fields: Vec<FieldSpec>,
    formats: Result<Formats, String>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::with_fields(default_schema())
    }

    pub fn with_fields(fields: Vec<FieldSpec>) -> Self {
        let formats = Formats::compile().map_err(|e| e.to_string());
        if let Err(ref e) = formats {
            warn!(error = %e, "Schema format patterns failed to compile");
        }
        Self { fields, formats }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Whether `path` is declared in the schema
    pub fn is_known(&self, path: &FieldPath) -> bool {
        self.fields.iter().any(|f| &f.path == path)
    }

    /// Append schema findings for `doc` to `result`
    pub fn validate(&self, doc: &ConfigValue, result: &mut ValidationResult) {
        if !is_full_document(doc) {
            debug!("Partial document: checking version presence only");
            let present = doc.child("version").map(ConfigValue::is_present).unwrap_or(false);
            if !present {
                result.push(
                    ValidationEntry::error(
                        codes::MISSING_VERSION,
                        "version",
                        "Configuration version is required",
                    )
                    .with_suggestion("Add a semantic version such as \"1.0.0\""),
                );
            }
            return;
        }

        let formats = match &self.formats {
            Ok(formats) => formats,
            Err(e) => {
                result.push(ValidationEntry::error(
                    codes::VALIDATION_EXCEPTION,
                    "",
                    format!("Schema validator unavailable: {}", e),
                ));
                return;
            }
        };

        // objects that failed their own check; descendants are skipped
        let mut broken: Vec<&FieldPath> = Vec::new();

        for spec in &self.fields {
            if broken.iter().any(|b| b.is_ancestor_of(&spec.path)) {
                continue;
            }
            let path = spec.path.to_string();

            let value = match doc.get_path(&spec.path) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if spec.required {
                        result.push(ValidationEntry::error(
                            codes::REQUIRED_FIELD,
                            &path,
                            format!("Required field '{}' is missing", path),
                        ));
                        if spec.kind == FieldKind::Object {
                            broken.push(&spec.path);
                        }
                    }
                    continue;
                }
            };

            if let Some(entry) = check_field(spec, &path, value, formats) {
                if spec.kind == FieldKind::Object {
                    broken.push(&spec.path);
                }
                result.push(entry);
            }
        }

        self.report_unknown_fields(doc, result);
    }

    /// Unknown keys under known objects become `UNKNOWN_FIELD` suggestions
    fn report_unknown_fields(&self, doc: &ConfigValue, result: &mut ValidationResult) {
        let known: BTreeSet<&FieldPath> = self.fields.iter().map(|f| &f.path).collect();

        let mut containers = vec![FieldPath::root()];
        containers.extend(
            self.fields
                .iter()
                .filter(|f| f.kind == FieldKind::Object)
                .map(|f| f.path.clone()),
        );

        for container in containers {
            let Some(map) = doc.get_path(&container).and_then(ConfigValue::as_object) else {
                continue;
            };
            let siblings: Vec<&str> = self
                .fields
                .iter()
                .filter(|f| f.path.parent().as_ref() == Some(&container))
                .filter_map(|f| f.path.last())
                .collect();

            for key in map.keys() {
                let child = container.child(key.clone());
                if known.contains(&child) {
                    continue;
                }
                let path = child.to_string();
                let mut entry = ValidationEntry::suggestion(
                    codes::UNKNOWN_FIELD,
                    &path,
                    format!("Unknown field '{}'", path),
                );
                if let Some(closest) = closest_match(key, &siblings) {
                    entry = entry.with_suggestion(format!("Did you mean '{}'?", closest));
                }
                result.push(entry);
            }
        }
    }
}

fn check_field(
    spec: &FieldSpec,
    path: &str,
    value: &ConfigValue,
    formats: &Formats,
) -> Option<ValidationEntry> {
    let type_error = |expected: &str| {
        Some(
            ValidationEntry::error(
                codes::INVALID_TYPE,
                path,
                format!("Expected {}, found {}", expected, value.type_name()),
            )
            .with_value(value.clone()),
        )
    };

    match &spec.kind {
        FieldKind::Object => {
            if !value.is_object() {
                return type_error("object");
            }
        }
        FieldKind::Boolean => {
            if value.as_bool().is_none() {
                return type_error("boolean");
            }
        }
        FieldKind::Integer { min, max } => {
            let Some(n) = value.as_i64() else {
                return type_error("integer");
            };
            let below = min.map(|m| n < m).unwrap_or(false);
            let above = max.map(|m| n > m).unwrap_or(false);
            if below || above {
                return Some(out_of_range(path, value, &range_text(min, max)));
            }
        }
        FieldKind::Number { min, max } => {
            let Some(n) = value.as_f64() else {
                return type_error("number");
            };
            let below = min.map(|m| n < m).unwrap_or(false);
            let above = max.map(|m| n > m).unwrap_or(false);
            if below || above || n.is_nan() {
                return Some(out_of_range(path, value, &range_text(min, max)));
            }
        }
        FieldKind::String(format) => {
            let Some(s) = value.as_str() else {
                return type_error("string");
            };
            if !formats.check(*format, s) {
                return Some(
                    ValidationEntry::error(
                        codes::INVALID_FORMAT,
                        path,
                        format!("Expected {}", describe(*format)),
                    )
                    .with_value(value.clone()),
                );
            }
        }
        FieldKind::Enum(allowed) => {
            let Some(s) = value.as_str() else {
                return type_error("string");
            };
            if !allowed.contains(&s) {
                return Some(
                    ValidationEntry::error(
                        codes::INVALID_ENUM,
                        path,
                        format!("Value '{}' is not one of: {}", s, allowed.join(", ")),
                    )
                    .with_value(value.clone())
                    .with_suggestion(format!("Use one of: {}", allowed.join(", "))),
                );
            }
        }
        FieldKind::StringArray => {
            let Some(items) = value.as_array() else {
                return type_error("array of strings");
            };
            if let Some(idx) = items.iter().position(|i| i.as_str().is_none()) {
                return Some(
                    ValidationEntry::error(
                        codes::INVALID_TYPE,
                        path,
                        format!(
                            "Expected array of strings, element {} is {}",
                            idx,
                            items[idx].type_name()
                        ),
                    )
                    .with_value(value.clone()),
                );
            }
        }
    }
    None
}

fn range_text<T: std::fmt::Display>(min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
        (Some(lo), None) => format!(">= {}", lo),
        (None, Some(hi)) => format!("<= {}", hi),
        (None, None) => "unbounded".to_string(),
    }
}

fn out_of_range(path: &str, value: &ConfigValue, range: &str) -> ValidationEntry {
    ValidationEntry::error(
        codes::OUT_OF_RANGE,
        path,
        format!("Value {} is outside the allowed range {}", value, range),
    )
    .with_value(value.clone())
}

/// Closest candidate within edit distance 3, if any
fn closest_match<'a>(key: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (edit_distance(&key.to_lowercase(), &c.to_lowercase()), *c))
        .filter(|(d, _)| *d <= 3)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}

/// Top-level keys a full document may carry
pub fn top_level_keys() -> impl Iterator<Item = &'static str> {
    std::iter::once("version").chain(SECTIONS)
}
