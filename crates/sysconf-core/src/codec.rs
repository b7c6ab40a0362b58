//! Import and export formats
//!
//! JSON is the canonical, lossless form: `parse(serialize(c, Json)) == c`.
//! YAML and TOML go through real serde emitters but are approximate: TOML
//! has no null, so null leaves are dropped. ENV flattens the tree into
//! `SECTION_KEY=value` lines; its parser infers scalars and comma lists and
//! lower-cases keys, so camelCase names do not survive a round trip. XML is
//! export only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, FieldPath, PathPattern};

/// Leaves treated as secrets by export, backup, and encryption
pub const DEFAULT_SENSITIVE_FIELDS: [&str; 5] = [
    "services.*.apiKey",
    "services.*.password",
    "security.authentication.jwtSecret",
    "security.encryption.masterKey",
    "monitoring.alerting.webhookUrl",
];

/// Fixed replacement run for masked values
pub const MASK: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Toml,
    Env,
    Xml,
}

impl Format {
    pub const ALL: [Format; 5] = [Format::Json, Format::Yaml, Format::Toml, Format::Env, Format::Xml];

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Env => "env",
            Format::Xml => "xml",
        }
    }

    pub fn can_parse(&self) -> bool {
        !matches!(self, Format::Xml)
    }

    /// Guess a format from a file path's extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            "env" | "dotenv" => Ok(Format::Env),
            "xml" => Ok(Format::Xml),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Which part of the document to export
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum ExportScope {
    #[default]
    Full,
    /// One top-level section
    Section(String),
    /// Explicit dotted paths or wildcard patterns
    Fields(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitiveHandling {
    #[default]
    Include,
    Omit,
    Mask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub scope: ExportScope,
    pub exclude_fields: Vec<String>,
    pub sensitive: SensitiveHandling,
    pub sensitive_fields: Vec<String>,
    /// Prepended as `PREFIX_` to every ENV key
    pub env_prefix: Option<String>,
    pub pretty: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scope: ExportScope::Full,
            exclude_fields: Vec::new(),
            sensitive: SensitiveHandling::Include,
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
            env_prefix: None,
            pretty: true,
        }
    }
}

impl ExportOptions {
    pub fn with_scope(mut self, scope: ExportScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_sensitive(mut self, handling: SensitiveHandling) -> Self {
        self.sensitive = handling;
        self
    }

    pub fn excluding(mut self, field: impl Into<String>) -> Self {
        self.exclude_fields.push(field.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }
}

/// Keep the first and last two characters around [`MASK`]
pub fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return MASK.to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

/// Apply scope, exclusions, and sensitive handling without encoding
pub fn prepare_export(config: &ConfigValue, options: &ExportOptions) -> Result<ConfigValue> {
    let mut doc = match &options.scope {
        ExportScope::Full => config.clone(),
        ExportScope::Section(name) => {
            let section = config
                .child(name)
                .ok_or_else(|| ConfigError::invalid_input(format!("no section '{}' to export", name)))?;
            let mut doc = ConfigValue::object();
            doc.set_path(&FieldPath::parse(name), section.clone())?;
            doc
        }
        ExportScope::Fields(fields) => {
            let mut doc = ConfigValue::object();
            for field in fields {
                for path in PathPattern::parse(field).expand(config) {
                    if let Some(value) = config.get_path(&path) {
                        doc.set_path(&path, value.clone())?;
                    }
                }
            }
            doc
        }
    };

    for field in &options.exclude_fields {
        for path in PathPattern::parse(field).expand(&doc) {
            doc.remove_path(&path);
        }
    }

    if options.sensitive != SensitiveHandling::Include {
        for field in &options.sensitive_fields {
            for path in PathPattern::parse(field).expand(&doc) {
                match options.sensitive {
                    SensitiveHandling::Omit => {
                        doc.remove_path(&path);
                    }
                    SensitiveHandling::Mask => {
                        let masked = match doc.get_path(&path) {
                            Some(ConfigValue::String(s)) => mask_value(s),
                            Some(ConfigValue::Null) | None => continue,
                            Some(_) => MASK.to_string(),
                        };
                        doc.set_path(&path, ConfigValue::String(masked))?;
                    }
                    SensitiveHandling::Include => {}
                }
            }
        }
    }
    Ok(doc)
}

pub fn serialize(config: &ConfigValue, format: Format, options: &ExportOptions) -> Result<String> {
    let doc = prepare_export(config, options)?;
    let out = match format {
        Format::Json => {
            if options.pretty {
                serde_json::to_string_pretty(&doc)
            } else {
                serde_json::to_string(&doc)
            }
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?
        }
        Format::Yaml => {
            serde_yaml::to_string(&doc).map_err(|e| ConfigError::SerializationError(e.to_string()))?
        }
        Format::Toml => {
            let value = to_toml(&doc).ok_or_else(|| {
                ConfigError::SerializationError("TOML documents must be tables".to_string())
            })?;
            if options.pretty {
                toml::to_string_pretty(&value)?
            } else {
                toml::to_string(&value)?
            }
        }
        Format::Env => to_env(&doc, options.env_prefix.as_deref()),
        Format::Xml => to_xml(&doc, options.pretty),
    };
    debug!(format = %format, bytes = out.len(), "Configuration serialized");
    Ok(out)
}

pub fn parse(text: &str, format: Format) -> Result<ConfigValue> {
    let doc = match format {
        Format::Json => serde_json::from_str(text)?,
        Format::Yaml => serde_yaml::from_str(text)?,
        Format::Toml => from_toml(toml::from_str::<toml::Value>(text)?),
        Format::Env => from_env(text)?,
        Format::Xml => return Err(ConfigError::unsupported("xml", "parse")),
    };
    debug!(format = %format, "Configuration parsed");
    Ok(doc)
}

fn to_toml(value: &ConfigValue) -> Option<toml::Value> {
    match value {
        ConfigValue::Null => None,
        ConfigValue::Boolean(b) => Some(toml::Value::Boolean(*b)),
        ConfigValue::Integer(i) => Some(toml::Value::Integer(*i)),
        ConfigValue::Float(f) => Some(toml::Value::Float(*f)),
        ConfigValue::String(s) => Some(toml::Value::String(s.clone())),
        ConfigValue::Array(items) => Some(toml::Value::Array(items.iter().filter_map(to_toml).collect())),
        ConfigValue::Object(map) => Some(toml::Value::Table(
            map.iter()
                .filter_map(|(k, v)| to_toml(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

fn from_toml(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s),
        toml::Value::Integer(i) => ConfigValue::Integer(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Boolean(b),
        toml::Value::Array(items) => ConfigValue::Array(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => {
            ConfigValue::Object(table.into_iter().map(|(k, v)| (k, from_toml(v))).collect())
        }
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
    }
}

fn env_scalar(value: &ConfigValue) -> String {
    let raw = match value {
        ConfigValue::String(s) => s.clone(),
        ConfigValue::Array(items) => items.iter().map(env_scalar).collect::<Vec<_>>().join(","),
        other => other.to_json_string(),
    };
    if raw.chars().any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '=')) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}

fn to_env(doc: &ConfigValue, prefix: Option<&str>) -> String {
    let mut lines = Vec::new();
    doc.for_each_leaf(|path, value| {
        if value.is_null() || value.is_object() {
            return;
        }
        let mut key: Vec<String> = path.segments().iter().map(|s| s.to_uppercase()).collect();
        if let Some(prefix) = prefix {
            key.insert(0, prefix.to_uppercase());
        }
        lines.push(format!("{}={}", key.join("_"), env_scalar(value)));
    });
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn infer_scalar(raw: &str) -> ConfigValue {
    let raw = raw.trim();
    match raw {
        "true" => return ConfigValue::Boolean(true),
        "false" => return ConfigValue::Boolean(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return ConfigValue::Integer(i);
    }
    if raw.contains('.') {
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return ConfigValue::Float(f);
            }
        }
    }
    ConfigValue::String(raw.to_string())
}

fn unquote(raw: &str) -> Option<String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))?;
    Some(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
}

fn from_env(text: &str) -> Result<ConfigValue> {
    let mut doc = ConfigValue::object();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, raw) = line.split_once('=').ok_or_else(|| {
            ConfigError::parse_error(format!("line {}: expected KEY=value", lineno + 1))
        })?;

        let segments: Vec<String> = key
            .trim()
            .split('_')
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .collect();
        if segments.is_empty() {
            return Err(ConfigError::parse_error(format!("line {}: empty key", lineno + 1)));
        }

        let raw = raw.trim();
        let value = match unquote(raw) {
            Some(text) => ConfigValue::String(text),
            None if raw.contains(',') => {
                ConfigValue::Array(raw.split(',').map(infer_scalar).collect())
            }
            None => infer_scalar(raw),
        };

        doc.set_path(&FieldPath::from_segments(segments), value)
            .map_err(|e| ConfigError::parse_error(format!("line {}: {}", lineno + 1, e)))?;
    }
    Ok(doc)
}

fn xml_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn write_xml(out: &mut String, name: &str, value: &ConfigValue, depth: usize, pretty: bool) {
    let indent = if pretty { "  ".repeat(depth) } else { String::new() };
    let newline = if pretty { "\n" } else { "" };
    match value {
        ConfigValue::Null => out.push_str(&format!("{}<{}/>{}", indent, name, newline)),
        ConfigValue::Object(map) => {
            out.push_str(&format!("{}<{}>{}", indent, name, newline));
            for (key, child) in map {
                write_xml(out, &xml_name(key), child, depth + 1, pretty);
            }
            out.push_str(&format!("{}</{}>{}", indent, name, newline));
        }
        ConfigValue::Array(items) => {
            out.push_str(&format!("{}<{}>{}", indent, name, newline));
            for item in items {
                write_xml(out, "item", item, depth + 1, pretty);
            }
            out.push_str(&format!("{}</{}>{}", indent, name, newline));
        }
        scalar => out.push_str(&format!(
            "{}<{}>{}</{}>{}",
            indent,
            name,
            xml_escape(&scalar.to_string()),
            name,
            newline
        )),
    }
}

fn to_xml(doc: &ConfigValue, pretty: bool) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    if pretty {
        out.push('\n');
    }
    write_xml(&mut out, "configuration", doc, 0, pretty);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_document;
    use proptest::prelude::*;
    use serde_json::json;

    fn with_secrets() -> ConfigValue {
        let mut doc = default_document();
        doc.set("services.llm.apiKey", "sk-abcdef123456").unwrap();
        doc.set("services.database.password", "pw").unwrap();
        doc
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("YML".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("dotenv".parse::<Format>().unwrap(), Format::Env);
        assert!(matches!("ini".parse::<Format>(), Err(ConfigError::UnknownFormat(_))));
        assert_eq!(
            Format::from_path(std::path::Path::new("conf/prod.toml")),
            Some(Format::Toml)
        );
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value("sk-abcdef123456"), "sk********56");
        assert_eq!(mask_value("abcd"), MASK);
        assert_eq!(mask_value("abcde"), "ab********de");
        assert_eq!(mask_value(""), MASK);
    }

    #[test]
    fn test_json_round_trip_default_document() {
        let doc = with_secrets();
        let text = serialize(&doc, Format::Json, &ExportOptions::default()).unwrap();
        assert_eq!(parse(&text, Format::Json).unwrap(), doc);
    }

    #[test]
    fn test_sensitive_mask_and_omit() {
        let doc = with_secrets();
        let masked = prepare_export(
            &doc,
            &ExportOptions::default().with_sensitive(SensitiveHandling::Mask),
        )
        .unwrap();
        assert_eq!(
            masked.get("services.llm.apiKey"),
            Some(&ConfigValue::from("sk********56"))
        );
        assert_eq!(masked.get("services.database.password"), Some(&ConfigValue::from(MASK)));

        let omitted = prepare_export(
            &doc,
            &ExportOptions::default().with_sensitive(SensitiveHandling::Omit),
        )
        .unwrap();
        assert!(omitted.get("services.llm.apiKey").is_none());
        assert!(omitted.get("services.llm.url").is_some());
    }

    #[test]
    fn test_scope_and_exclusions() {
        let doc = default_document();
        let section = prepare_export(
            &doc,
            &ExportOptions::default().with_scope(ExportScope::Section("api".to_string())),
        )
        .unwrap();
        assert_eq!(section.as_object().unwrap().len(), 1);
        assert!(section.get("api.port").is_some());

        let fields = prepare_export(
            &doc,
            &ExportOptions::default()
                .with_scope(ExportScope::Fields(vec!["services.*.port".to_string(), "version".to_string()]))
                .excluding("services.cache"),
        )
        .unwrap();
        assert!(fields.get("services.llm.port").is_some());
        assert!(fields.get("services.cache").is_none());
        assert!(fields.get("services.llm.host").is_none());
        assert!(fields.get("version").is_some());

        assert!(prepare_export(
            &doc,
            &ExportOptions::default().with_scope(ExportScope::Section("nope".to_string()))
        )
        .is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let doc = default_document();
        let text = serialize(&doc, Format::Yaml, &ExportOptions::default()).unwrap();
        assert_eq!(parse(&text, Format::Yaml).unwrap(), doc);
    }

    #[test]
    fn test_toml_drops_nulls() {
        let doc = ConfigValue::from(json!({
            "api": {"port": 8080, "host": "h", "note": null},
            "version": "1.0.0"
        }));
        let text = serialize(&doc, Format::Toml, &ExportOptions::default()).unwrap();
        let parsed = parse(&text, Format::Toml).unwrap();
        assert_eq!(parsed.get("api.port"), Some(&ConfigValue::Integer(8080)));
        assert!(parsed.get("api.note").is_none());
        assert!(serialize(&ConfigValue::from(3), Format::Toml, &ExportOptions::default()).is_err());
    }

    #[test]
    fn test_env_flatten_and_parse() {
        let doc = ConfigValue::from(json!({
            "api": {"port": 8080, "host": "0.0.0.0", "cors": {"origins": ["a", "b"]}},
            "monitoring": {"tracing": {"sampleRate": 0.5}},
            "features": {"debugMode": false, "motd": "hello world"}
        }));
        let text = serialize(&doc, Format::Env, &ExportOptions::default().with_env_prefix("app")).unwrap();
        assert!(text.contains("APP_API_PORT=8080\n"));
        assert!(text.contains("APP_API_CORS_ORIGINS=a,b\n"));
        assert!(text.contains("APP_FEATURES_MOTD=\"hello world\"\n"));

        let parsed = parse(&text, Format::Env).unwrap();
        assert_eq!(parsed.get("app.api.port"), Some(&ConfigValue::Integer(8080)));
        assert_eq!(parsed.get("app.monitoring.tracing.samplerate"), Some(&ConfigValue::Float(0.5)));
        assert_eq!(parsed.get("app.features.debugmode"), Some(&ConfigValue::Boolean(false)));
        assert_eq!(parsed.get("app.features.motd"), Some(&ConfigValue::from("hello world")));
        assert_eq!(
            parsed.get("app.api.cors.origins"),
            Some(&ConfigValue::Array(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_env_parse_errors() {
        assert!(parse("NOT_A_PAIR\n", Format::Env).is_err());
        // A scalar cannot also be a parent
        assert!(parse("A=1\nA_B=2\n", Format::Env).is_err());
        let parsed = parse("# comment\n\nexport X_Y=yes\n", Format::Env).unwrap();
        assert_eq!(parsed.get("x.y"), Some(&ConfigValue::from("yes")));
    }

    #[test]
    fn test_xml_export_only() {
        let doc = ConfigValue::from(json!({"api": {"host": "a<b", "tags": [1, 2]}, "x": null}));
        let text = serialize(&doc, Format::Xml, &ExportOptions::default().compact()).unwrap();
        assert_eq!(
            text,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><configuration><api><host>a&lt;b</host>\
             <tags><item>1</item><item>2</item></tags></api><x/></configuration>"
        );
        assert!(matches!(
            parse(&text, Format::Xml),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_json_is_lossless(doc in crate::diff::tests::arb_document()) {
            let text = serialize(&doc, Format::Json, &ExportOptions::default().compact()).unwrap();
            prop_assert_eq!(parse(&text, Format::Json).unwrap(), doc);
        }
    }
}
