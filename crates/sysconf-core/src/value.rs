//! Configuration value tree and dotted-path addressing
//!
//! Every engine operation works on [`ConfigValue`], a tagged union that can
//! hold partial or externally supplied documents. Object keys are kept in a
//! `BTreeMap`, so iteration (and therefore diff output and validation order)
//! is deterministic.
//!
//! Dotted strings such as `security.https.enabled` are the external
//! addressing interface; internally they are parsed once into a
//! [`FieldPath`]. [`PathPattern`] adds a single-segment `*` wildcard.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, Result};

/// A node in a configuration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum ConfigValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Object(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// An empty object
    pub fn object() -> Self {
        ConfigValue::Object(BTreeMap::new())
    }

    /// Convert any serializable value (e.g. the typed configuration model)
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(ConfigValue::from)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))
    }

    /// Deserialize into a typed structure
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(JsonValue::from(self.clone()))?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Boolean(_) => "boolean",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::Array(_) => "array",
            ConfigValue::Object(_) => "object",
        }
    }

    /// Truthiness used by dependency rules
    ///
    /// `null`, `false`, zero, `""`, `[]` and `{}` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            ConfigValue::Null => false,
            ConfigValue::Boolean(b) => *b,
            ConfigValue::Integer(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0 && !f.is_nan(),
            ConfigValue::String(s) => !s.is_empty(),
            ConfigValue::Array(a) => !a.is_empty(),
            ConfigValue::Object(o) => !o.is_empty(),
        }
    }

    /// Present means non-null and, for strings, non-empty
    pub fn is_present(&self) -> bool {
        match self {
            ConfigValue::Null => false,
            ConfigValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, ConfigValue::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Integer(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<ConfigValue>> {
        match self {
            ConfigValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Direct child of an object
    pub fn child(&self, key: &str) -> Option<&ConfigValue> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Look up a node by path; `None` when any segment is missing
    pub fn get_path(&self, path: &FieldPath) -> Option<&ConfigValue> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Look up a node by dotted path
    pub fn get(&self, dotted: &str) -> Option<&ConfigValue> {
        self.get_path(&FieldPath::parse(dotted))
    }

    /// Set a node, creating intermediate objects; returns the previous value
    ///
    /// Fails when an intermediate node exists but is not an object.
    pub fn set_path(&mut self, path: &FieldPath, value: ConfigValue) -> Result<Option<ConfigValue>> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Ok(Some(std::mem::replace(self, value)));
        };

        let mut node = self;
        for (depth, segment) in parents.iter().enumerate() {
            let map = node.as_object_mut().ok_or_else(|| {
                ConfigError::invalid_input(format!(
                    "cannot descend into non-object at '{}'",
                    FieldPath::from_segments(path.segments()[..depth].to_vec())
                ))
            })?;
            node = map.entry(segment.clone()).or_insert_with(ConfigValue::object);
        }

        let map = node.as_object_mut().ok_or_else(|| {
            ConfigError::invalid_input(format!("parent of '{}' is not an object", path))
        })?;
        Ok(map.insert(last.clone(), value))
    }

    /// Set a node by dotted path
    pub fn set(&mut self, dotted: &str, value: impl Into<ConfigValue>) -> Result<Option<ConfigValue>> {
        self.set_path(&FieldPath::parse(dotted), value.into())
    }

    /// Remove a node; returns it if it existed
    pub fn remove_path(&mut self, path: &FieldPath) -> Option<ConfigValue> {
        let (last, parents) = path.segments().split_last()?;
        let mut node = self;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        node.as_object_mut()?.remove(last)
    }

    /// Visit every non-object node (and every empty object) with its path
    pub fn for_each_leaf<F>(&self, mut f: F)
    where
        F: FnMut(&FieldPath, &ConfigValue),
    {
        fn walk<F: FnMut(&FieldPath, &ConfigValue)>(node: &ConfigValue, path: &mut Vec<String>, f: &mut F) {
            match node {
                ConfigValue::Object(map) if !map.is_empty() => {
                    for (key, child) in map {
                        path.push(key.clone());
                        walk(child, path, f);
                        path.pop();
                    }
                }
                _ => f(&FieldPath::from_segments(path.clone()), node),
            }
        }
        walk(self, &mut Vec::new(), &mut f);
    }

    /// Compact JSON rendering
    pub fn to_json_string(&self) -> String {
        JsonValue::from(self.clone()).to_string()
    }

    pub fn to_json_pretty(&self) -> String {
        format!("{:#}", JsonValue::from(self.clone()))
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            other => f.write_str(&other.to_json_string()),
        }
    }
}

impl From<JsonValue> for ConfigValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ConfigValue::Null,
            JsonValue::Bool(b) => ConfigValue::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Integer(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => ConfigValue::String(s),
            JsonValue::Array(items) => {
                ConfigValue::Array(items.into_iter().map(ConfigValue::from).collect())
            }
            JsonValue::Object(map) => ConfigValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigValue> for JsonValue {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Null => JsonValue::Null,
            ConfigValue::Boolean(b) => JsonValue::Bool(b),
            ConfigValue::Integer(i) => JsonValue::from(i),
            // NaN and infinities have no JSON form
            ConfigValue::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ConfigValue::String(s) => JsonValue::String(s),
            ConfigValue::Array(items) => {
                JsonValue::Array(items.into_iter().map(JsonValue::from).collect())
            }
            ConfigValue::Object(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, JsonValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Boolean(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<u32> for ConfigValue {
    fn from(i: u32) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        ConfigValue::Array(items)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(map: BTreeMap<String, ConfigValue>) -> Self {
        ConfigValue::Object(map)
    }
}

/// Parsed dotted path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Split a dotted string; empty input is the root path
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(str::to_string).collect())
    }

    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, rest)| Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Whether `self` is a strict prefix of `other`
    pub fn is_ancestor_of(&self, other: &FieldPath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        FieldPath::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PatternSegment {
    Literal(String),
    Wildcard,
}

/// Dotted path pattern where `*` matches exactly one segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| {
                if s == "*" {
                    PatternSegment::Wildcard
                } else {
                    PatternSegment::Literal(s.to_string())
                }
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segment_matches(pattern: &PatternSegment, segment: &str) -> bool {
        match pattern {
            PatternSegment::Wildcard => true,
            PatternSegment::Literal(lit) => lit == segment,
        }
    }

    /// Exact match, segment for segment
    pub fn matches(&self, path: &FieldPath) -> bool {
        path.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(path.segments())
                .all(|(p, s)| Self::segment_matches(p, s))
    }

    /// `path` is a strict prefix of some path this pattern matches
    pub fn is_matched_by_ancestor(&self, path: &FieldPath) -> bool {
        path.len() < self.segments.len()
            && self
                .segments
                .iter()
                .zip(path.segments())
                .all(|(p, s)| Self::segment_matches(p, s))
    }

    /// A change at `path` affects this pattern when it matches exactly or
    /// replaces an ancestor subtree
    pub fn touches(&self, path: &FieldPath) -> bool {
        self.matches(path) || self.is_matched_by_ancestor(path)
    }

    /// Concrete paths present in `doc` that match, in key order
    pub fn expand(&self, doc: &ConfigValue) -> Vec<FieldPath> {
        fn walk(
            node: &ConfigValue,
            remaining: &[PatternSegment],
            current: &mut Vec<String>,
            out: &mut Vec<FieldPath>,
        ) {
            let Some((head, rest)) = remaining.split_first() else {
                out.push(FieldPath::from_segments(current.clone()));
                return;
            };
            let Some(map) = node.as_object() else {
                return;
            };
            match head {
                PatternSegment::Literal(key) => {
                    if let Some(child) = map.get(key) {
                        current.push(key.clone());
                        walk(child, rest, current, out);
                        current.pop();
                    }
                }
                PatternSegment::Wildcard => {
                    for (key, child) in map {
                        current.push(key.clone());
                        walk(child, rest, current, out);
                        current.pop();
                    }
                }
            }
        }

        let mut out = Vec::new();
        walk(doc, &self.segments, &mut Vec::new(), &mut out);
        out
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
