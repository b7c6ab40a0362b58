//! Structural diff between configuration documents
//!
//! [`diff`] walks the union of keys in sorted order and emits one
//! [`ConfigurationChange`] per added, deleted, or updated node. Objects
//! present on both sides are recursed into; everything else (scalars,
//! arrays, type changes) is compared by equality and reported as a whole.
//! [`apply_changes`] replays a change set, so
//! `apply_changes(a, &diff(a, b)) == b`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, FieldPath};

/// Actor recorded on changes produced without a user context
pub const SYSTEM_USER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Add => write!(f, "add"),
            ChangeOperation::Update => write!(f, "update"),
            ChangeOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One difference between two documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationChange {
    /// Dotted path of the changed node
    pub field: String,
    pub operation: ChangeOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<ConfigValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<ConfigValue>,
    /// Path segments; unambiguous even when keys contain dots
    pub path: FieldPath,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl fmt::Display for ConfigurationChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            ChangeOperation::Add => write!(
                f,
                "+ {} = {}",
                self.field,
                self.new_value.as_ref().map(ConfigValue::to_json_string).unwrap_or_default()
            ),
            ChangeOperation::Delete => write!(
                f,
                "- {} (was {})",
                self.field,
                self.old_value.as_ref().map(ConfigValue::to_json_string).unwrap_or_default()
            ),
            ChangeOperation::Update => write!(
                f,
                "~ {}: {} -> {}",
                self.field,
                self.old_value.as_ref().map(ConfigValue::to_json_string).unwrap_or_default(),
                self.new_value.as_ref().map(ConfigValue::to_json_string).unwrap_or_default()
            ),
        }
    }
}

/// Changes that turn `a` into `b`, attributed to [`SYSTEM_USER`]
pub fn diff(a: &ConfigValue, b: &ConfigValue) -> Vec<ConfigurationChange> {
    diff_as(a, b, SYSTEM_USER, None)
}

/// Changes that turn `a` into `b`, attributed to `user`
pub fn diff_as(
    a: &ConfigValue,
    b: &ConfigValue,
    user: &str,
    reason: Option<&str>,
) -> Vec<ConfigurationChange> {
    let mut ctx = DiffContext {
        timestamp: Utc::now(),
        user,
        reason,
        out: Vec::new(),
    };
    ctx.walk(a, b, &mut Vec::new());
    ctx.out
}

struct DiffContext<'a> {
    timestamp: DateTime<Utc>,
    user: &'a str,
    reason: Option<&'a str>,
    out: Vec<ConfigurationChange>,
}

impl DiffContext<'_> {
    fn walk(&mut self, a: &ConfigValue, b: &ConfigValue, path: &mut Vec<String>) {
        match (a, b) {
            (ConfigValue::Object(left), ConfigValue::Object(right)) => {
                let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
                for key in keys {
                    path.push(key.clone());
                    match (left.get(key), right.get(key)) {
                        (Some(l), Some(r)) => self.walk(l, r, path),
                        (Some(l), None) => self.record(ChangeOperation::Delete, path, Some(l), None),
                        (None, Some(r)) => self.record(ChangeOperation::Add, path, None, Some(r)),
                        (None, None) => {}
                    }
                    path.pop();
                }
            }
            _ if a != b => self.record(ChangeOperation::Update, path, Some(a), Some(b)),
            _ => {}
        }
    }

    fn record(
        &mut self,
        operation: ChangeOperation,
        path: &[String],
        old: Option<&ConfigValue>,
        new: Option<&ConfigValue>,
    ) {
        let path = FieldPath::from_segments(path.to_vec());
        self.out.push(ConfigurationChange {
            field: path.to_string(),
            operation,
            old_value: old.cloned(),
            new_value: new.cloned(),
            path,
            timestamp: self.timestamp,
            user: self.user.to_string(),
            reason: self.reason.map(str::to_string),
        });
    }
}

/// Replay `changes` on a copy of `base`
pub fn apply_changes(base: &ConfigValue, changes: &[ConfigurationChange]) -> Result<ConfigValue> {
    let mut doc = base.clone();
    for change in changes {
        match change.operation {
            ChangeOperation::Add | ChangeOperation::Update => {
                let value = change.new_value.clone().ok_or_else(|| {
                    ConfigError::invalid_input(format!(
                        "{} change at '{}' has no new value",
                        change.operation, change.field
                    ))
                })?;
                doc.set_path(&change.path, value)?;
            }
            ChangeOperation::Delete => {
                if change.path.is_root() {
                    doc = ConfigValue::Null;
                } else {
                    doc.remove_path(&change.path);
                }
            }
        }
    }
    Ok(doc)
}

/// Count of changes per operation: `(added, updated, deleted)`
pub fn summarize(changes: &[ConfigurationChange]) -> (usize, usize, usize) {
    changes.iter().fold((0, 0, 0), |(a, u, d), c| match c.operation {
        ChangeOperation::Add => (a + 1, u, d),
        ChangeOperation::Update => (a, u + 1, d),
        ChangeOperation::Delete => (a, u, d + 1),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub(crate) fn arb_value() -> impl Strategy<Value = ConfigValue> {
        let leaf = prop_oneof![
            Just(ConfigValue::Null),
            any::<bool>().prop_map(ConfigValue::Boolean),
            (-1_000i64..1_000).prop_map(ConfigValue::Integer),
            (-1.0e6..1.0e6f64).prop_map(ConfigValue::Float),
            "[a-z]{0,6}".prop_map(ConfigValue::String),
        ];
        leaf.prop_recursive(3, 48, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(ConfigValue::Array),
                prop::collection::btree_map("[a-d]{1,2}", inner, 0..4).prop_map(ConfigValue::Object),
            ]
        })
    }

    pub(crate) fn arb_document() -> impl Strategy<Value = ConfigValue> {
        prop::collection::btree_map("[a-d]{1,2}", arb_value(), 0..5).prop_map(ConfigValue::Object)
    }

    fn doc(v: serde_json::Value) -> ConfigValue {
        ConfigValue::from(v)
    }

    #[test]
    fn test_diff_operations_in_key_order() {
        let a = doc(json!({"api": {"port": 8080, "host": "a"}, "old": true, "tags": [1, 2]}));
        let b = doc(json!({"api": {"port": 9090, "host": "a"}, "new": {"x": 1}, "tags": [1, 2, 3]}));

        let changes = diff(&a, &b);
        let summary: Vec<(String, ChangeOperation)> =
            changes.iter().map(|c| (c.field.clone(), c.operation)).collect();
        assert_eq!(
            summary,
            vec![
                ("api.port".to_string(), ChangeOperation::Update),
                ("new".to_string(), ChangeOperation::Add),
                ("old".to_string(), ChangeOperation::Delete),
                ("tags".to_string(), ChangeOperation::Update),
            ]
        );
        // added subtree is carried whole
        assert_eq!(changes[1].new_value, Some(doc(json!({"x": 1}))));
        assert_eq!(summarize(&changes), (1, 2, 1));
    }

    #[test]
    fn test_type_change_is_update() {
        let a = doc(json!({"cors": {"enabled": true}}));
        let b = doc(json!({"cors": "off"}));
        let changes = diff(&a, &b);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, ChangeOperation::Update);
        assert_eq!(changes[0].field, "cors");
    }

    #[test]
    fn test_diff_as_records_actor() {
        let a = doc(json!({"a": 1}));
        let b = doc(json!({"a": 2}));
        let changes = diff_as(&a, &b, "alice", Some("tuning"));
        assert_eq!(changes[0].user, "alice");
        assert_eq!(changes[0].reason.as_deref(), Some("tuning"));
        assert_eq!(changes[0].to_string(), "~ a: 1 -> 2");
    }

    #[test]
    fn test_apply_rejects_missing_new_value() {
        let mut changes = diff(&doc(json!({})), &doc(json!({"a": 1})));
        changes[0].new_value = None;
        assert!(apply_changes(&doc(json!({})), &changes).is_err());
    }

    proptest! {
        #[test]
        fn prop_diff_self_is_empty(a in arb_document()) {
            prop_assert!(diff(&a, &a).is_empty());
        }

        #[test]
        fn prop_apply_diff_reproduces_target(a in arb_document(), b in arb_document()) {
            let changes = diff(&a, &b);
            let rebuilt = apply_changes(&a, &changes).unwrap();
            prop_assert_eq!(rebuilt, b);
        }
    }
}
