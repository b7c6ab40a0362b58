//! Merging an incoming document into the current one
//!
//! Conflicts (leaves present on both sides with different values) are
//! detected before anything is merged. Each conflict gets a resolution from
//! the [`MergePolicy`]: `overwrite` takes the incoming value, `skip` keeps
//! the current one, and `manual` keeps the current one and is reported as
//! unresolved.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::{diff, ConfigurationChange};
use crate::error::Result;
use crate::value::{ConfigValue, FieldPath, PathPattern};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "mapping")]
pub enum MergeStrategy {
    /// Incoming document replaces the current one wholesale
    Replace,
    /// Only keys missing from the current document are added
    Preserve,
    /// Deep merge; conflicts resolved by policy
    Merge,
    /// Copy only the mapped fields, `incoming source path -> current destination path`
    Selective(BTreeMap<String, String>),
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Replace => write!(f, "replace"),
            MergeStrategy::Preserve => write!(f, "preserve"),
            MergeStrategy::Merge => write!(f, "merge"),
            MergeStrategy::Selective(_) => write!(f, "selective"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Overwrite,
    Skip,
    Manual,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::Overwrite => write!(f, "overwrite"),
            ConflictResolution::Skip => write!(f, "skip"),
            ConflictResolution::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationConflict {
    pub path: String,
    pub current_value: ConfigValue,
    pub incoming_value: ConfigValue,
    pub resolution: ConflictResolution,
}

/// Default resolution plus per-path overrides
///
/// Override keys are path patterns (`*` matches one segment). An override
/// on an ancestor applies to every leaf below it; the most specific match
/// wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    pub default: ConflictResolution,
    pub overrides: BTreeMap<String, ConflictResolution>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            default: ConflictResolution::Overwrite,
            overrides: BTreeMap::new(),
        }
    }
}

impl MergePolicy {
    pub fn new(default: ConflictResolution) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, pattern: impl Into<String>, resolution: ConflictResolution) -> Self {
        self.overrides.insert(pattern.into(), resolution);
        self
    }

    pub fn resolution_for(&self, path: &FieldPath) -> ConflictResolution {
        let patterns: Vec<(PathPattern, ConflictResolution)> = self
            .overrides
            .iter()
            .map(|(p, r)| (PathPattern::parse(p), *r))
            .collect();

        let mut candidate = Some(path.clone());
        while let Some(current) = candidate {
            if let Some((_, resolution)) = patterns.iter().find(|(p, _)| p.matches(&current)) {
                return *resolution;
            }
            candidate = current.parent().filter(|p| !p.is_root());
        }
        self.default
    }
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub merged: ConfigValue,
    pub conflicts: Vec<ConfigurationConflict>,
    /// `diff(current, merged)`
    pub changes: Vec<ConfigurationChange>,
}

impl MergeOutcome {
    /// Conflicts left for a human to settle
    pub fn unresolved(&self) -> impl Iterator<Item = &ConfigurationConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.resolution == ConflictResolution::Manual)
    }

    pub fn has_unresolved(&self) -> bool {
        self.unresolved().next().is_some()
    }
}

/// Every leaf present in both documents with different values
pub fn detect_conflicts(
    current: &ConfigValue,
    incoming: &ConfigValue,
    policy: &MergePolicy,
) -> Vec<ConfigurationConflict> {
    fn walk(
        current: &ConfigValue,
        incoming: &ConfigValue,
        path: &mut Vec<String>,
        policy: &MergePolicy,
        out: &mut Vec<ConfigurationConflict>,
    ) {
        match (current, incoming) {
            (ConfigValue::Object(cur), ConfigValue::Object(inc)) => {
                for (key, inc_child) in inc {
                    if let Some(cur_child) = cur.get(key) {
                        path.push(key.clone());
                        walk(cur_child, inc_child, path, policy, out);
                        path.pop();
                    }
                }
            }
            _ if current != incoming => {
                let field = FieldPath::from_segments(path.clone());
                out.push(ConfigurationConflict {
                    path: field.to_string(),
                    current_value: current.clone(),
                    incoming_value: incoming.clone(),
                    resolution: policy.resolution_for(&field),
                });
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(current, incoming, &mut Vec::new(), policy, &mut out);
    out
}

/// Merge `incoming` into `current` with `strategy`
pub fn merge(
    current: &ConfigValue,
    incoming: &ConfigValue,
    strategy: &MergeStrategy,
    policy: &MergePolicy,
) -> Result<MergeOutcome> {
    let (merged, conflicts) = match strategy {
        MergeStrategy::Replace => {
            let conflicts = forced(detect_conflicts(current, incoming, policy), ConflictResolution::Overwrite);
            (incoming.clone(), conflicts)
        }
        MergeStrategy::Preserve => {
            let conflicts = forced(detect_conflicts(current, incoming, policy), ConflictResolution::Skip);
            (deep_merge(current, incoming, &BTreeMap::new(), &mut Vec::new(), false), conflicts)
        }
        MergeStrategy::Merge => {
            let conflicts = detect_conflicts(current, incoming, policy);
            let resolutions: BTreeMap<String, ConflictResolution> =
                conflicts.iter().map(|c| (c.path.clone(), c.resolution)).collect();
            (deep_merge(current, incoming, &resolutions, &mut Vec::new(), true), conflicts)
        }
        MergeStrategy::Selective(mapping) => selective(current, incoming, mapping, policy)?,
    };

    let changes = diff(current, &merged);
    debug!(
        strategy = %strategy,
        conflicts = conflicts.len(),
        changes = changes.len(),
        "Merge complete"
    );
    Ok(MergeOutcome {
        merged,
        conflicts,
        changes,
    })
}

fn forced(mut conflicts: Vec<ConfigurationConflict>, resolution: ConflictResolution) -> Vec<ConfigurationConflict> {
    for conflict in &mut conflicts {
        conflict.resolution = resolution;
    }
    conflicts
}

/// Recursive merge; at a conflicting leaf the incoming value wins only when
/// `overwrite` is set and the resolution allows it
fn deep_merge(
    current: &ConfigValue,
    incoming: &ConfigValue,
    resolutions: &BTreeMap<String, ConflictResolution>,
    path: &mut Vec<String>,
    overwrite: bool,
) -> ConfigValue {
    match (current, incoming) {
        (ConfigValue::Object(cur), ConfigValue::Object(inc)) => {
            let mut out = cur.clone();
            for (key, inc_child) in inc {
                let merged = match cur.get(key) {
                    Some(cur_child) => {
                        path.push(key.clone());
                        let merged = deep_merge(cur_child, inc_child, resolutions, path, overwrite);
                        path.pop();
                        merged
                    }
                    None => inc_child.clone(),
                };
                out.insert(key.clone(), merged);
            }
            ConfigValue::Object(out)
        }
        _ if current == incoming => current.clone(),
        _ => {
            let key = FieldPath::from_segments(path.clone()).to_string();
            let take_incoming = overwrite
                && resolutions
                    .get(&key)
                    .map(|r| *r == ConflictResolution::Overwrite)
                    .unwrap_or(true);
            if take_incoming {
                incoming.clone()
            } else {
                current.clone()
            }
        }
    }
}

fn selective(
    current: &ConfigValue,
    incoming: &ConfigValue,
    mapping: &BTreeMap<String, String>,
    policy: &MergePolicy,
) -> Result<(ConfigValue, Vec<ConfigurationConflict>)> {
    let mut merged = current.clone();
    let mut conflicts = Vec::new();

    for (source, destination) in mapping {
        let Some(value) = incoming.get(source) else {
            debug!(source = %source, "Selective merge source missing; skipped");
            continue;
        };
        let dest_path = FieldPath::parse(destination);
        let resolution = policy.resolution_for(&dest_path);

        if let Some(existing) = current.get_path(&dest_path) {
            if existing != value {
                conflicts.push(ConfigurationConflict {
                    path: destination.clone(),
                    current_value: existing.clone(),
                    incoming_value: value.clone(),
                    resolution,
                });
                if resolution != ConflictResolution::Overwrite {
                    continue;
                }
            }
        }
        merged.set_path(&dest_path, value.clone())?;
    }
    Ok((merged, conflicts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::tests::arb_document;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> ConfigValue {
        ConfigValue::from(v)
    }

    fn current() -> ConfigValue {
        doc(json!({
            "api": {"host": "0.0.0.0", "port": 8080},
            "features": {"caching": {"enabled": true}},
            "keep": 1
        }))
    }

    fn incoming() -> ConfigValue {
        doc(json!({
            "api": {"port": 9090, "timeout": 5000},
            "features": {"caching": {"enabled": false}}
        }))
    }

    #[test]
    fn test_merge_overwrites_by_default() {
        let outcome = merge(&current(), &incoming(), &MergeStrategy::Merge, &MergePolicy::default()).unwrap();
        assert_eq!(outcome.merged.get("api.port"), Some(&ConfigValue::Integer(9090)));
        assert_eq!(outcome.merged.get("api.host").and_then(|v| v.as_str()), Some("0.0.0.0"));
        assert_eq!(outcome.merged.get("api.timeout"), Some(&ConfigValue::Integer(5000)));
        assert_eq!(outcome.merged.get("keep"), Some(&ConfigValue::Integer(1)));

        let paths: Vec<&str> = outcome.conflicts.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["api.port", "features.caching.enabled"]);
        assert!(!outcome.has_unresolved());
        assert_eq!(outcome.changes.len(), 3);
    }

    #[test]
    fn test_manual_override_keeps_current() {
        let policy = MergePolicy::default().with_override("features", ConflictResolution::Manual);
        let outcome = merge(&current(), &incoming(), &MergeStrategy::Merge, &policy).unwrap();

        assert_eq!(
            outcome.merged.get("features.caching.enabled"),
            Some(&ConfigValue::Boolean(true))
        );
        assert_eq!(outcome.merged.get("api.port"), Some(&ConfigValue::Integer(9090)));
        let unresolved: Vec<&str> = outcome.unresolved().map(|c| c.path.as_str()).collect();
        assert_eq!(unresolved, vec!["features.caching.enabled"]);
    }

    #[test]
    fn test_skip_default_policy() {
        let outcome = merge(
            &current(),
            &incoming(),
            &MergeStrategy::Merge,
            &MergePolicy::new(ConflictResolution::Skip),
        )
        .unwrap();
        assert_eq!(outcome.merged.get("api.port"), Some(&ConfigValue::Integer(8080)));
        // additions still apply
        assert_eq!(outcome.merged.get("api.timeout"), Some(&ConfigValue::Integer(5000)));
    }

    #[test]
    fn test_replace_and_preserve() {
        let replaced = merge(&current(), &incoming(), &MergeStrategy::Replace, &MergePolicy::default()).unwrap();
        assert_eq!(replaced.merged, incoming());
        assert!(replaced
            .conflicts
            .iter()
            .all(|c| c.resolution == ConflictResolution::Overwrite));

        let preserved = merge(&current(), &incoming(), &MergeStrategy::Preserve, &MergePolicy::default()).unwrap();
        assert_eq!(preserved.merged.get("api.port"), Some(&ConfigValue::Integer(8080)));
        assert_eq!(preserved.merged.get("api.timeout"), Some(&ConfigValue::Integer(5000)));
        assert!(preserved.conflicts.iter().all(|c| c.resolution == ConflictResolution::Skip));
    }

    #[test]
    fn test_selective_mapping() {
        let mapping = BTreeMap::from([
            ("api.port".to_string(), "monitoring.metrics.port".to_string()),
            ("missing.field".to_string(), "api.host".to_string()),
        ]);
        let outcome = merge(
            &current(),
            &incoming(),
            &MergeStrategy::Selective(mapping),
            &MergePolicy::default(),
        )
        .unwrap();
        assert_eq!(
            outcome.merged.get("monitoring.metrics.port"),
            Some(&ConfigValue::Integer(9090))
        );
        assert_eq!(outcome.merged.get("api.port"), Some(&ConfigValue::Integer(8080)));
        assert_eq!(outcome.changes.len(), 1);
    }

    #[test]
    fn test_wildcard_override() {
        let policy = MergePolicy::default().with_override("services.*.host", ConflictResolution::Skip);
        assert_eq!(
            policy.resolution_for(&FieldPath::parse("services.llm.host")),
            ConflictResolution::Skip
        );
        assert_eq!(
            policy.resolution_for(&FieldPath::parse("services.llm.port")),
            ConflictResolution::Overwrite
        );
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&MergeStrategy::Merge).unwrap();
        assert_eq!(json, r#"{"type":"merge"}"#);
    }

    proptest! {
        #[test]
        fn prop_merge_with_self_is_identity(a in arb_document()) {
            let outcome = merge(&a, &a, &MergeStrategy::Merge, &MergePolicy::default()).unwrap();
            prop_assert!(outcome.conflicts.is_empty());
            prop_assert!(outcome.changes.is_empty());
            prop_assert_eq!(outcome.merged, a);
        }

        #[test]
        fn prop_merge_overwrite_contains_incoming_leaves(a in arb_document(), b in arb_document()) {
            let outcome = merge(&a, &b, &MergeStrategy::Merge, &MergePolicy::default()).unwrap();
            b.for_each_leaf(|path, value| {
                if path.is_root() {
                    return;
                }
                // an empty incoming object does not clear a populated current one
                if matches!(value, ConfigValue::Object(m) if m.is_empty()) {
                    return;
                }
                assert_eq!(outcome.merged.get_path(path), Some(value));
            });
        }
    }
}
