//! Schema registry and evolution tracking
//!
//! Maintains an append-only, ordered log of schema versions per schema
//! group and decides, for each batch-joined schema node, whether the
//! group's current version is reused, extended in place, or superseded by
//! a new version. The classify-then-commit read-modify-write is one
//! critical section per group; distinct groups proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EvolutionConfig;
use crate::error::{IngestError, Result};
use crate::node::SchemaNode;
use crate::version::{SchemaVersion, VersionSummary};

/// How a batch's schema was resolved against its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The current version already accepted the batch unchanged
    Reused,
    /// The current version's root was widened in place, id unchanged
    Extended,
    /// A new version was appended and became current
    Created,
}

/// Outcome of resolving one batch: the committed version snapshot and how
/// it was reached
#[derive(Debug, Clone)]
pub struct BatchDecision {
    pub version: SchemaVersion,
    pub outcome: Resolution,
}

/// A detected difference between the current root and an inferred node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub change_type: ChangeType,
    /// Path to the changed element (e.g. "a.b[]" for an array element)
    pub path: String,
    pub old: Option<String>,
    pub new: Option<String>,
    pub breaking: bool,
}

/// Kind of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A field appeared that the current root does not know
    FieldAdded,
    /// A required field is absent from the inferred node
    RequiredFieldAbsent,
    /// An optional field is absent from the inferred node
    OptionalFieldAbsent,
    /// An existing union gained members
    UnionWidened,
    /// A non-union type shifted to a different class
    TypeShifted,
}

/// Differences between a current root and an inferred node
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub changes: Vec<SchemaChange>,
}

impl SchemaDiff {
    pub fn is_breaking(&self) -> bool {
        self.changes.iter().any(|c| c.breaking)
    }

    pub fn first_breaking(&self) -> Option<&SchemaChange> {
        self.changes.iter().find(|c| c.breaking)
    }
}

/// Append-only version log for one schema group. The last entry is the
/// group's current version.
#[derive(Debug, Default)]
struct GroupLog {
    versions: Vec<SchemaVersion>,
}

/// The main schema registry
pub struct SchemaRegistry {
    /// Per-group logs; each group carries its own lock so ingestion for
    /// different groups never serializes
    groups: RwLock<HashMap<String, Arc<Mutex<GroupLog>>>>,
    /// Evolution policy
    config: EvolutionConfig,
}

impl SchemaRegistry {
    /// Create a registry with the given evolution policy
    pub fn new(config: EvolutionConfig) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Evolution policy in effect
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// All known group names, sorted
    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the schema version for a batch whose records joined to
    /// `inferred`. This is the single commit point for version state: the
    /// caller must have computed the whole batch's effect before calling.
    pub fn resolve_batch(
        &self,
        group: &str,
        inferred: SchemaNode,
        record_count: u64,
    ) -> Result<BatchDecision> {
        let log = self.group_handle(group);
        let mut log = log.lock();

        if log.versions.is_empty() {
            let mut version = SchemaVersion::new(1, inferred);
            version.record_count = record_count;
            info!(group, id = version.id, "created initial schema version");
            let snapshot = version.clone();
            log.versions.push(version);
            return Ok(BatchDecision {
                version: snapshot,
                outcome: Resolution::Created,
            });
        }

        let current = log.versions.last_mut().expect("group log is non-empty");
        let merged = SchemaNode::join(current.root.clone(), inferred.clone());
        if merged == current.root {
            current.record_count += record_count;
            debug!(group, id = current.id, "reused current schema version");
            return Ok(BatchDecision {
                version: current.clone(),
                outcome: Resolution::Reused,
            });
        }

        let diff = diff_nodes(&current.root, &inferred, &self.config);
        if !diff.is_breaking() {
            current.extend_root(merged);
            current.record_count += record_count;
            info!(
                group,
                id = current.id,
                changes = diff.changes.len(),
                "extended current schema version in place"
            );
            return Ok(BatchDecision {
                version: current.clone(),
                outcome: Resolution::Extended,
            });
        }

        if self.config.strict {
            let change = diff.first_breaking().expect("breaking diff has a change");
            return Err(IngestError::SchemaConflict {
                group: group.to_string(),
                version: current.id,
                field: change.path.clone(),
                expected: change.old.clone().unwrap_or_else(|| "absent".to_string()),
                observed: change.new.clone().unwrap_or_else(|| "absent".to_string()),
            });
        }

        // Incompatible change: the superseded version stays in the log
        // untouched and its records keep their version id. The new root is
        // the inferred node itself, never the merge with stale structure.
        let superseded = current.id;
        let mut version = SchemaVersion::new(superseded + 1, inferred);
        version.record_count = record_count;
        info!(
            group,
            id = version.id,
            superseded,
            "created new schema version"
        );
        let snapshot = version.clone();
        log.versions.push(version);
        Ok(BatchDecision {
            version: snapshot,
            outcome: Resolution::Created,
        })
    }

    /// Ordered summaries of all versions in a group
    pub fn list_versions(&self, group: &str) -> Result<Vec<VersionSummary>> {
        let log = self.existing_group(group)?;
        let log = log.lock();
        Ok(log.versions.iter().map(SchemaVersion::summary).collect())
    }

    /// Fetch one version of a group by id
    pub fn resolve_version(&self, group: &str, id: u64) -> Result<SchemaVersion> {
        let log = self.existing_group(group)?;
        let log = log.lock();
        log.versions
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| IngestError::VersionNotFound {
                group: group.to_string(),
                id,
            })
    }

    /// Current version of a group, if any
    pub fn current_version(&self, group: &str) -> Option<SchemaVersion> {
        let groups = self.groups.read();
        let log = groups.get(group)?;
        let log = log.lock();
        log.versions.last().cloned()
    }

    /// Seed a group from persisted history. Ids must be contiguous from 1
    /// and the group must not already hold versions.
    pub fn restore(&self, group: &str, versions: Vec<SchemaVersion>) -> Result<()> {
        for (i, version) in versions.iter().enumerate() {
            if version.id != i as u64 + 1 {
                return Err(IngestError::Restore {
                    group: group.to_string(),
                    detail: format!(
                        "non-contiguous version ids: expected {}, found {}",
                        i + 1,
                        version.id
                    ),
                });
            }
            if !version.verify_checksum() {
                return Err(IngestError::Restore {
                    group: group.to_string(),
                    detail: format!("checksum mismatch for version {}", version.id),
                });
            }
        }

        let log = self.group_handle(group);
        let mut log = log.lock();
        if !log.versions.is_empty() {
            return Err(IngestError::Restore {
                group: group.to_string(),
                detail: "group already holds versions".to_string(),
            });
        }
        info!(group, count = versions.len(), "restored schema group");
        log.versions = versions;
        Ok(())
    }

    fn group_handle(&self, group: &str) -> Arc<Mutex<GroupLog>> {
        if let Some(log) = self.groups.read().get(group) {
            return Arc::clone(log);
        }
        let mut groups = self.groups.write();
        Arc::clone(groups.entry(group.to_string()).or_default())
    }

    fn existing_group(&self, group: &str) -> Result<Arc<Mutex<GroupLog>>> {
        self.groups
            .read()
            .get(group)
            .cloned()
            .ok_or_else(|| IngestError::GroupNotFound {
                group: group.to_string(),
            })
    }
}

/// Compute the changes needed to take `old` to (the join with) `new`,
/// flagging the ones the evolution policy treats as breaking.
pub fn diff_nodes(old: &SchemaNode, new: &SchemaNode, config: &EvolutionConfig) -> SchemaDiff {
    let mut diff = SchemaDiff::default();
    diff_at("$", old, new, config, &mut diff.changes);
    diff
}

fn diff_at(
    path: &str,
    old: &SchemaNode,
    new: &SchemaNode,
    config: &EvolutionConfig,
    changes: &mut Vec<SchemaChange>,
) {
    if old == new || old.covers(new) {
        return;
    }

    match (old, new) {
        (SchemaNode::Unknown, _) => {
            // Placeholder becoming constrained is the expected lifecycle
        }
        (SchemaNode::Object { fields: of }, SchemaNode::Object { fields: nf }) => {
            for (name, old_field) in of {
                let child = field_path(path, name);
                match nf.get(name) {
                    Some(new_field) => {
                        diff_at(&child, &old_field.node, &new_field.node, config, changes)
                    }
                    None => changes.push(SchemaChange {
                        change_type: if old_field.required {
                            ChangeType::RequiredFieldAbsent
                        } else {
                            ChangeType::OptionalFieldAbsent
                        },
                        path: child,
                        old: Some(old_field.node.to_string()),
                        new: None,
                        breaking: old_field.required,
                    }),
                }
            }
            for (name, new_field) in nf {
                if !of.contains_key(name) {
                    changes.push(SchemaChange {
                        change_type: ChangeType::FieldAdded,
                        path: field_path(path, name),
                        old: None,
                        new: Some(new_field.node.to_string()),
                        breaking: false,
                    });
                }
            }
        }
        (SchemaNode::Array { elem: oe }, SchemaNode::Array { elem: ne }) => {
            diff_at(&format!("{}[]", path), oe, ne, config, changes);
        }
        (SchemaNode::Union { .. }, _) => {
            // Growing an existing union is always additive
            changes.push(SchemaChange {
                change_type: ChangeType::UnionWidened,
                path: path.to_string(),
                old: Some(old.to_string()),
                new: Some(new.to_string()),
                breaking: false,
            });
        }
        _ => {
            // A non-union type shifted class (e.g. number to string).
            // Under the strict-narrowing default this supersedes the
            // version; with union widening enabled it folds into a union.
            changes.push(SchemaChange {
                change_type: ChangeType::TypeShifted,
                path: path.to_string(),
                old: Some(old.to_string()),
                new: Some(new.to_string()),
                breaking: !config.union_widening,
            });
        }
    }
}

fn field_path(path: &str, name: &str) -> String {
    if path == "$" {
        format!("$.{}", name)
    } else {
        format!("{}.{}", path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(v: serde_json::Value) -> SchemaNode {
        SchemaNode::infer(&v)
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(EvolutionConfig::default())
    }

    #[test]
    fn test_first_batch_creates_version_one() {
        let registry = registry();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        assert_eq!(decision.version.id, 1);
        assert_eq!(decision.outcome, Resolution::Created);
        assert_eq!(decision.version.record_count, 1);
    }

    #[test]
    fn test_additive_change_extends_in_place() {
        // {"a":1} then {"a":1,"b":"x"} stays one version
        let registry = registry();
        registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": 1, "b": "x"})), 1)
            .unwrap();

        assert_eq!(decision.outcome, Resolution::Extended);
        assert_eq!(decision.version.id, 1);
        assert_eq!(decision.version.record_count, 2);
        match &decision.version.root {
            SchemaNode::Object { fields } => {
                assert!(fields["a"].required);
                assert_eq!(fields["a"].node, SchemaNode::Number);
                assert!(!fields["b"].required);
                assert_eq!(fields["b"].node, SchemaNode::String);
            }
            other => panic!("expected object root, got {}", other),
        }
        assert_eq!(registry.list_versions("users").unwrap().len(), 1);
    }

    #[test]
    fn test_identical_batch_reuses_version() {
        let registry = registry();
        registry
            .resolve_batch("users", infer(json!({"a": 1})), 3)
            .unwrap();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": 2})), 2)
            .unwrap();
        assert_eq!(decision.outcome, Resolution::Reused);
        assert_eq!(decision.version.record_count, 5);
    }

    #[test]
    fn test_type_shift_creates_new_version() {
        // {"a":1} then {"a":"str"} supersedes under the
        // strict-narrowing default; version 1 keeps its root untouched
        let registry = registry();
        registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": "str"})), 1)
            .unwrap();

        assert_eq!(decision.outcome, Resolution::Created);
        assert_eq!(decision.version.id, 2);
        assert_eq!(decision.version.root, infer(json!({"a": "str"})));

        let v1 = registry.resolve_version("users", 1).unwrap();
        assert_eq!(v1.root, infer(json!({"a": 1})));
        assert_eq!(v1.record_count, 1);
    }

    #[test]
    fn test_union_widening_extends_instead() {
        let config = EvolutionConfig {
            union_widening: true,
            ..EvolutionConfig::default()
        };
        let registry = SchemaRegistry::new(config);
        registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": "str"})), 1)
            .unwrap();

        assert_eq!(decision.outcome, Resolution::Extended);
        assert_eq!(decision.version.id, 1);
        match &decision.version.root {
            SchemaNode::Object { fields } => {
                assert_eq!(
                    fields["a"].node,
                    SchemaNode::Union {
                        members: vec![SchemaNode::Number, SchemaNode::String]
                    }
                );
            }
            other => panic!("expected object root, got {}", other),
        }
    }

    #[test]
    fn test_existing_union_grows_without_new_version() {
        let registry = registry();
        registry
            .resolve_batch("events", infer(json!({"a": [1, "x"]})), 1)
            .unwrap();
        let decision = registry
            .resolve_batch("events", infer(json!({"a": [true]})), 1)
            .unwrap();
        assert_eq!(decision.outcome, Resolution::Extended);
        assert_eq!(decision.version.id, 1);
    }

    #[test]
    fn test_required_field_loss_creates_new_version() {
        let registry = registry();
        registry
            .resolve_batch("users", infer(json!({"a": 1, "b": 2})), 1)
            .unwrap();
        let decision = registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        assert_eq!(decision.outcome, Resolution::Created);
        assert_eq!(decision.version.id, 2);
    }

    #[test]
    fn test_strict_mode_raises_conflict() {
        let config = EvolutionConfig {
            strict: true,
            ..EvolutionConfig::default()
        };
        let registry = SchemaRegistry::new(config);
        registry
            .resolve_batch("users", infer(json!({"a": 1})), 1)
            .unwrap();
        let err = registry
            .resolve_batch("users", infer(json!({"a": "str"})), 1)
            .unwrap_err();
        match err {
            IngestError::SchemaConflict {
                group,
                version,
                field,
                expected,
                observed,
            } => {
                assert_eq!(group, "users");
                assert_eq!(version, 1);
                assert_eq!(field, "$.a");
                assert_eq!(expected, "number");
                assert_eq!(observed, "string");
            }
            other => panic!("expected SchemaConflict, got {}", other),
        }
        // Nothing was mutated
        assert_eq!(registry.list_versions("users").unwrap().len(), 1);
    }

    #[test]
    fn test_version_ids_are_contiguous() {
        let registry = registry();
        registry.resolve_batch("g", infer(json!({"a": 1})), 1).unwrap();
        registry
            .resolve_batch("g", infer(json!({"a": "x"})), 1)
            .unwrap();
        registry
            .resolve_batch("g", infer(json!({"a": true})), 1)
            .unwrap();
        let ids: Vec<u64> = registry
            .list_versions("g")
            .unwrap()
            .iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_groups_are_independent() {
        let registry = registry();
        registry.resolve_batch("a", infer(json!({"x": 1})), 1).unwrap();
        registry
            .resolve_batch("b", infer(json!({"x": "s"})), 1)
            .unwrap();
        assert_eq!(registry.list_versions("a").unwrap().len(), 1);
        assert_eq!(registry.list_versions("b").unwrap().len(), 1);
        assert!(registry.list_versions("c").is_err());
    }

    #[test]
    fn test_concurrent_batches_never_duplicate_an_id() {
        let registry = Arc::new(registry());
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                // Alternate incompatible roots to force version churn
                let value = if i % 2 == 0 {
                    json!({"a": 1})
                } else {
                    json!({"a": "x"})
                };
                registry
                    .resolve_batch("hot", SchemaNode::infer(&value), 1)
                    .unwrap()
                    .version
                    .id
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let ids: Vec<u64> = registry
            .list_versions("hot")
            .unwrap()
            .iter()
            .map(|v| v.id)
            .collect();
        let expected: Vec<u64> = (1..=ids.len() as u64).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_restore_rejects_gaps() {
        let registry = registry();
        let v1 = SchemaVersion::new(1, infer(json!({"a": 1})));
        let v3 = SchemaVersion::new(3, infer(json!({"a": "x"})));
        let err = registry.restore("users", vec![v1, v3]).unwrap_err();
        assert!(matches!(err, IngestError::Restore { .. }));
    }

    #[test]
    fn test_restore_then_resolve_continues_lineage() {
        let registry = registry();
        let v1 = SchemaVersion::new(1, infer(json!({"a": 1})));
        let v2 = SchemaVersion::new(2, infer(json!({"a": "x"})));
        registry.restore("users", vec![v1, v2]).unwrap();

        let decision = registry
            .resolve_batch("users", infer(json!({"a": true})), 1)
            .unwrap();
        assert_eq!(decision.version.id, 3);
    }
}
