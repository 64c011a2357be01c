//! Schema node type lattice
//!
//! A [`SchemaNode`] is the structural type of a semi-structured value.
//! Nodes are ordered by [`SchemaNode::join`], the least-upper-bound
//! operation: the joined node accepts every value either input accepts.
//! Inference and joining are order-independent, so a batch of records can
//! be folded in any order and produce the same schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Structural type of a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    /// Unconstrained placeholder; identity of `join`. Arises from empty
    /// arrays, where the element type is not yet observed.
    Unknown,
    Null,
    Bool,
    Number,
    String,
    Array { elem: Box<SchemaNode> },
    /// Field order is insertion order of first occurrence across all
    /// records that built this node.
    Object { fields: IndexMap<String, FieldSchema> },
    /// Flattened: members never contain a nested `Union`, hold at most one
    /// member per constructor class, and are kept in canonical order so
    /// structural equality is set equality.
    Union { members: Vec<SchemaNode> },
}

/// Schema of a single object field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub node: SchemaNode,
    pub required: bool,
}

impl FieldSchema {
    pub fn required(node: SchemaNode) -> Self {
        Self {
            node,
            required: true,
        }
    }

    pub fn optional(node: SchemaNode) -> Self {
        Self {
            node,
            required: false,
        }
    }
}

impl SchemaNode {
    /// Infer the minimal schema of one record tree
    pub fn infer(value: &Value) -> SchemaNode {
        match value {
            Value::Null => SchemaNode::Null,
            Value::Bool(_) => SchemaNode::Bool,
            Value::Number(_) => SchemaNode::Number,
            Value::String(_) => SchemaNode::String,
            Value::Array(items) => SchemaNode::Array {
                elem: Box::new(
                    items
                        .iter()
                        .map(SchemaNode::infer)
                        .fold(SchemaNode::Unknown, SchemaNode::join),
                ),
            },
            Value::Object(map) => SchemaNode::Object {
                fields: map
                    .iter()
                    .map(|(name, v)| {
                        (name.clone(), FieldSchema::required(SchemaNode::infer(v)))
                    })
                    .collect(),
            },
        }
    }

    /// Lattice join: the most specific node accepting every value either
    /// input accepts. Commutative, associative, idempotent.
    pub fn join(a: SchemaNode, b: SchemaNode) -> SchemaNode {
        use SchemaNode::*;
        match (a, b) {
            (Unknown, other) | (other, Unknown) => other,
            (a, b) if a == b => a,
            (Array { elem: ea }, Array { elem: eb }) => Array {
                elem: Box::new(SchemaNode::join(*ea, *eb)),
            },
            (Object { fields: fa }, Object { fields: fb }) => Object {
                fields: join_fields(fa, fb),
            },
            (Union { members: ma }, Union { members: mb }) => {
                let mut members = ma;
                for m in mb {
                    members = union_insert(members, m);
                }
                canonical_union(members)
            }
            (Union { members }, other) | (other, Union { members }) => {
                canonical_union(union_insert(members, other))
            }
            (a, b) => canonical_union(union_insert(vec![a], b)),
        }
    }

    /// Whether `self` already accepts everything `other` accepts, i.e.
    /// joining `other` in would change nothing.
    pub fn covers(&self, other: &SchemaNode) -> bool {
        SchemaNode::join(self.clone(), other.clone()) == *self
    }

    /// Structural acceptance check
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (SchemaNode::Null, Value::Null) => true,
            (SchemaNode::Bool, Value::Bool(_)) => true,
            (SchemaNode::Number, Value::Number(_)) => true,
            (SchemaNode::String, Value::String(_)) => true,
            (SchemaNode::Array { elem }, Value::Array(items)) => {
                items.iter().all(|v| elem.accepts(v))
            }
            (SchemaNode::Object { fields }, Value::Object(map)) => {
                fields.iter().all(|(name, f)| match map.get(name) {
                    Some(v) => f.node.accepts(v),
                    None => !f.required,
                }) && map.keys().all(|k| fields.contains_key(k))
            }
            (SchemaNode::Union { members }, v) => members.iter().any(|m| m.accepts(v)),
            _ => false,
        }
    }

    /// Short name of this node's constructor, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            SchemaNode::Unknown => "unknown",
            SchemaNode::Null => "null",
            SchemaNode::Bool => "bool",
            SchemaNode::Number => "number",
            SchemaNode::String => "string",
            SchemaNode::Array { .. } => "array",
            SchemaNode::Object { .. } => "object",
            SchemaNode::Union { .. } => "union",
        }
    }

    /// Rank used for canonical union member ordering. Unions hold at most
    /// one member per class, so the rank is a total order within a union.
    fn class_rank(&self) -> u8 {
        match self {
            SchemaNode::Unknown => 0,
            SchemaNode::Null => 1,
            SchemaNode::Bool => 2,
            SchemaNode::Number => 3,
            SchemaNode::String => 4,
            SchemaNode::Array { .. } => 5,
            SchemaNode::Object { .. } => 6,
            SchemaNode::Union { .. } => 7,
        }
    }
}

/// Key-union of two field maps. Keys present in both keep
/// `required = a && b` and join their types; keys present in one side
/// become optional. Output order: `a`'s keys, then `b`'s new keys.
fn join_fields(
    a: IndexMap<String, FieldSchema>,
    mut b: IndexMap<String, FieldSchema>,
) -> IndexMap<String, FieldSchema> {
    let mut out = IndexMap::with_capacity(a.len() + b.len());
    for (name, fa) in a {
        let merged = match b.shift_remove(&name) {
            Some(fb) => FieldSchema {
                node: SchemaNode::join(fa.node, fb.node),
                required: fa.required && fb.required,
            },
            None => FieldSchema::optional(fa.node),
        };
        out.insert(name, merged);
    }
    for (name, fb) in b {
        out.insert(name, FieldSchema::optional(fb.node));
    }
    out
}

/// Insert a non-union node into a member list, joining with an existing
/// member of the same constructor class rather than accumulating
/// incomparable members. This keeps `join` associative.
fn union_insert(mut members: Vec<SchemaNode>, node: SchemaNode) -> Vec<SchemaNode> {
    if matches!(node, SchemaNode::Unknown) {
        return members;
    }
    debug_assert!(!matches!(node, SchemaNode::Union { .. }));
    if let Some(pos) = members
        .iter()
        .position(|m| m.class_rank() == node.class_rank())
    {
        let existing = members.swap_remove(pos);
        members.push(SchemaNode::join(existing, node));
    } else {
        members.push(node);
    }
    members
}

/// Restore union invariants: canonical member order, single members
/// unwrapped, empty member lists collapsed to `Unknown`.
fn canonical_union(mut members: Vec<SchemaNode>) -> SchemaNode {
    members.sort_by_key(|m| m.class_rank());
    match members.len() {
        0 => SchemaNode::Unknown,
        1 => members.into_iter().next().expect("len checked"),
        _ => SchemaNode::Union { members },
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaNode::Unknown => write!(f, "unknown"),
            SchemaNode::Null => write!(f, "null"),
            SchemaNode::Bool => write!(f, "bool"),
            SchemaNode::Number => write!(f, "number"),
            SchemaNode::String => write!(f, "string"),
            SchemaNode::Array { elem } => write!(f, "array({})", elem),
            SchemaNode::Object { fields } => {
                write!(f, "object{{")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let marker = if field.required { "" } else { "?" };
                    write!(f, "{}{}: {}", name, marker, field.node)?;
                }
                write!(f, "}}")
            }
            SchemaNode::Union { members } => {
                write!(f, "union(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(v: Value) -> SchemaNode {
        SchemaNode::infer(&v)
    }

    #[test]
    fn test_scalar_inference() {
        assert_eq!(infer(json!(null)), SchemaNode::Null);
        assert_eq!(infer(json!(true)), SchemaNode::Bool);
        assert_eq!(infer(json!(42)), SchemaNode::Number);
        assert_eq!(infer(json!(1.5)), SchemaNode::Number);
        assert_eq!(infer(json!("x")), SchemaNode::String);
    }

    #[test]
    fn test_object_inference_preserves_order_and_required() {
        let node = infer(json!({"b": 1, "a": "x"}));
        match node {
            SchemaNode::Object { fields } => {
                let names: Vec<_> = fields.keys().cloned().collect();
                assert_eq!(names, vec!["b", "a"]);
                assert!(fields.values().all(|f| f.required));
            }
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_empty_array_is_unconstrained() {
        assert_eq!(
            infer(json!([])),
            SchemaNode::Array {
                elem: Box::new(SchemaNode::Unknown)
            }
        );
    }

    #[test]
    fn test_mixed_array_joins_to_union() {
        // [1, 2, "x"] infers array(union(number | string))
        let node = infer(json!([1, 2, "x"]));
        assert_eq!(
            node,
            SchemaNode::Array {
                elem: Box::new(SchemaNode::Union {
                    members: vec![SchemaNode::Number, SchemaNode::String]
                })
            }
        );
    }

    #[test]
    fn test_join_identical_is_identity() {
        let a = infer(json!({"a": 1, "b": [true]}));
        assert_eq!(SchemaNode::join(a.clone(), a.clone()), a);
    }

    #[test]
    fn test_join_objects_marks_one_sided_keys_optional() {
        let a = infer(json!({"a": 1}));
        let b = infer(json!({"a": 2, "b": "x"}));
        let joined = SchemaNode::join(a, b);
        match joined {
            SchemaNode::Object { fields } => {
                assert!(fields["a"].required);
                assert_eq!(fields["a"].node, SchemaNode::Number);
                assert!(!fields["b"].required);
                assert_eq!(fields["b"].node, SchemaNode::String);
            }
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_join_is_commutative_on_objects() {
        let a = infer(json!({"a": 1, "c": null}));
        let b = infer(json!({"b": "x", "a": 2.5}));
        assert_eq!(
            SchemaNode::join(a.clone(), b.clone()),
            SchemaNode::join(b, a)
        );
    }

    #[test]
    fn test_union_never_nests() {
        let ab = SchemaNode::join(SchemaNode::Number, SchemaNode::String);
        let abc = SchemaNode::join(ab, SchemaNode::Bool);
        match &abc {
            SchemaNode::Union { members } => {
                assert_eq!(members.len(), 3);
                assert!(!members
                    .iter()
                    .any(|m| matches!(m, SchemaNode::Union { .. })));
            }
            other => panic!("expected union, got {}", other),
        }
        // Joining the same members again changes nothing
        assert_eq!(
            SchemaNode::join(abc.clone(), SchemaNode::String),
            abc.clone()
        );
        assert_eq!(SchemaNode::join(abc.clone(), abc.clone()), abc);
    }

    #[test]
    fn test_union_merges_objects_per_class() {
        let a = SchemaNode::join(infer(json!({"a": 1})), SchemaNode::Number);
        let b = infer(json!({"b": "x"}));
        let joined = SchemaNode::join(a, b);
        match joined {
            SchemaNode::Union { members } => {
                assert_eq!(members.len(), 2);
                let object = members
                    .iter()
                    .find(|m| matches!(m, SchemaNode::Object { .. }))
                    .expect("object member");
                match object {
                    SchemaNode::Object { fields } => {
                        assert!(!fields["a"].required);
                        assert!(!fields["b"].required);
                    }
                    _ => unreachable!(),
                }
            }
            other => panic!("expected union, got {}", other),
        }
    }

    #[test]
    fn test_join_never_loses_information() {
        let values = [json!({"a": 1}), json!({"a": "x", "b": [1, null]})];
        let a = infer(values[0].clone());
        let b = infer(values[1].clone());
        let joined = SchemaNode::join(a, b);
        for v in &values {
            assert!(joined.accepts(v), "join must accept {}", v);
        }
    }

    #[test]
    fn test_covers() {
        let wide = SchemaNode::join(SchemaNode::Number, SchemaNode::String);
        assert!(wide.covers(&SchemaNode::Number));
        assert!(!SchemaNode::Number.covers(&wide));
    }

    #[test]
    fn test_accepts_optional_fields() {
        let schema = SchemaNode::join(infer(json!({"a": 1})), infer(json!({"a": 2, "b": "x"})));
        assert!(schema.accepts(&json!({"a": 3})));
        assert!(schema.accepts(&json!({"a": 3, "b": "y"})));
        assert!(!schema.accepts(&json!({"b": "y"})));
        assert!(!schema.accepts(&json!({"a": 3, "c": true})));
    }
}
