//! Record normalization
//!
//! Rewrites a raw record tree against its resolved schema version: keys
//! in the schema's recorded field order, absent optional fields made
//! explicit as null, and unambiguous scalar coercions. Coercion failures
//! attach non-fatal warnings instead of rejecting the record.
//! Transformation is pure and idempotent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::SchemaNode;
use crate::version::SchemaVersion;

/// Non-fatal, per-record coercion warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionWarning {
    /// Path to the offending value (e.g. "$.age")
    pub path: String,
    /// Type the schema demanded
    pub expected: String,
    /// Type (or value) actually observed
    pub observed: String,
}

/// A normalized record tagged with its schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Id of the schema version this record was normalized under
    pub schema_version_id: u64,
    /// Ingestion sequence number, assigned once and never recomputed
    pub seq: u64,
    /// The normalized tree
    pub fields: Value,
    /// Coercion warnings attached during normalization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CoercionWarning>,
}

/// Normalize one raw record under its resolved schema version
pub fn transform(raw: &Value, version: &SchemaVersion, seq: u64) -> NormalizedRecord {
    let mut warnings = Vec::new();
    let fields = normalize("$", raw, &version.root, &mut warnings);
    NormalizedRecord {
        schema_version_id: version.id,
        seq,
        fields,
        warnings,
    }
}

fn normalize(
    path: &str,
    value: &Value,
    node: &SchemaNode,
    warnings: &mut Vec<CoercionWarning>,
) -> Value {
    match node {
        SchemaNode::Object { fields } => {
            let Value::Object(map) = value else {
                warn(warnings, path, "object", value);
                return value.clone();
            };
            let mut out = serde_json::Map::with_capacity(fields.len());
            for (name, field) in fields {
                let child = field_path(path, name);
                match map.get(name) {
                    // An absent field and an explicit null are the same
                    // normalized state, so re-normalizing output that had
                    // its nulls filled in changes nothing. A null hole in
                    // a required field is flagged unless the field's node
                    // admits null itself.
                    Some(Value::Null) | None => {
                        if field.required && !admits_null(&field.node) {
                            warn(warnings, &child, field.node.kind_name(), &Value::Null);
                        }
                        out.insert(name.clone(), Value::Null);
                    }
                    Some(v) => {
                        out.insert(name.clone(), normalize(&child, v, &field.node, warnings));
                    }
                }
            }
            // Keys outside the schema are carried, not dropped, and
            // flagged. They only appear when a caller normalizes against
            // a stale version.
            for (name, v) in map {
                if !out.contains_key(name) {
                    warn(warnings, &field_path(path, name), "absent", v);
                    out.insert(name.clone(), v.clone());
                }
            }
            Value::Object(out)
        }
        SchemaNode::Array { elem } => {
            let Value::Array(items) = value else {
                warn(warnings, path, "array", value);
                return value.clone();
            };
            let child = format!("{}[]", path);
            Value::Array(
                items
                    .iter()
                    .map(|v| normalize(&child, v, elem, warnings))
                    .collect(),
            )
        }
        // Scalars under a union pass through uncoerced: coercion into a
        // union is never unambiguous. Objects and arrays still take their
        // key order from the matching union member.
        SchemaNode::Union { members } => {
            let member = match value {
                Value::Object(_) => members
                    .iter()
                    .find(|m| matches!(m, SchemaNode::Object { .. })),
                Value::Array(_) => members
                    .iter()
                    .find(|m| matches!(m, SchemaNode::Array { .. })),
                _ => None,
            };
            match member {
                Some(m) => normalize(path, value, m, warnings),
                None => value.clone(),
            }
        }
        SchemaNode::Unknown => value.clone(),
        scalar => coerce_scalar(path, value, scalar, warnings),
    }
}

/// Whether a node accepts null without coercion, so a null hole needs no
/// warning.
fn admits_null(node: &SchemaNode) -> bool {
    match node {
        SchemaNode::Null | SchemaNode::Unknown => true,
        SchemaNode::Union { members } => members.iter().any(|m| matches!(m, SchemaNode::Null)),
        _ => false,
    }
}

/// Apply an unambiguous scalar coercion, or warn and keep the value.
fn coerce_scalar(
    path: &str,
    value: &Value,
    node: &SchemaNode,
    warnings: &mut Vec<CoercionWarning>,
) -> Value {
    match (node, value) {
        (SchemaNode::Null, Value::Null)
        | (SchemaNode::Bool, Value::Bool(_))
        | (SchemaNode::Number, Value::Number(_))
        | (SchemaNode::String, Value::String(_)) => value.clone(),

        (SchemaNode::Number, Value::String(s)) => match parse_number(s) {
            Some(n) => Value::Number(n),
            None => {
                warn(warnings, path, "number", value);
                value.clone()
            }
        },
        (SchemaNode::String, Value::Number(n)) => Value::String(n.to_string()),
        (SchemaNode::String, Value::Bool(b)) => Value::String(b.to_string()),
        (SchemaNode::Bool, Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                warn(warnings, path, "bool", value);
                value.clone()
            }
        },

        (expected, observed) => {
            warn(warnings, path, expected.kind_name(), observed);
            observed.clone()
        }
    }
}

fn parse_number(s: &str) -> Option<serde_json::Number> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Number(n)) => Some(n),
        _ => None,
    }
}

fn warn(warnings: &mut Vec<CoercionWarning>, path: &str, expected: &str, observed: &Value) {
    let observed = match observed {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    };
    warnings.push(CoercionWarning {
        path: path.to_string(),
        expected: expected.to_string(),
        observed,
    });
}

fn field_path(path: &str, name: &str) -> String {
    if path == "$" {
        format!("$.{}", name)
    } else {
        format!("{}.{}", path, name)
    }
}
