use indexmap::IndexMap;
use serde_json::Value;

/// Attribute map attached to routes, nodes, and cost tables.
///
/// Insertion order is observable (serialization, deterministic tie-breaks),
/// so this is an `IndexMap` rather than a `HashMap`.
pub type AttrMap = IndexMap<String, Value>;

/// Numeric view of an attribute value. Non-numeric values yield `None` and
/// are ignored by the cost function; numeric strings are accepted because
/// clients routinely send them that way.
pub fn attr_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Merges `overrides` on top of `base`, overrides winning per key.
pub fn merge_attrs(base: &AttrMap, overrides: &AttrMap) -> AttrMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
