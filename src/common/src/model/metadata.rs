//! Variant-valued metadata attached to a log entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String-keyed metadata map. Key order carries no meaning.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
///
/// JSON `null` has no representation here; metadata containing it is
/// rejected during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value.into())
    }
}

/// Walk a JSON metadata value and return the path of the first element that
/// cannot be represented as [`Metadata`].
///
/// `None` and a top-level `null` are both treated as an empty map.
pub(crate) fn find_unrepresentable(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => map
            .iter()
            .find_map(|(key, v)| find_null(v, format!("metadata.{key}"))),
        Some(other) => Some(format!(
            "metadata must be an object, got {}",
            json_type_name(other)
        )),
    }
}

fn find_null(value: &Value, path: String) -> Option<String> {
    match value {
        Value::Null => Some(format!("{path} is null")),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, v)| find_null(v, format!("{path}[{i}]"))),
        Value::Object(map) => map
            .iter()
            .find_map(|(key, v)| find_null(v, format!("{path}.{key}"))),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

/// Convert already-checked JSON metadata into the typed map.
pub(crate) fn into_metadata(value: Option<Value>) -> Metadata {
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(key, v)| convert(v).map(|v| (key, v)))
            .collect(),
        _ => Metadata::new(),
    }
}

fn convert(value: Value) -> Option<MetadataValue> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(b) => MetadataValue::Bool(b),
        Value::Number(n) => MetadataValue::Number(n),
        Value::String(s) => MetadataValue::String(s),
        Value::Array(items) => MetadataValue::List(items.into_iter().filter_map(convert).collect()),
        Value::Object(map) => MetadataValue::Map(
            map.into_iter()
                .filter_map(|(key, v)| convert(v).map(|v| (key, v)))
                .collect(),
        ),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
