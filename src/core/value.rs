//! Metadata values.
//!
//! Leaf metadata is an open key/value map. Values are a closed tagged union
//! rather than raw JSON so callers get a typed view, while the serialized
//! form stays plain JSON (`untagged`).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub type MetaMap = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<MetaValue>),
    Map(MetaMap),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }
}

impl From<JsonValue> for MetaValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => MetaValue::Null,
            JsonValue::Bool(b) => MetaValue::Bool(b),
            JsonValue::Number(n) => MetaValue::Number(n),
            JsonValue::String(s) => MetaValue::String(s),
            JsonValue::Array(items) => MetaValue::List(items.into_iter().map(MetaValue::from).collect()),
            JsonValue::Object(map) => {
                MetaValue::Map(map.into_iter().map(|(k, v)| (k, MetaValue::from(v))).collect())
            }
        }
    }
}

impl From<MetaValue> for JsonValue {
    fn from(value: MetaValue) -> Self {
        match value {
            MetaValue::Null => JsonValue::Null,
            MetaValue::Bool(b) => JsonValue::Bool(b),
            MetaValue::Number(n) => JsonValue::Number(n),
            MetaValue::String(s) => JsonValue::String(s),
            MetaValue::List(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            MetaValue::Map(map) => {
                JsonValue::Object(map.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect())
            }
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Number(value.into())
    }
}

/// Shallow merge: keys from `patch` overwrite, all other keys survive.
pub fn merge_shallow(base: &mut MetaMap, patch: &MetaMap) {
    for (k, v) in patch {
        base.insert(k.clone(), v.clone());
    }
}

/// Convert a JSON object into a metadata map; anything else is rejected.
pub fn meta_from_json(value: JsonValue) -> Result<MetaMap, String> {
    match MetaValue::from(value) {
        MetaValue::Map(map) => Ok(map),
        MetaValue::Null => Ok(MetaMap::new()),
        _ => Err("metadata must be an object".to_string()),
    }
}
