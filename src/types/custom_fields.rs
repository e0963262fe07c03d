//! Caller-supplied custom fields attached to events

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Maximum number of custom fields on one event
pub const MAX_CUSTOM_FIELDS_COUNT: usize = 50;
/// Maximum length of a custom field key
pub const MAX_CUSTOM_FIELDS_KEY_LENGTH: usize = 64;
/// Maximum length of a string custom field value
pub const MAX_CUSTOM_FIELDS_VALUE_STRING_LENGTH: usize = 256;

/// A single custom field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl CustomValue {
    /// JSON form, `None` for floats that JSON cannot carry
    pub fn to_json(&self) -> Option<Value> {
        match self {
            CustomValue::Bool(b) => Some(Value::Bool(*b)),
            CustomValue::Int(i) => Some(Value::from(*i)),
            CustomValue::Float(f) => Number::from_f64(*f).map(Value::Number),
            CustomValue::Str(s) => Some(Value::String(s.clone())),
        }
    }

    /// Parse a JSON scalar; arrays, objects and null are unsupported
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(CustomValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(CustomValue::Int)
                .or_else(|| n.as_f64().map(CustomValue::Float)),
            Value::String(s) => Some(CustomValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for CustomValue {
    fn from(v: i64) -> Self {
        CustomValue::Int(v)
    }
}

impl From<i32> for CustomValue {
    fn from(v: i32) -> Self {
        CustomValue::Int(v as i64)
    }
}

impl From<f64> for CustomValue {
    fn from(v: f64) -> Self {
        CustomValue::Float(v)
    }
}

impl From<bool> for CustomValue {
    fn from(v: bool) -> Self {
        CustomValue::Bool(v)
    }
}

impl From<String> for CustomValue {
    fn from(v: String) -> Self {
        CustomValue::Str(v)
    }
}

impl From<&str> for CustomValue {
    fn from(v: &str) -> Self {
        CustomValue::Str(v.to_string())
    }
}

/// Ordered set of custom fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFields {
    fields: BTreeMap<String, CustomValue>,
}

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<CustomValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<CustomValue>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&CustomValue> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<CustomValue> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CustomValue)> {
        self.fields.iter()
    }

    /// Overlay `other` on top of `self`; keys in `other` win
    pub fn merge(&mut self, other: &CustomFields) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
            .collect()
    }

    /// Build from a JSON object, skipping unsupported values
    pub fn from_json(value: &Value) -> Self {
        let mut out = Self::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                if let Some(v) = CustomValue::from_json(value) {
                    out.fields.insert(key.clone(), v);
                }
            }
        }
        out
    }
}

impl FromIterator<(String, CustomValue)> for CustomFields {
    fn from_iter<T: IntoIterator<Item = (String, CustomValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_prefers_event_fields() {
        let mut global = CustomFields::new().with("tier", "gold").with("level", 3);
        let event = CustomFields::new().with("level", 7).with("boosted", true);

        global.merge(&event);

        assert_eq!(global.len(), 3);
        assert_eq!(global.get("level"), Some(&CustomValue::Int(7)));
        assert_eq!(global.get("tier"), Some(&CustomValue::Str("gold".into())));
    }

    #[test]
    fn test_from_json_skips_unsupported_values() {
        let fields = CustomFields::from_json(&json!({
            "a": 1,
            "b": 1.5,
            "c": "x",
            "d": false,
            "e": [1, 2],
            "f": null
        }));

        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get("a"), Some(&CustomValue::Int(1)));
        assert_eq!(fields.get("b"), Some(&CustomValue::Float(1.5)));
    }

    #[test]
    fn test_to_json_drops_non_finite_floats() {
        let fields = CustomFields::new().with("ok", 2.0).with("bad", f64::INFINITY);
        let json = fields.to_json();

        assert!(json.contains_key("ok"));
        assert!(!json.contains_key("bad"));
    }
}
