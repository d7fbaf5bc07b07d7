//! Typed property values.
//!
//! A [`Value`] is what a property descriptor stores after coercion, and also
//! what callers hand to the write path before coercion. Raw inputs arriving
//! from files, env vars, or the command line are converted from
//! `serde_json::Value` first; the type engine then narrows them to the
//! declared semantic type.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number};

use crate::tree::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    /// A plain object that has not (yet) been loaded into a config node.
    Object(Vec<(String, Value)>),
    /// A config node living in the owning tree's arena.
    Node(NodeId),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short label of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Node(_) => "config",
        }
    }

    /// Stringified form used by the type engine's dual string/number parse.
    pub(crate) fn plain_string(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => format_date(d),
            Value::Array(items) => items
                .iter()
                .map(Value::plain_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Node(_) => self.to_plain_json().to_string(),
        }
    }

    /// Render a value that does not reference the arena. Nodes become `null`;
    /// the projector renders them with access to the tree instead.
    pub(crate) fn to_plain_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Node(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_plain_json).collect())
            }
            Value::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_plain_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_shape() {
        assert_eq!(Value::from(json!(42)), Value::Integer(42));
        assert_eq!(Value::from(json!(1.5)), Value::Float(1.5));
    }

    #[test]
    fn json_object_keeps_key_order() {
        let value = Value::from(json!({"b": 1, "a": 2}));
        match value {
            Value::Object(entries) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("Expected Object, got {other:?}"),
        }
    }

    #[test]
    fn plain_string_joins_arrays() {
        let value = Value::from(vec![1i64, 2, 3]);
        assert_eq!(value.plain_string(), "1,2,3");
    }

    #[test]
    fn dates_render_with_millis() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            Value::Date(date).to_plain_json(),
            json!("2024-03-01T12:30:00.000Z")
        );
    }

    #[test]
    fn nan_renders_as_null() {
        assert_eq!(Value::Float(f64::NAN).to_plain_json(), json!(null));
    }
}
