//! Semantic property types, enum definitions, and file location types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::schema::ConfigClass;
use crate::tree::NodeRef;
use crate::value::Value;

/// Computes a property's type from the candidate value and the tree root.
pub type TypeFn = Arc<dyn Fn(&Value, NodeRef<'_>) -> PropertyType + Send + Sync>;

/// The closed set of semantic types the coercion engine understands.
#[derive(Clone)]
pub enum PropertyType {
    String,
    Float,
    Integer,
    UnsignedInt,
    PositiveFloat,
    Ratio,
    Boolean,
    Date,
    /// Element type lives in the descriptor's `array_type`.
    Array,
    Enum(Arc<EnumType>),
    Node(Arc<ConfigClass>),
    /// Resolved per write from the candidate value and the tree root.
    Dynamic(TypeFn),
}

impl PropertyType {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Value, NodeRef<'_>) -> PropertyType + Send + Sync + 'static,
    {
        PropertyType::Dynamic(Arc::new(f))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Float => "float",
            PropertyType::Integer => "integer",
            PropertyType::UnsignedInt => "unsignedInt",
            PropertyType::PositiveFloat => "positiveFloat",
            PropertyType::Ratio => "ratio",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::Array => "array",
            PropertyType::Enum(_) => "enum",
            PropertyType::Node(_) => "config",
            PropertyType::Dynamic(_) => "dynamic",
        }
    }

    /// Best-effort type inference from a declared initializer.
    pub(crate) fn infer(value: &Value) -> Option<PropertyType> {
        match value {
            Value::Bool(_) => Some(PropertyType::Boolean),
            Value::Integer(_) => Some(PropertyType::Integer),
            Value::Float(_) => Some(PropertyType::Float),
            Value::String(_) => Some(PropertyType::String),
            Value::Date(_) => Some(PropertyType::Date),
            Value::Array(_) => Some(PropertyType::Array),
            _ => None,
        }
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Enum(e) => write!(f, "Enum({})", e.name()),
            PropertyType::Node(class) => write!(f, "Node({})", class.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Canonical value of an enum member.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumValue {
    Int(i64),
    Str(String),
}

impl EnumValue {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            EnumValue::Int(i) => Value::Integer(*i),
            EnumValue::Str(s) => Value::String(s.clone()),
        }
    }

    pub(crate) fn from_value(value: &Value) -> Option<EnumValue> {
        match value {
            Value::Integer(i) => Some(EnumValue::Int(*i)),
            Value::String(s) => Some(EnumValue::Str(s.clone())),
            _ => None,
        }
    }
}

/// A named, ordered set of enum members.
#[derive(Debug, Clone)]
pub struct EnumType {
    name: String,
    members: Vec<(String, EnumValue)>,
}

impl EnumType {
    pub fn new<K: Into<String>>(
        name: &str,
        members: impl IntoIterator<Item = (K, EnumValue)>,
    ) -> Self {
        Self {
            name: name.to_string(),
            members: members.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Members numbered from zero in declaration order.
    pub fn numeric(name: &str, keys: &[&str]) -> Self {
        Self::new(
            name,
            keys.iter()
                .zip(0i64..)
                .map(|(key, i)| (key.to_string(), EnumValue::Int(i))),
        )
    }

    /// Members whose canonical value is a string.
    pub fn strings(name: &str, members: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            members
                .iter()
                .map(|(key, value)| (key.to_string(), EnumValue::Str(value.to_string()))),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(k, _)| k.as_str())
    }

    pub fn value_of(&self, key: &str) -> Option<&EnumValue> {
        self.members.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Reverse lookup: the first member key carrying `value`.
    pub fn key_of(&self, value: &EnumValue) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| v == value)
            .map(|(k, _)| k.as_str())
    }

    /// True when every member value reverse-looks-up to its own key.
    pub fn is_enum_like(&self) -> bool {
        !self.members.is_empty()
            && self
                .members
                .iter()
                .all(|(key, value)| self.key_of(value) == Some(key.as_str()))
    }

    /// Map a candidate (member key or member value) to its canonical value.
    pub(crate) fn resolve(&self, candidate: &Value) -> Option<EnumValue> {
        let has = |v: &EnumValue| self.members.iter().any(|(_, m)| m == v);
        match candidate {
            Value::String(s) => {
                if let Some(value) = self.value_of(s) {
                    return Some(value.clone());
                }
                let as_str = EnumValue::Str(s.clone());
                if has(&as_str) {
                    return Some(as_str);
                }
                let as_int = EnumValue::Int(s.trim().parse().ok()?);
                has(&as_int).then_some(as_int)
            }
            Value::Integer(i) => {
                let as_int = EnumValue::Int(*i);
                has(&as_int).then_some(as_int)
            }
            Value::Float(f) if f.fract() == 0.0 => {
                let as_int = EnumValue::Int(*f as i64);
                has(&as_int).then_some(as_int)
            }
            _ => None,
        }
    }
}

/// Where to look for the config file.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPath {
    /// Platform config directory (XDG on Linux, ~/Library/Application Support on macOS).
    Platform,
    /// A subdirectory under the user's home directory, e.g. `Home(".myapp")`.
    Home(&'static str),
    /// Current working directory.
    Cwd,
    /// An explicit directory.
    Path(PathBuf),
}

/// On-disk representation of a config file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> EnumType {
        EnumType::numeric("Color", &["Red", "Green", "Blue"])
    }

    #[test]
    fn numeric_enum_is_enum_like() {
        assert!(color().is_enum_like());
    }

    #[test]
    fn duplicate_values_are_not_enum_like() {
        let e = EnumType::new(
            "Dup",
            [("A", EnumValue::Int(1)), ("B", EnumValue::Int(1))],
        );
        assert!(!e.is_enum_like());
    }

    #[test]
    fn resolve_by_key_and_value() {
        let e = color();
        assert_eq!(e.resolve(&Value::from("Green")), Some(EnumValue::Int(1)));
        assert_eq!(e.resolve(&Value::Integer(2)), Some(EnumValue::Int(2)));
        assert_eq!(e.resolve(&Value::from("2")), Some(EnumValue::Int(2)));
        assert_eq!(e.resolve(&Value::from("Purple")), None);
        assert_eq!(e.resolve(&Value::Integer(7)), None);
    }

    #[test]
    fn string_enum_resolves_value() {
        let e = EnumType::strings("Level", &[("Debug", "debug"), ("Info", "info")]);
        assert_eq!(
            e.resolve(&Value::from("info")),
            Some(EnumValue::Str("info".into()))
        );
        assert_eq!(
            e.resolve(&Value::from("Debug")),
            Some(EnumValue::Str("debug".into()))
        );
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.toml")), FileFormat::Toml);
        assert_eq!(FileFormat::from_path(Path::new("a.json")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("noext")), FileFormat::Json);
    }

    #[test]
    fn type_names() {
        assert_eq!(PropertyType::UnsignedInt.name(), "unsignedInt");
        assert_eq!(PropertyType::Enum(Arc::new(color())).name(), "enum");
    }
}
