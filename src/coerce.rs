//! Type validation and coercion.
//!
//! [`validate_type`] narrows a raw candidate to a property's declared
//! semantic type. Numbers and strings are interchangeable on input: every
//! candidate is read both as text and as a number, so `"42"` and `42` are
//! equally valid integers. Range checks run on the parsed number before the
//! type's own format check, which keeps range and format failures distinct.
//!
//! Config-node candidates are the one branch with side effects: a plain
//! object is instantiated as a new node, wired under its owner at the
//! property's path, and loaded before it is returned.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::ConfigError;
use crate::schema::{ConfigClass, PropertyDescriptor};
use crate::tree::{ConfigTree, NodeId};
use crate::types::PropertyType;
use crate::value::Value;

/// The parts of a descriptor the type engine reads.
#[derive(Debug, Clone)]
pub(crate) struct TypeSpec {
    pub ty: Option<PropertyType>,
    pub array_type: Option<PropertyType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TypeSpec {
    pub fn of(descriptor: &PropertyDescriptor) -> Self {
        Self {
            ty: descriptor.ty.clone(),
            array_type: descriptor.array_type.clone(),
            min: descriptor.min,
            max: descriptor.max,
        }
    }
}

/// Coerce `candidate` for property `name` of node `owner`.
///
/// `Null` passes for every type. An untyped property passes anything
/// through unchanged.
pub(crate) fn validate_type(
    tree: &mut ConfigTree,
    owner: NodeId,
    name: &str,
    candidate: Value,
    spec: &TypeSpec,
) -> Result<Value, ConfigError> {
    if candidate.is_null() {
        return Ok(Value::Null);
    }
    let Some(ty) = &spec.ty else {
        return Ok(candidate);
    };
    let path = tree.path_of(owner, name);
    coerce_as(tree, owner, &path, ty, spec, candidate)
}

fn coerce_as(
    tree: &mut ConfigTree,
    owner: NodeId,
    path: &str,
    ty: &PropertyType,
    spec: &TypeSpec,
    candidate: Value,
) -> Result<Value, ConfigError> {
    match ty {
        PropertyType::Dynamic(type_fn) => {
            let resolved = type_fn(&candidate, tree.root_ref());
            if matches!(resolved, PropertyType::Dynamic(_)) {
                return Ok(candidate);
            }
            coerce_as(tree, owner, path, &resolved, spec, candidate)
        }
        PropertyType::String => Ok(Value::String(candidate.plain_string())),
        PropertyType::Float => {
            let n = numeric(&candidate);
            check_range(path, n, spec)?;
            Ok(Value::Float(n))
        }
        PropertyType::Integer | PropertyType::UnsignedInt => {
            let n = numeric(&candidate);
            check_range(path, n, spec)?;
            if n.is_nan() || n.fract() != 0.0 {
                return Err(format_error(path, "an integer", &candidate));
            }
            if matches!(ty, PropertyType::UnsignedInt) && n < 0.0 {
                return Err(format_error(path, "a non-negative integer", &candidate));
            }
            integer(&candidate, n)
                .map(Value::Integer)
                .ok_or_else(|| format_error(path, "an integer within the 64-bit range", &candidate))
        }
        PropertyType::PositiveFloat => {
            let n = numeric(&candidate);
            check_range(path, n, spec)?;
            if n.is_nan() || n < 0.0 {
                return Err(format_error(path, "a non-negative number", &candidate));
            }
            Ok(Value::Float(n))
        }
        PropertyType::Ratio => {
            let n = numeric(&candidate);
            check_range(path, n, spec)?;
            if !(0.0..=1.0).contains(&n) {
                return Err(format_error(path, "a ratio between 0 and 1", &candidate));
            }
            Ok(Value::Float(n))
        }
        PropertyType::Boolean => match &candidate {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(format_error(path, "true or false", &candidate)),
        },
        PropertyType::Date => parse_date(&candidate)
            .map(Value::Date)
            .ok_or_else(|| format_error(path, "a date", &candidate)),
        PropertyType::Array => {
            let items = match candidate {
                Value::Array(items) => items,
                other => return Err(format_error(path, "an array", &other)),
            };
            let Some(element) = &spec.array_type else {
                return Ok(Value::Array(items));
            };
            let element_spec = TypeSpec {
                ty: Some(element.clone()),
                array_type: None,
                min: spec.min,
                max: spec.max,
            };
            let mut coerced = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                if item.is_null() {
                    coerced.push(Value::Null);
                    continue;
                }
                let item_path = format!("{path}.{i}");
                coerced.push(coerce_as(tree, owner, &item_path, element, &element_spec, item)?);
            }
            Ok(Value::Array(coerced))
        }
        PropertyType::Enum(enum_type) => match enum_type.resolve(&candidate) {
            Some(value) => Ok(value.to_value()),
            None => Err(ConfigError::Format {
                path: path.to_string(),
                reason: format!(
                    "expected one of {}, got {}",
                    enum_type.keys().collect::<Vec<_>>().join(", "),
                    describe(&candidate)
                ),
            }),
        },
        PropertyType::Node(class) => match candidate {
            Value::Node(id) => {
                check_node(tree, owner, path, class, id)?;
                Ok(Value::Node(id))
            }
            Value::Object(entries) => {
                let child = tree.instantiate(class);
                let root = tree.nodes[owner.0].root;
                tree.set_parent_config(child, Some(owner), path.to_string(), root);
                let loaded = tree.load_entries(child, entries);
                // A half-built node is released like any other detached one.
                tree.mark_constructed(child);
                loaded?;
                Ok(Value::Node(child))
            }
            other => Err(format_error(path, "an object", &other)),
        },
    }
}

/// An existing node may only be stored where it belongs: a live node of this
/// tree, of the declared class, not the owner or one of its ancestors, and
/// not held by some other property.
fn check_node(
    tree: &ConfigTree,
    owner: NodeId,
    path: &str,
    class: &Arc<ConfigClass>,
    id: NodeId,
) -> Result<(), ConfigError> {
    let reject = |reason: String| {
        Err(ConfigError::Format {
            path: path.to_string(),
            reason,
        })
    };
    if !tree.is_live(id) {
        return reject(format!("node {} does not belong to this tree", id.0));
    }
    if !Arc::ptr_eq(tree.class_of(id), class) {
        return reject(format!(
            "expected a {} node, got a {} node",
            class.name(),
            tree.class_of(id).name()
        ));
    }
    let mut cursor = Some(owner);
    while let Some(ancestor) = cursor {
        if ancestor == id {
            return reject("a node cannot contain itself".to_string());
        }
        cursor = tree.parent_of(ancestor);
    }
    if let Some((holder, name)) = tree.holder_of(id) {
        let held_at = tree.path_of(holder, &name);
        let same_slot = holder == owner
            && (path == held_at || path.starts_with(&format!("{held_at}.")));
        if !same_slot {
            return reject(format!("node is already attached at '{}'", tree.prop_path(id)));
        }
    }
    Ok(())
}

/// Numeric reading of a candidate; `NaN` when it is not numeric-looking.
fn numeric(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Exact integer for an already-validated whole number, or `None` when it
/// does not fit in an `i64`.
fn integer(value: &Value, n: f64) -> Option<i64> {
    // 2^63, exactly representable.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    let whole = || (-BOUND..BOUND).contains(&n).then_some(n as i64);
    match value {
        Value::Integer(i) => Some(*i),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(whole),
        _ => whole(),
    }
}

fn check_range(path: &str, n: f64, spec: &TypeSpec) -> Result<(), ConfigError> {
    if let Some(min) = spec.min
        && n < min
    {
        return Err(ConfigError::Range {
            path: path.to_string(),
            reason: format!("{n} is below the minimum of {min}"),
        });
    }
    if let Some(max) = spec.max
        && n > max
    {
        return Err(ConfigError::Range {
            path: path.to_string(),
            reason: format!("{n} is above the maximum of {max}"),
        });
    }
    Ok(())
}

/// Dates accept `DateTime` values, epoch milliseconds, RFC 3339 strings,
/// naive ISO timestamps (read as UTC), and bare `YYYY-MM-DD` days.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Integer(ms) => Utc.timestamp_millis_opt(*ms).single(),
        Value::Float(ms) if ms.is_finite() => Utc.timestamp_millis_opt(*ms as i64).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Some(d.with_timezone(&Utc));
            }
            if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(d.and_utc());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
            }
            let ms = s.parse::<i64>().ok()?;
            Utc.timestamp_millis_opt(ms).single()
        }
        _ => None,
    }
}

fn format_error(path: &str, expected: &str, candidate: &Value) -> ConfigError {
    ConfigError::Format {
        path: path.to_string(),
        reason: format!("expected {expected}, got {}", describe(candidate)),
    }
}

fn describe(candidate: &Value) -> String {
    match candidate {
        Value::String(s) => format!("\"{s}\""),
        Value::Object(_) | Value::Node(_) | Value::Array(_) => candidate.kind().to_string(),
        other => other.plain_string(),
    }
}
