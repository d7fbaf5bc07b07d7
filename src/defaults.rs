//! Defaults and state tracking.
//!
//! Each descriptor carries three values: the hard default captured at the
//! class's first instantiation, the current default (which a file's
//! `__defaults` block may override), and the current value. This module
//! exposes the defaults and state views and the operations that move
//! between them.

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::coerce::{self, TypeSpec};
use crate::error::ConfigError;
use crate::tree::{ConfigTree, NodeId};
use crate::value::Value;

impl ConfigTree {
    /// The current default of every property under `id`, recursing into
    /// nested nodes. Properties without a default are omitted.
    pub fn defaults(&self, id: NodeId) -> Map<String, Json> {
        let mut out = Map::new();
        for descriptor in self.descriptors(id) {
            if descriptor.is_config_type() || descriptor.is_config_array_type() {
                if let Some(value) = descriptor.value() {
                    out.insert(descriptor.name().to_string(), self.map_nodes(value, Self::defaults));
                }
                continue;
            }
            if let Some(default) = descriptor.default() {
                out.insert(descriptor.name().to_string(), default.to_plain_json());
            }
        }
        out
    }

    /// Per-property `{type, value, default, hardDefault}` under `id`. Nested
    /// nodes report their own state under `properties`.
    pub fn state(&self, id: NodeId) -> Map<String, Json> {
        let mut out = Map::new();
        for descriptor in self.descriptors(id) {
            let mut entry = Map::new();
            entry.insert("type".into(), Json::String(descriptor.type_name().into()));
            let nested = descriptor.is_config_type() || descriptor.is_config_array_type();
            match descriptor.value() {
                Some(value) if nested => {
                    entry.insert("properties".into(), self.map_nodes(value, Self::state));
                }
                Some(value) => {
                    entry.insert("value".into(), value.to_plain_json());
                }
                None => {}
            }
            if !nested {
                if let Some(default) = descriptor.default() {
                    entry.insert("default".into(), default.to_plain_json());
                }
                if let Some(hard) = descriptor.hard_default() {
                    entry.insert("hardDefault".into(), hard.to_plain_json());
                }
            }
            out.insert(descriptor.name().to_string(), Json::Object(entry));
        }
        out
    }

    fn map_nodes(&self, value: &Value, view: fn(&Self, NodeId) -> Map<String, Json>) -> Json {
        match value {
            Value::Node(child) => Json::Object(view(self, *child)),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.map_nodes(item, view))
                    .collect(),
            ),
            other => other.to_plain_json(),
        }
    }

    /// Override current defaults from a `__defaults` block.
    ///
    /// A value that still equals its previous default follows the new one
    /// through the write path; values that were changed stay put. Readonly
    /// properties only have their default updated.
    pub fn apply_defaults(&mut self, id: NodeId, block: &Map<String, Json>) -> Result<(), ConfigError> {
        for (key, raw) in block {
            let Some(index) = self.index_of(id, key) else {
                debug!(path = %self.path_of(id, key), "unknown default ignored");
                continue;
            };
            let descriptor = &self.nodes[id.0].props[index];
            if let (Json::Object(nested), Some(Value::Node(child))) = (raw, descriptor.value()) {
                let child = *child;
                self.apply_defaults(child, nested)?;
                continue;
            }

            let spec = TypeSpec::of(descriptor);
            let new_default = coerce::validate_type(self, id, key, Value::from(raw.clone()), &spec)?;
            let descriptor = &mut self.nodes[id.0].props[index];
            let previous = descriptor.default.replace(new_default.clone());
            let follows = descriptor.value == previous && !descriptor.readonly;
            if follows {
                self.set_and_validate_from_root(id, key, new_default)?;
            }
        }
        Ok(())
    }

    /// Apply a `__state` block: per property `readonly`, `volatile`,
    /// `default`, and nested `properties`.
    pub fn apply_state(&mut self, id: NodeId, block: &Map<String, Json>) -> Result<(), ConfigError> {
        for (key, entry) in block {
            let Json::Object(entry) = entry else {
                continue;
            };
            let Some(index) = self.index_of(id, key) else {
                debug!(path = %self.path_of(id, key), "unknown state entry ignored");
                continue;
            };
            if let Some(Json::Object(nested)) = entry.get("properties")
                && let Some(Value::Node(child)) = self.nodes[id.0].props[index].value()
            {
                let child = *child;
                self.apply_state(child, nested)?;
            }
            if let Some(default) = entry.get("default") {
                let spec = TypeSpec::of(&self.nodes[id.0].props[index]);
                let default = coerce::validate_type(self, id, key, Value::from(default.clone()), &spec)?;
                self.nodes[id.0].props[index].default = Some(default);
            }
            let descriptor = &mut self.nodes[id.0].props[index];
            if let Some(readonly) = entry.get("readonly").and_then(Json::as_bool) {
                descriptor.readonly = readonly;
            }
            if let Some(volatile) = entry.get("volatile").and_then(Json::as_bool) {
                descriptor.volatile = volatile;
            }
        }
        Ok(())
    }

    /// Restore the value at `path` to its current default. Resetting a node
    /// resets every property below it.
    pub fn reset(&mut self, path: &str) -> Result<(), ConfigError> {
        self.reset_with(path, false)
    }

    /// Restore both the default and the value at `path` to the hard default.
    pub fn reset_hard(&mut self, path: &str) -> Result<(), ConfigError> {
        self.reset_with(path, true)
    }

    fn reset_with(&mut self, path: &str, hard: bool) -> Result<(), ConfigError> {
        let (id, index) = self
            .resolve(path)
            .ok_or_else(|| ConfigError::UnknownProperty(path.to_string()))?;
        self.reset_property(id, index, hard)
    }

    fn reset_property(&mut self, id: NodeId, index: usize, hard: bool) -> Result<(), ConfigError> {
        let descriptor = &self.nodes[id.0].props[index];
        if let Some(Value::Node(child)) = descriptor.value() {
            let child = *child;
            for child_index in 0..self.descriptors(child).len() {
                self.reset_property(child, child_index, hard)?;
            }
            return Ok(());
        }
        let name = descriptor.name.clone();
        let target = if hard {
            descriptor.hard_default.clone()
        } else {
            descriptor.default.clone()
        };
        if hard {
            self.nodes[id.0].props[index].default = target.clone();
        }
        match target {
            Some(value) => self.set_and_validate_from_root(id, &name, value),
            None => {
                let path = self.path_of(id, &name);
                self.check_writable(id, index, &path)?;
                self.store(id, index, None);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fixtures::test::*;

    fn object(value: Json) -> Map<String, Json> {
        match value {
            Json::Object(map) => map,
            other => panic!("Expected object, got {other:?}"),
        }
    }

    #[test]
    fn defaults_view_recurses_into_nodes() {
        let tree = ConfigTree::new(&app_class()).unwrap();
        let defaults = tree.defaults(tree.root());
        assert_eq!(defaults["host"], json!("localhost"));
        assert_eq!(defaults["color"], json!(1));
        assert_eq!(defaults["database"], json!({"poolSize": 5}));
        assert!(!defaults.contains_key("token"));
    }

    #[test]
    fn state_view_reports_value_and_defaults() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set("port", 9000).unwrap();
        let state = tree.state(tree.root());
        assert_eq!(
            state["port"],
            json!({"type": "integer", "value": 9000, "default": 8080, "hardDefault": 8080})
        );
        assert_eq!(state["token"], json!({"type": "string"}));
        assert_eq!(
            state["database"]["properties"]["poolSize"]["value"],
            json!(5)
        );
    }

    #[test]
    fn value_follows_new_default_when_untouched() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let root = tree.root();
        tree.set("host", "example.org").unwrap();
        tree.apply_defaults(root, &object(json!({"host": "default.org", "port": "9090"})))
            .unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Integer(9090)));
        assert_eq!(tree.get("host"), Some(&Value::from("example.org")));
        let port = tree.descriptor("port").unwrap();
        assert_eq!(port.default(), Some(&Value::Integer(9090)));
        assert_eq!(port.hard_default(), Some(&Value::Integer(8080)));
    }

    #[test]
    fn defaults_recurse_into_nested_nodes() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let root = tree.root();
        tree.apply_defaults(root, &object(json!({"database": {"poolSize": 12}})))
            .unwrap();
        assert_eq!(tree.get("database.poolSize"), Some(&Value::Integer(12)));
    }

    #[test]
    fn invalid_default_is_a_format_error() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let root = tree.root();
        let err = tree
            .apply_defaults(root, &object(json!({"port": "eighty"})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Format { .. }));
    }

    #[test]
    fn state_block_sets_flags() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let root = tree.root();
        tree.apply_state(
            root,
            &object(json!({
                "host": {"readonly": true},
                "debug": {"volatile": true, "default": true},
                "database": {"properties": {"url": {"readonly": true}}}
            })),
        )
        .unwrap();
        assert!(tree.descriptor("host").unwrap().is_readonly());
        assert!(tree.descriptor("debug").unwrap().is_volatile());
        assert_eq!(tree.descriptor("debug").unwrap().default(), Some(&Value::Bool(true)));
        assert!(tree.descriptor("database.url").unwrap().is_readonly());
    }

    #[test]
    fn reset_restores_current_default() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set("port", 1234).unwrap();
        tree.set("database.poolSize", 9).unwrap();
        tree.reset("port").unwrap();
        tree.reset("database").unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Integer(8080)));
        assert_eq!(tree.get("database.poolSize"), Some(&Value::Integer(5)));
    }

    #[test]
    fn reset_hard_ignores_overridden_default() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let root = tree.root();
        tree.apply_defaults(root, &object(json!({"port": 9090}))).unwrap();
        tree.reset("port").unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Integer(9090)));
        tree.reset_hard("port").unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Integer(8080)));
        assert_eq!(
            tree.descriptor("port").unwrap().default(),
            Some(&Value::Integer(8080))
        );
    }

    #[test]
    fn reset_to_undefined_clears_value() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set("token", "secret").unwrap();
        tree.reset("token").unwrap();
        assert_eq!(tree.get("token"), None);
    }

    #[test]
    fn hard_defaults_come_from_first_instantiation() {
        let class = crate::schema::ConfigClass::builder("Counter")
            .property(
                "stamp",
                crate::schema::Property::integer().default_with({
                    let counter = std::sync::atomic::AtomicI64::new(0);
                    move || Value::Integer(counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
                }),
            )
            .build();
        let _first = ConfigTree::new(&class).unwrap();
        let second = ConfigTree::new(&class).unwrap();
        let stamp = second.descriptor("stamp").unwrap();
        assert_eq!(stamp.value(), Some(&Value::Integer(1)));
        assert_eq!(stamp.hard_default(), Some(&Value::Integer(0)));
    }
}
