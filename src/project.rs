//! Serialization projector.
//!
//! Renders a config tree to a plain `serde_json` object under a set of
//! independent [`ProjectOptions`]. Key order follows declaration order;
//! description comments are inserted as sibling `//[name]` keys right
//! before the value they describe.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::schema::PropertyDescriptor;
use crate::tree::{ConfigTree, NodeId};
use crate::types::EnumValue;
use crate::value::Value;

/// Which parts of the tree a projection renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOptions {
    /// Insert a `//[name]` description key before each described value.
    pub attach_description: bool,
    /// Add a root-level `__defaults` block.
    pub attach_defaults: bool,
    /// Add a root-level `__state` block with per-property metadata.
    pub attach_state: bool,
    /// Render enum values by member key instead of canonical value.
    pub enums_as_string: bool,
    pub skip_tags: Vec<String>,
    pub keep_tags: Vec<String>,
    pub include_volatile: bool,
}

impl ProjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_description(mut self, enabled: bool) -> Self {
        self.attach_description = enabled;
        self
    }

    pub fn attach_defaults(mut self, enabled: bool) -> Self {
        self.attach_defaults = enabled;
        self
    }

    pub fn attach_state(mut self, enabled: bool) -> Self {
        self.attach_state = enabled;
        self
    }

    pub fn enums_as_string(mut self, enabled: bool) -> Self {
        self.enums_as_string = enabled;
        self
    }

    pub fn skip_tag(mut self, tag: &str) -> Self {
        self.skip_tags.push(tag.to_string());
        self
    }

    pub fn keep_tag(mut self, tag: &str) -> Self {
        self.keep_tags.push(tag.to_string());
        self
    }

    pub fn include_volatile(mut self, enabled: bool) -> Self {
        self.include_volatile = enabled;
        self
    }

    fn skips(&self, descriptor: &PropertyDescriptor) -> bool {
        if descriptor.is_volatile() && !self.include_volatile {
            return true;
        }
        descriptor
            .tags()
            .iter()
            .any(|tag| self.skip_tags.contains(tag) && !self.keep_tags.contains(tag))
    }

    /// The same options with the root-only blocks cleared.
    fn nested(&self) -> Self {
        Self {
            attach_defaults: false,
            attach_state: false,
            ..self.clone()
        }
    }
}

impl ConfigTree {
    /// Project the whole tree.
    pub fn to_json(&self, options: &ProjectOptions) -> Json {
        Json::Object(self.project(self.root(), options))
    }

    /// Project one node. `__defaults` and `__state` are attached at this
    /// level only.
    pub fn project(&self, id: NodeId, options: &ProjectOptions) -> Map<String, Json> {
        let mut out = Map::new();
        if options.attach_defaults {
            out.insert("__defaults".into(), Json::Object(self.defaults(id)));
        }
        let nested = options.nested();
        for descriptor in self.descriptors(id) {
            let Some(value) = descriptor.value() else {
                continue;
            };
            if options.skips(descriptor) {
                continue;
            }
            if options.attach_description
                && let Some(description) = descriptor.description()
            {
                out.insert(
                    format!("//[{}]", descriptor.name()),
                    Json::String(description.to_string()),
                );
            }
            out.insert(
                descriptor.name().to_string(),
                self.project_value(descriptor, value, &nested),
            );
        }
        if options.attach_state {
            out.insert("__state".into(), Json::Object(self.state_block(id)));
        }
        out
    }

    fn project_value(&self, descriptor: &PropertyDescriptor, value: &Value, options: &ProjectOptions) -> Json {
        match value {
            Value::Node(child) => Json::Object(self.project(*child, options)),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.project_value(descriptor, item, options))
                    .collect(),
            ),
            _ if options.enums_as_string
                && (descriptor.is_enum_type() || descriptor.is_enum_array_type()) =>
            {
                descriptor
                    .enum_type()
                    .zip(EnumValue::from_value(value))
                    .and_then(|(enum_type, member)| enum_type.key_of(&member).map(str::to_string))
                    .map_or_else(|| value.to_plain_json(), Json::String)
            }
            _ => value.to_plain_json(),
        }
    }

    /// Per-property metadata without current values, recursing into nodes.
    pub fn state_block(&self, id: NodeId) -> Map<String, Json> {
        let mut out = Map::new();
        for descriptor in self.descriptors(id) {
            let mut entry = Map::new();
            entry.insert("type".into(), Json::String(descriptor.type_name().into()));
            if let Some(default) = descriptor.default().filter(|d| d.as_node().is_none()) {
                entry.insert("default".into(), default.to_plain_json());
            }
            if let Some(hard) = descriptor.hard_default() {
                entry.insert("hardDefault".into(), hard.to_plain_json());
            }
            entry.insert("readonly".into(), Json::Bool(descriptor.is_readonly()));
            entry.insert("volatile".into(), Json::Bool(descriptor.is_volatile()));
            if let Some(description) = descriptor.description() {
                entry.insert("description".into(), Json::String(description.into()));
            }
            if let Some(alias) = descriptor.env_alias() {
                entry.insert("envAlias".into(), Json::String(alias.into()));
            }
            if let Some(min) = descriptor.min() {
                entry.insert("min".into(), Value::Float(min).to_plain_json());
            }
            if let Some(max) = descriptor.max() {
                entry.insert("max".into(), Value::Float(max).to_plain_json());
            }
            if !descriptor.tags().is_empty() {
                entry.insert(
                    "tags".into(),
                    descriptor.tags().iter().map(|t| Json::String(t.clone())).collect(),
                );
            }
            if let Some(Value::Node(child)) = descriptor.value() {
                entry.insert("properties".into(), Json::Object(self.state_block(*child)));
            }
            out.insert(descriptor.name().to_string(), Json::Object(entry));
        }
        out
    }

    /// Plain rendering of the value at `path`; nodes render as objects.
    pub fn get_json(&self, path: &str) -> Option<Json> {
        let options = ProjectOptions::default();
        if let Some((id, index)) = self.resolve(path) {
            let descriptor = &self.descriptors(id)[index];
            return descriptor
                .value()
                .map(|value| self.project_value(descriptor, value, &options));
        }
        // Array elements are not properties of their own.
        match self.get(path)? {
            Value::Node(id) => Some(Json::Object(self.project(*id, &options))),
            other => Some(other.to_plain_json()),
        }
    }
}
