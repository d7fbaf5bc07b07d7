//! Merging helpers shared by the external sources.
//!
//! [`deep_merge`] layers plain objects. [`ConfigTree::leaves`] flattens the
//! schema into addressable leaves so env vars, CLI switches and query
//! parameters can all be resolved through one [`KeyIndex`].

use serde_json::{Map, Value as Json};

use crate::tree::{ConfigTree, NodeId};
use crate::value::Value;

/// Deep-merge `overlay` on top of `base`.
/// If both sides have an object for the same key, recurse.
/// Otherwise, `overlay`'s value wins. Keys keep their position in `base`;
/// keys new to `base` are appended in `overlay` order.
pub fn deep_merge(mut base: Map<String, Json>, overlay: Map<String, Json>) -> Map<String, Json> {
    for (key, overlay_val) in overlay {
        match (base.get_mut(&key), overlay_val) {
            (Some(Json::Object(base_obj)), Json::Object(overlay_obj)) => {
                let merged = deep_merge(std::mem::take(base_obj), overlay_obj);
                *base_obj = merged;
            }
            (Some(slot), overlay_val) => {
                *slot = overlay_val;
            }
            (None, overlay_val) => {
                base.insert(key, overlay_val);
            }
        }
    }
    base
}

/// One addressable leaf property of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Dotted path from the root, e.g. `database.poolSize`.
    pub path: String,
    /// The path joined with the external separator, e.g. `database-poolSize`.
    pub flat_key: String,
    pub env_alias: Option<String>,
    pub type_name: &'static str,
    pub default: Option<Json>,
    pub description: Option<String>,
    pub volatile: bool,
    pub is_array: bool,
    /// Member keys for enum-typed leaves.
    pub choices: Vec<String>,
}

impl ConfigTree {
    /// Every leaf property in declaration order, descending into nested
    /// nodes. Arrays of nodes are not addressable as leaves.
    pub fn leaves(&self, separator: &str) -> Vec<Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(self.root(), separator, &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, separator: &str, out: &mut Vec<Leaf>) {
        for descriptor in self.descriptors(id) {
            if descriptor.is_config_array_type() {
                continue;
            }
            if let Some(Value::Node(child)) = descriptor.value() {
                self.collect_leaves(*child, separator, out);
                continue;
            }
            if descriptor.is_config_type() {
                continue;
            }
            let path = self.path_of(id, descriptor.name());
            out.push(Leaf {
                flat_key: path.replace('.', separator),
                path,
                env_alias: descriptor.env_alias().map(str::to_string),
                type_name: descriptor.type_name(),
                default: descriptor.default().map(Value::to_plain_json),
                description: descriptor.description().map(str::to_string),
                volatile: descriptor.is_volatile(),
                is_array: descriptor.array_type().is_some()
                    || matches!(descriptor.default(), Some(Value::Array(_))),
                choices: descriptor
                    .enum_type()
                    .map(|e| e.keys().map(str::to_string).collect())
                    .unwrap_or_default(),
            });
        }
    }
}

/// Resolves external flat keys to leaves.
pub(crate) struct KeyIndex<'a> {
    leaves: &'a [Leaf],
    separator: &'a str,
}

impl<'a> KeyIndex<'a> {
    pub fn new(leaves: &'a [Leaf], separator: &'a str) -> Self {
        Self { leaves, separator }
    }

    pub fn lookup_exact(&self, key: &str) -> Option<&'a Leaf> {
        self.leaves.iter().find(|l| l.flat_key == key)
    }

    pub fn lookup_alias(&self, key: &str) -> Option<&'a Leaf> {
        self.leaves
            .iter()
            .find(|l| l.env_alias.as_deref() == Some(key))
    }

    /// Declaration position of the leaf at a dotted path.
    pub fn position(&self, path: &str) -> usize {
        self.leaves
            .iter()
            .position(|l| l.path == path)
            .unwrap_or(usize::MAX)
    }

    /// Exact flat key, then exact alias, then a case-insensitive match that
    /// also treats `_` as the separator (`DATABASE_POOLSIZE`).
    pub fn lookup(&self, key: &str) -> Option<&'a Leaf> {
        if let Some(leaf) = self.lookup_exact(key).or_else(|| self.lookup_alias(key)) {
            return Some(leaf);
        }
        let wanted = self.normalize(key);
        self.leaves.iter().find(|l| {
            self.normalize(&l.flat_key) == wanted
                || l.env_alias.as_deref().is_some_and(|a| self.normalize(a) == wanted)
        })
    }

    fn normalize(&self, key: &str) -> String {
        key.replace(self.separator, "_").to_lowercase()
    }
}

/// Turn a raw external string into a value for the type engine.
///
/// `true`/`false` in any case become booleans. Array leaves accept a JSON
/// array or a comma-separated list. Everything else stays a string and is
/// narrowed by the property's type.
pub(crate) fn raw_to_value(raw: &str, leaf: &Leaf) -> Value {
    if leaf.is_array {
        let trimmed = raw.trim();
        if trimmed.starts_with('[')
            && let Ok(json) = serde_json::from_str::<Json>(trimmed)
        {
            return Value::from(json);
        }
        if trimmed.is_empty() {
            return Value::Array(Vec::new());
        }
        return Value::Array(
            trimmed
                .split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        );
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(raw.to_string())
}
