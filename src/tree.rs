//! Tree composition and cascading validation.
//!
//! A [`ConfigTree`] is an arena of config nodes addressed by [`NodeId`].
//! Each node owns a cloned descriptor list and knows its parent, its dotted
//! path from the root, and the root itself. Nested node values are stored as
//! `Value::Node(id)` handles, so the parent owns the child through its
//! descriptor while the child keeps only handles back up the tree.
//!
//! Every write goes through [`ConfigTree::set_and_validate_from_root`]:
//! coerce, store, run the property's hook, then re-validate the whole tree
//! from the root in batch mode. Constraints see the root, so a single write
//! is judged against every sibling and ancestor value.
//!
//! Nodes that a write leaves unreachable from the root go on a free list
//! once the outermost write returns, and new nodes take those slots first.

use std::sync::Arc;

use tracing::debug;

use crate::coerce::{self, TypeSpec};
use crate::error::ConfigError;
use crate::schema::{ConfigClass, Initializer, Property, PropertyDescriptor};
use crate::types::PropertyType;
use crate::value::Value;

/// Handle of a node inside a [`ConfigTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct NodeData {
    pub class: Arc<ConfigClass>,
    pub props: Vec<PropertyDescriptor>,
    pub prop_path: String,
    pub parent: Option<NodeId>,
    pub root: Option<NodeId>,
    pub constructed: bool,
}

/// A constraint that failed and had its fallback substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackApplied {
    pub path: String,
    pub reason: String,
}

/// A validated configuration tree.
#[derive(Debug)]
pub struct ConfigTree {
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) root: NodeId,
    pub(crate) composed: bool,
    pub(crate) fallbacks: Vec<FallbackApplied>,
    /// Detached slots that `instantiate` reuses.
    pub(crate) free: Vec<NodeId>,
    in_flight: usize,
}

/// Every live value plus the fallback log length, taken before a write.
struct Snapshot {
    values: Vec<(NodeId, Vec<Option<Value>>)>,
    fallbacks: usize,
}

/// Read-only view of one node, handed to constraints, type functions and
/// hooks. Before composition the view is empty: every lookup returns `None`.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a ConfigTree,
    id: Option<NodeId>,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    pub fn path(&self) -> &'a str {
        self.id.map_or("", |id| self.tree.prop_path(id))
    }

    /// Value at a dotted path relative to this node.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        self.tree.value_from(self.id?, path)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn get_str(&self, path: &str) -> Option<&'a str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// The nested node at `path`, or an empty view.
    pub fn node(&self, path: &str) -> NodeRef<'a> {
        NodeRef {
            tree: self.tree,
            id: self.get(path).and_then(Value::as_node),
        }
    }

    pub fn tree(&self) -> &'a ConfigTree {
        self.tree
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}

type Sink<'s> = Option<&'s mut Vec<ConfigError>>;

impl ConfigTree {
    /// Instantiate `class` with its defaults, compose the tree, and validate
    /// it, failing on the first violation.
    pub fn new(class: &Arc<ConfigClass>) -> Result<Self, ConfigError> {
        let mut tree = ConfigTree {
            nodes: Vec::new(),
            root: NodeId(0),
            composed: false,
            fallbacks: Vec::new(),
            free: Vec::new(),
            in_flight: 0,
        };
        let root = tree.instantiate(class);
        tree.root = root;
        tree.set_parent_config(root, None, String::new(), Some(root));
        tree.composed = true;
        for node in &mut tree.nodes {
            node.constructed = true;
        }
        tree.validate_all(None)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root as seen by constraints: empty until composition completes.
    pub fn root_ref(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.composed.then_some(self.root),
        }
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id: Some(id) }
    }

    pub fn class_of(&self, id: NodeId) -> &Arc<ConfigClass> {
        &self.nodes[id.0].class
    }

    /// Dotted path of a node from the root; empty for the root.
    pub fn prop_path(&self, id: NodeId) -> &str {
        &self.nodes[id.0].prop_path
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn descriptors(&self, id: NodeId) -> &[PropertyDescriptor] {
        &self.nodes[id.0].props
    }

    /// Every fallback substituted since the tree was created.
    pub fn fallbacks(&self) -> &[FallbackApplied] {
        &self.fallbacks
    }

    /// Value at a dotted path from the root. Array elements are addressed by
    /// index (`servers.0.host`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.value_from(self.root, path)
    }

    /// Node at a dotted path; the empty path is the root.
    pub fn node_at(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.root);
        }
        self.get(path).and_then(Value::as_node)
    }

    pub fn descriptor(&self, path: &str) -> Option<&PropertyDescriptor> {
        let (id, index) = self.resolve(path)?;
        Some(&self.nodes[id.0].props[index])
    }

    /// Write a value by dotted path through the validated write path.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let (id, index) = self
            .resolve(path)
            .ok_or_else(|| ConfigError::UnknownProperty(path.to_string()))?;
        let name = self.nodes[id.0].props[index].name.clone();
        self.set_and_validate_from_root(id, &name, value.into())
    }

    /// Mark a property readonly.
    pub fn lock(&mut self, path: &str) -> Result<(), ConfigError> {
        let (id, index) = self
            .resolve(path)
            .ok_or_else(|| ConfigError::UnknownProperty(path.to_string()))?;
        self.nodes[id.0].props[index].readonly = true;
        debug!(path, "property locked");
        Ok(())
    }

    /// The single mutation entry point.
    ///
    /// A no-op when `candidate` equals the stored value before or after
    /// coercion. Format and range errors abort before anything is stored.
    /// After storing, the whole tree is re-validated in batch mode; if any
    /// violation is collected the write is rolled back and all violations
    /// are returned as one [`ConfigError::Aggregate`], with every value the
    /// validation pass touched restored.
    ///
    /// Nodes the write detached are released once the outermost write
    /// returns; their ids are reused and must not be stored again.
    pub fn set_and_validate_from_root(
        &mut self,
        id: NodeId,
        name: &str,
        candidate: Value,
    ) -> Result<(), ConfigError> {
        self.in_flight += 1;
        let result = self.write(id, name, candidate, true);
        self.in_flight -= 1;
        if self.in_flight == 0 && self.composed {
            self.release_detached();
        }
        result
    }

    fn write(
        &mut self,
        id: NodeId,
        name: &str,
        candidate: Value,
        rollback: bool,
    ) -> Result<(), ConfigError> {
        let path = self.path_of(id, name);
        let index = self
            .index_of(id, name)
            .ok_or_else(|| ConfigError::UnknownProperty(path.clone()))?;
        let previous = self.nodes[id.0].props[index].value.clone();
        if previous.as_ref() == Some(&candidate) {
            return Ok(());
        }
        self.check_writable(id, index, &path)?;

        if self.nodes[id.0].props[index].is_config_type
            && let (Value::Object(entries), Some(Value::Node(child))) = (&candidate, &previous)
        {
            return self.load_entries(*child, entries.clone());
        }

        let spec = TypeSpec::of(&self.nodes[id.0].props[index]);
        let value = coerce::validate_type(self, id, name, candidate, &spec)?;
        if previous.as_ref() == Some(&value) {
            return Ok(());
        }
        let snapshot = (rollback && self.composed).then(|| self.snapshot(id));
        self.store(id, index, Some(value.clone()));
        if let Some(hook) = self.nodes[id.0].props[index].on_new_value.clone() {
            hook(&value, self.root_ref());
        }
        if !self.composed {
            return Ok(());
        }

        let mut violations = Vec::new();
        self.validate_all(Some(&mut violations))?;
        if violations.is_empty() {
            return Ok(());
        }
        if let Some(snapshot) = snapshot {
            self.restore(snapshot);
        }
        Err(ConfigError::Aggregate(violations))
    }

    /// `written` is included even when it is not attached yet.
    fn snapshot(&self, written: NodeId) -> Snapshot {
        let mut ids = self.reachable();
        if !ids.contains(&written) {
            ids.push(written);
        }
        let values = ids
            .into_iter()
            .map(|id| {
                let values = self.nodes[id.0].props.iter().map(|p| p.value.clone()).collect();
                (id, values)
            })
            .collect();
        Snapshot {
            values,
            fallbacks: self.fallbacks.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        for (id, values) in snapshot.values {
            for (descriptor, value) in self.nodes[id.0].props.iter_mut().zip(values) {
                descriptor.value = value;
            }
        }
        let root = self.root;
        self.set_parent_config(root, None, String::new(), Some(root));
        self.fallbacks.truncate(snapshot.fallbacks);
    }

    /// Nodes reachable from the root through values or defaults.
    fn reachable(&self) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        let mut order = Vec::new();
        while let Some(id) = stack.pop() {
            match seen.get_mut(id.0) {
                Some(flag) if !*flag => *flag = true,
                _ => continue,
            }
            order.push(id);
            for descriptor in &self.nodes[id.0].props {
                stack.extend(child_nodes(descriptor.value.as_ref()));
                stack.extend(child_nodes(descriptor.default.as_ref()));
            }
        }
        order
    }

    /// Put every unreachable, fully built node on the free list. Nodes still
    /// under construction are not constructed yet and stay put.
    fn release_detached(&mut self) {
        let mut live = vec![false; self.nodes.len()];
        for id in self.reachable() {
            live[id.0] = true;
        }
        let free: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&i| !live[i] && self.nodes[i].constructed)
            .map(NodeId)
            .collect();
        if free.len() > self.free.len() {
            debug!(released = free.len() - self.free.len(), "detached nodes released");
        }
        self.free = free;
    }

    /// Whether `id` names a node of this tree that has not been released.
    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len() && !self.free.contains(&id)
    }

    /// The node and property currently holding `id` as its value.
    pub(crate) fn holder_of(&self, id: NodeId) -> Option<(NodeId, String)> {
        let parent = self.nodes[id.0].parent?;
        self.nodes[parent.0]
            .props
            .iter()
            .find(|p| child_nodes(p.value.as_ref()).contains(&id))
            .map(|p| (parent, p.name.clone()))
    }

    pub(crate) fn check_writable(&self, id: NodeId, index: usize, path: &str) -> Result<(), ConfigError> {
        let node = &self.nodes[id.0];
        if node.props[index].readonly && node.constructed && !node.class.options().soft_readonly {
            return Err(ConfigError::Readonly {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Re-validate every property of every node against its current value.
    ///
    /// With `violations` supplied, every violation is appended and the walk
    /// continues; without it the first violation is returned. Failing
    /// constraints that declare a fallback get the fallback written through
    /// the regular write path instead of producing a violation.
    pub fn validate_all(&mut self, violations: Option<&mut Vec<ConfigError>>) -> Result<(), ConfigError> {
        let mut sink = violations;
        let root = self.root;
        self.validate_node(root, &mut sink)
    }

    fn validate_node(&mut self, id: NodeId, sink: &mut Sink<'_>) -> Result<(), ConfigError> {
        for index in 0..self.nodes[id.0].props.len() {
            let descriptor = &self.nodes[id.0].props[index];
            let Some(value) = descriptor.value.clone() else {
                continue;
            };
            let name = descriptor.name.clone();
            let spec = TypeSpec::of(descriptor);
            let constraint = descriptor.constraint.clone();

            if let Err(err) = coerce::validate_type(self, id, &name, value.clone(), &spec) {
                report(sink, err)?;
                continue;
            }

            if let Some(constraint) = constraint
                && !constraint.check(&value, self.root_ref())
            {
                let path = self.path_of(id, &name);
                let reason = constraint
                    .reason_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} was rejected", value.plain_string()));
                match constraint.fallback_value() {
                    Some(fallback) if *fallback != value => {
                        debug!(path = %path, reason = %reason, "constraint fallback applied");
                        self.fallbacks.push(FallbackApplied { path, reason });
                        if let Err(err) = self.write(id, &name, fallback.clone(), false) {
                            for violation in err.into_violations() {
                                report(sink, violation)?;
                            }
                        }
                    }
                    Some(_) => {}
                    None => report(sink, ConfigError::Constraint { path, reason })?,
                }
            }

            let current = self.nodes[id.0].props[index].value.as_ref();
            for child in child_nodes(current) {
                self.validate_node(child, sink)?;
            }
        }
        Ok(())
    }

    /// Assign `parent`, `path` and `root` to a node and recompute the paths
    /// of everything below it.
    pub(crate) fn set_parent_config(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        path: String,
        root: Option<NodeId>,
    ) {
        let node = &mut self.nodes[id.0];
        node.parent = parent;
        node.prop_path = path;
        node.root = root;
        let nested: Vec<(String, Value)> = node
            .props
            .iter()
            .filter_map(|p| match &p.value {
                Some(v @ (Value::Node(_) | Value::Array(_))) => Some((p.name.clone(), v.clone())),
                _ => None,
            })
            .collect();
        for (name, value) in nested {
            self.adopt(id, &name, &value);
        }
    }

    fn adopt(&mut self, owner: NodeId, name: &str, value: &Value) {
        let base = self.path_of(owner, name);
        let root = self.nodes[owner.0].root;
        match value {
            Value::Node(child) => self.set_parent_config(*child, Some(owner), base, root),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Node(child) = item {
                        self.set_parent_config(*child, Some(owner), format!("{base}.{i}"), root);
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) fn store(&mut self, id: NodeId, index: usize, value: Option<Value>) {
        let name = self.nodes[id.0].props[index].name.clone();
        self.nodes[id.0].props[index].value = value.clone();
        if let Some(value) = value {
            self.adopt(id, &name, &value);
        }
    }

    /// Allocate a node for `class`, children first, with initializers
    /// coerced by type only. Constraints are not consulted here.
    pub(crate) fn instantiate(&mut self, class: &Arc<ConfigClass>) -> NodeId {
        let data = NodeData {
            class: Arc::clone(class),
            props: class.properties().to_vec(),
            prop_path: String::new(),
            parent: None,
            root: None,
            constructed: false,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = data;
                id
            }
            None => {
                self.nodes.push(data);
                NodeId(self.nodes.len() - 1)
            }
        };

        let mut initial = Vec::with_capacity(class.properties().len());
        for index in 0..self.nodes[id.0].props.len() {
            let value = self.initial_value(id, index);
            if let Some(value) = &value {
                let name = self.nodes[id.0].props[index].name.clone();
                self.adopt(id, &name, value);
            }
            initial.push(value);
        }

        let hard = class
            .capture_hard_defaults(|| {
                initial
                    .iter()
                    .map(|v| v.clone().filter(|v| !contains_node(v)))
                    .collect()
            })
            .to_vec();
        for (index, value) in initial.into_iter().enumerate() {
            let descriptor = &mut self.nodes[id.0].props[index];
            descriptor.default = value.clone();
            descriptor.value = value;
            descriptor.hard_default = hard.get(index).cloned().flatten();
        }
        id
    }

    fn initial_value(&mut self, id: NodeId, index: usize) -> Option<Value> {
        let descriptor = &self.nodes[id.0].props[index];
        let name = descriptor.name.clone();
        let spec = TypeSpec::of(descriptor);
        let raw = match descriptor.initializer.clone()? {
            Initializer::Value(v) => v,
            Initializer::Factory(factory) => factory(),
            Initializer::DefaultNode => match &descriptor.ty {
                Some(PropertyType::Node(child_class)) => {
                    let child_class = Arc::clone(child_class);
                    return Some(Value::Node(self.instantiate(&child_class)));
                }
                _ => return None,
            },
        };
        match coerce::validate_type(self, id, &name, raw.clone(), &spec) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(property = %name, error = %err, "initializer kept uncoerced");
                Some(raw)
            }
        }
    }

    pub(crate) fn mark_constructed(&mut self, id: NodeId) {
        self.nodes[id.0].constructed = true;
        let children: Vec<NodeId> = self.nodes[id.0]
            .props
            .iter()
            .flat_map(|p| child_nodes(p.value.as_ref()))
            .collect();
        for child in children {
            self.mark_constructed(child);
        }
    }

    /// Load a plain object into a node, key by key, through the write path.
    ///
    /// Description keys (`//…`) and reserved keys (`__…`) are skipped. Keys
    /// the class does not declare become new properties on map-like classes
    /// and are ignored otherwise.
    pub(crate) fn load_entries(
        &mut self,
        id: NodeId,
        entries: Vec<(String, Value)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in entries {
            if key.starts_with("//") || key.starts_with("__") {
                continue;
            }
            if self.index_of(id, &key).is_none() {
                if self.nodes[id.0].class.entry_template().is_none() {
                    debug!(path = %self.path_of(id, &key), "unknown key ignored");
                    continue;
                }
                self.add_property(id, &key, Property::new())?;
            }
            self.set_and_validate_from_root(id, &key, value)?;
        }
        Ok(())
    }

    /// Add a property to a node at runtime, merging `options` over the
    /// class's dynamic-entry template when it has one.
    pub fn add_property(
        &mut self,
        id: NodeId,
        name: &str,
        options: Property,
    ) -> Result<(), ConfigError> {
        if let Some(index) = self.index_of(id, name) {
            self.nodes[id.0].props[index].merge(options);
            return Ok(());
        }
        let mut descriptor = match self.nodes[id.0].class.entry_template() {
            Some(template) => PropertyDescriptor::from_options(name, template.clone()),
            None => PropertyDescriptor::new(name),
        };
        descriptor.merge(options);
        self.nodes[id.0].props.push(descriptor);

        let index = self.nodes[id.0].props.len() - 1;
        let Some(initial) = self.initial_value(id, index) else {
            return Ok(());
        };
        let children = child_nodes(Some(&initial));
        let result = self.set_and_validate_from_root(id, name, initial);
        for child in children {
            self.mark_constructed(child);
        }
        if let Err(err) = result {
            self.nodes[id.0].props.remove(index);
            return Err(err);
        }
        let descriptor = &mut self.nodes[id.0].props[index];
        descriptor.default = descriptor.value.clone();
        descriptor.hard_default = descriptor.value.clone().filter(|v| !contains_node(v));
        Ok(())
    }

    /// Remove a runtime or declared property from one node.
    pub fn remove_property(&mut self, id: NodeId, name: &str) -> Option<PropertyDescriptor> {
        let index = self.index_of(id, name)?;
        Some(self.nodes[id.0].props.remove(index))
    }

    pub(crate) fn index_of(&self, id: NodeId, name: &str) -> Option<usize> {
        self.nodes[id.0].props.iter().position(|p| p.name == name)
    }

    /// Node and descriptor index for a dotted property path.
    pub(crate) fn resolve(&self, path: &str) -> Option<(NodeId, usize)> {
        let (parent, name) = match path.rsplit_once('.') {
            Some((parent, name)) => (self.node_at(parent)?, name),
            None => (self.root, path),
        };
        Some((parent, self.index_of(parent, name)?))
    }

    pub(crate) fn value_from(&self, start: NodeId, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut value = self.prop_value(start, segments.next()?)?;
        for segment in segments {
            value = match value {
                Value::Node(child) => self.prop_value(*child, segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }

    fn prop_value(&self, id: NodeId, name: &str) -> Option<&Value> {
        let index = self.index_of(id, name)?;
        self.nodes[id.0].props[index].value.as_ref()
    }

    /// Dotted path of property `name` on node `id`.
    pub(crate) fn path_of(&self, id: NodeId, name: &str) -> String {
        let base = &self.nodes[id.0].prop_path;
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{base}.{name}")
        }
    }
}

fn report(sink: &mut Sink<'_>, err: ConfigError) -> Result<(), ConfigError> {
    match sink {
        Some(errors) => {
            let message = err.to_string();
            if !errors.iter().any(|e| e.to_string() == message) {
                errors.push(err);
            }
            Ok(())
        }
        None => Err(err),
    }
}

/// Node handles held directly by a value or by its array elements.
pub(crate) fn child_nodes(value: Option<&Value>) -> Vec<NodeId> {
    match value {
        Some(Value::Node(id)) => vec![*id],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_node).collect(),
        _ => Vec::new(),
    }
}

fn contains_node(value: &Value) -> bool {
    match value {
        Value::Node(_) => true,
        Value::Array(items) => items.iter().any(contains_node),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use serde_json::json;

    use super::*;
    use crate::fixtures::test::*;
    use crate::schema::Constraint;

    #[test]
    fn defaults_are_loaded_at_construction() {
        let tree = ConfigTree::new(&app_class()).unwrap();
        assert_eq!(tree.get("host"), Some(&Value::from("localhost")));
        assert_eq!(tree.get("database.poolSize"), Some(&Value::Integer(5)));
        assert_eq!(tree.get("token"), None);
    }

    #[test]
    fn paths_are_composed_top_down() {
        let tree = ConfigTree::new(&cascade_class()).unwrap();
        let child = tree.node_at("child").unwrap();
        let grandchild = tree.node_at("child.grandchild").unwrap();
        assert_eq!(tree.prop_path(tree.root()), "");
        assert_eq!(tree.prop_path(child), "child");
        assert_eq!(tree.prop_path(grandchild), "child.grandchild");
        assert_eq!(tree.parent_of(grandchild), Some(child));
        assert_eq!(tree.nodes[grandchild.0].root, Some(tree.root()));
    }

    #[test]
    fn sibling_nodes_do_not_share_descriptors() {
        let mut a = ConfigTree::new(&app_class()).unwrap();
        let b = ConfigTree::new(&app_class()).unwrap();
        a.set("port", 9000).unwrap();
        assert_eq!(a.get("port"), Some(&Value::Integer(9000)));
        assert_eq!(b.get("port"), Some(&Value::Integer(8080)));
    }

    #[test]
    fn integer_string_is_coerced_on_write() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set("port", "3000").unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Integer(3000)));
    }

    #[test]
    fn rejected_write_leaves_value_untouched() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        assert!(matches!(
            tree.set("port", "12.5"),
            Err(ConfigError::Format { .. })
        ));
        assert!(matches!(
            tree.set("port", 70000),
            Err(ConfigError::Range { .. })
        ));
        assert_eq!(tree.get("port"), Some(&Value::Integer(8080)));
    }

    #[test]
    fn unknown_path_is_reported() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        match tree.set("database.nope", 1) {
            Err(ConfigError::UnknownProperty(path)) => assert_eq!(path, "database.nope"),
            other => panic!("Expected UnknownProperty, got {other:?}"),
        }
    }

    #[test]
    fn fallback_replaces_rejected_value() {
        let mut tree = ConfigTree::new(&constrained_class()).unwrap();
        tree.set("num", 1).unwrap();
        assert_eq!(tree.get("num"), Some(&Value::Integer(10)));
        assert_eq!(tree.fallbacks().len(), 1);
        assert_eq!(tree.fallbacks()[0].path, "num");
        assert_eq!(tree.fallbacks()[0].reason, "num must be at least 5");
    }

    #[test]
    fn failing_default_without_fallback_fails_construction() {
        match ConfigTree::new(&strict_class(1)) {
            Err(ConfigError::Constraint { path, .. }) => assert_eq!(path, "num"),
            other => panic!("Expected Constraint, got {other:?}"),
        }
        assert!(ConfigTree::new(&strict_class(6)).is_ok());
    }

    #[test]
    fn constraint_violation_is_aggregated_and_rolled_back() {
        let mut tree = ConfigTree::new(&strict_class(6)).unwrap();
        let err = tree.set("num", 2).unwrap_err();
        match &err {
            ConfigError::Aggregate(violations) => {
                assert_eq!(violations.len(), 1);
                assert!(matches!(&violations[0], ConfigError::Constraint { path, .. } if path == "num"));
            }
            other => panic!("Expected Aggregate, got {other:?}"),
        }
        assert_eq!(tree.get("num"), Some(&Value::Integer(6)));
    }

    #[test]
    fn fallbacks_cascade_through_descendants() {
        let mut tree = ConfigTree::new(&cascade_class()).unwrap();
        tree.set("a", 1).unwrap();
        assert_eq!(tree.get("a"), Some(&Value::Integer(1)));
        assert_eq!(tree.get("child.b"), Some(&Value::Integer(2)));
        assert_eq!(tree.get("child.grandchild.c"), Some(&Value::Integer(3)));
        let paths: Vec<&str> = tree.fallbacks().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["child.b", "child.grandchild.c"]);
    }

    #[test]
    fn batch_validation_collects_every_violation() {
        let class = ConfigClass::builder("Pair")
            .property(
                "x",
                Property::integer()
                    .default_value(1)
                    .constraint(Constraint::new(|v, _| v.as_i64() == Some(1)).reason("x must be 1")),
            )
            .property(
                "y",
                Property::integer()
                    .default_value(1)
                    .constraint(Constraint::new(|v, _| v.as_i64() == Some(1)).reason("y must be 1")),
            )
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();
        let root = tree.root();
        tree.nodes[root.0].props[0].value = Some(Value::Integer(2));
        tree.nodes[root.0].props[1].value = Some(Value::Integer(3));

        let mut violations = Vec::new();
        tree.validate_all(Some(&mut violations)).unwrap();
        assert_eq!(violations.len(), 2);

        let err = tree.validate_all(None).unwrap_err();
        assert!(err.to_string().contains("x must be 1"));
    }

    #[test]
    fn readonly_blocks_writes_after_construction() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.lock("host").unwrap();
        match tree.set("host", "0.0.0.0") {
            Err(ConfigError::Readonly { path }) => assert_eq!(path, "host"),
            other => panic!("Expected Readonly, got {other:?}"),
        }
        // Writing the stored value is a no-op, not a violation.
        tree.set("host", "localhost").unwrap();
    }

    #[test]
    fn soft_readonly_accepts_without_lock() {
        let class = ConfigClass::builder("Soft")
            .soft_readonly(true)
            .property("name", Property::string().default_value("a").readonly())
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();
        tree.set("name", "b").unwrap();
        assert_eq!(tree.get("name"), Some(&Value::from("b")));
        assert!(tree.descriptor("name").unwrap().is_readonly());
    }

    #[test]
    fn hook_sees_the_root() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let class = ConfigClass::builder("Hooked")
            .property("other", Property::integer().default_value(7))
            .property(
                "watched",
                Property::integer().default_value(0).on_new_value(move |value, root| {
                    log.lock()
                        .unwrap()
                        .push((value.as_i64(), root.get_i64("other")));
                }),
            )
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();
        tree.set("watched", 3).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(Some(3), Some(7))]);
    }

    #[test]
    fn constraints_see_an_empty_root_before_composition() {
        let saw_empty = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&saw_empty);
        let class = ConfigClass::builder("Early")
            .property(
                "early",
                Property::dynamic(move |_, root| {
                    log.lock().unwrap().push(root.is_empty());
                    PropertyType::Integer
                })
                .default_value(1),
            )
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();
        tree.set("early", 2).unwrap();
        let seen = saw_empty.lock().unwrap();
        assert_eq!(seen.first(), Some(&true));
        assert_eq!(seen.last(), Some(&false));
    }

    #[test]
    fn object_write_loads_existing_node_in_place() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let before = tree.node_at("database").unwrap();
        tree.set("database", Value::from(serde_json::json!({"url": "pg://x"})))
            .unwrap();
        assert_eq!(tree.node_at("database"), Some(before));
        assert_eq!(tree.get("database.url"), Some(&Value::from("pg://x")));
        assert_eq!(tree.get("database.poolSize"), Some(&Value::Integer(5)));
    }

    #[test]
    fn node_arrays_are_wired_by_index() {
        let mut tree = ConfigTree::new(&fleet_class()).unwrap();
        tree.set(
            "servers",
            Value::from(serde_json::json!([{"host": "a"}, {"host": "b", "port": "81"}])),
        )
        .unwrap();
        let second = tree.get("servers.1").and_then(Value::as_node).unwrap();
        assert_eq!(tree.prop_path(second), "servers.1");
        assert_eq!(tree.get("servers.1.port"), Some(&Value::Integer(81)));
        assert_eq!(tree.get("servers.0.port"), Some(&Value::Integer(80)));
    }

    #[test]
    fn new_node_is_reparented_under_its_owner() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let fresh = tree.instantiate(&database_class());
        tree.mark_constructed(fresh);
        tree.set("database", fresh).unwrap();
        assert_eq!(tree.prop_path(fresh), "database");
        assert_eq!(tree.parent_of(fresh), Some(tree.root()));
        assert_eq!(tree.nodes[fresh.0].root, Some(tree.root()));
    }

    #[test]
    fn rejected_write_undoes_fallbacks_it_triggered() {
        let class = ConfigClass::builder("Linked")
            .property("a", Property::integer().default_value(5))
            .property(
                "b",
                Property::integer().default_value(5).constraint(
                    Constraint::new(|_, root| root.get_i64("a").is_some_and(|a| a >= 5))
                        .fallback(2)
                        .reason("b needs a >= 5"),
                ),
            )
            .property(
                "d",
                Property::integer().default_value(5).constraint(
                    Constraint::new(|_, root| root.get_i64("a").is_some_and(|a| a >= 3))
                        .reason("d needs a >= 3"),
                ),
            )
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();

        match tree.set("a", 1) {
            Err(ConfigError::Aggregate(violations)) => {
                assert_eq!(violations.len(), 1);
                assert!(matches!(&violations[0], ConfigError::Constraint { path, .. } if path == "d"));
            }
            other => panic!("Expected Aggregate, got {other:?}"),
        }
        assert_eq!(tree.get("a"), Some(&Value::Integer(5)));
        assert_eq!(tree.get("b"), Some(&Value::Integer(5)));
        assert!(tree.fallbacks().is_empty());

        tree.set("a", 4).unwrap();
        assert_eq!(tree.get("b"), Some(&Value::Integer(2)));
        assert_eq!(tree.fallbacks().len(), 1);
    }

    #[test]
    fn node_of_another_class_is_rejected() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        let database = tree.node_at("database").unwrap();
        let server = tree.instantiate(&server_class());
        tree.mark_constructed(server);
        let root = tree.root();

        for candidate in [server, root, NodeId(999)] {
            match tree.set("database", candidate) {
                Err(ConfigError::Format { path, .. }) => assert_eq!(path, "database"),
                other => panic!("Expected Format for {candidate:?}, got {other:?}"),
            }
        }
        assert_eq!(tree.node_at("database"), Some(database));
        assert_eq!(tree.get("database.poolSize"), Some(&Value::Integer(5)));
        assert_eq!(tree.get("database.port"), None);
    }

    #[test]
    fn node_cannot_be_stored_under_itself() {
        let outer_slot: Arc<OnceLock<Arc<ConfigClass>>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&outer_slot);
        let inner = ConfigClass::builder("Inner")
            .property(
                "up",
                Property::dynamic(move |_, _| match slot.get() {
                    Some(class) => PropertyType::Node(Arc::clone(class)),
                    None => PropertyType::String,
                }),
            )
            .build();
        let outer = ConfigClass::builder("Outer")
            .property("inner", Property::node(&inner))
            .build();
        outer_slot.set(Arc::clone(&outer)).unwrap();

        let mut tree = ConfigTree::new(&outer).unwrap();
        let root = tree.root();
        match tree.set("inner.up", root) {
            Err(ConfigError::Format { path, reason }) => {
                assert_eq!(path, "inner.up");
                assert!(reason.contains("itself"), "{reason}");
            }
            other => panic!("Expected Format, got {other:?}"),
        }
        assert_eq!(tree.get("inner.up"), None);
    }

    #[test]
    fn attached_node_cannot_be_shared() {
        let db = database_class();
        let class = ConfigClass::builder("Replicated")
            .property("primary", Property::node(&db))
            .property("replica", Property::node(&db))
            .build();
        let mut tree = ConfigTree::new(&class).unwrap();
        let primary = tree.node_at("primary").unwrap();
        let replica = tree.node_at("replica").unwrap();

        match tree.set("replica", primary) {
            Err(ConfigError::Format { reason, .. }) => assert!(reason.contains("'primary'"), "{reason}"),
            other => panic!("Expected Format, got {other:?}"),
        }
        assert_eq!(tree.node_at("replica"), Some(replica));
        assert_eq!(tree.parent_of(primary), Some(tree.root()));
        assert_eq!(tree.prop_path(primary), "primary");
    }

    #[test]
    fn replaced_nodes_are_recycled() {
        let mut tree = ConfigTree::new(&fleet_class()).unwrap();
        for i in 0..100 {
            tree.set("servers", Value::from(json!([{"host": format!("h{i}")}])))
                .unwrap();
        }
        assert!(tree.nodes.len() <= 3, "{} nodes", tree.nodes.len());
        assert_eq!(tree.get("servers.0.host"), Some(&Value::from("h99")));
        let server = tree.get("servers.0").and_then(Value::as_node).unwrap();
        assert_eq!(tree.prop_path(server), "servers.0");

        // Half-built elements of a rejected array are reclaimed too.
        for _ in 0..50 {
            assert!(tree.set("servers", Value::from(json!([{"host": "x"}, 5]))).is_err());
        }
        assert!(tree.nodes.len() <= 3, "{} nodes", tree.nodes.len());
        assert_eq!(tree.get("servers.0.host"), Some(&Value::from("h99")));
    }

    #[test]
    fn released_node_cannot_be_stored_again() {
        let mut tree = ConfigTree::new(&fleet_class()).unwrap();
        tree.set("servers", Value::from(json!([{"host": "a"}]))).unwrap();
        let first = tree.get("servers.0").and_then(Value::as_node).unwrap();
        tree.set("servers", Value::from(json!([{"host": "b"}]))).unwrap();
        assert!(!tree.is_live(first));

        let stale = Value::Array(vec![Value::Node(first)]);
        assert!(matches!(
            tree.set("servers", stale),
            Err(ConfigError::Format { .. })
        ));
        assert_eq!(tree.get("servers.0.host"), Some(&Value::from("b")));
    }

    #[test]
    fn dynamic_entries_are_added_on_load() {
        let mut tree = ConfigTree::new(&labels_class()).unwrap();
        let labels = tree.node_at("labels").unwrap();
        tree.set("labels", Value::from(serde_json::json!({"team": "core", "tier": 2})))
            .unwrap();
        assert_eq!(tree.get("labels.team"), Some(&Value::from("core")));
        assert_eq!(tree.get("labels.tier"), Some(&Value::from("2")));

        tree.add_property(labels, "owner", Property::new().default_value("ops"))
            .unwrap();
        assert_eq!(tree.get("labels.owner"), Some(&Value::from("ops")));
        assert!(tree.remove_property(labels, "team").is_some());
        assert_eq!(tree.get("labels.team"), None);
    }

    #[test]
    fn unknown_keys_are_ignored_on_plain_classes() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set(
            "database",
            Value::from(serde_json::json!({"typo": 1, "//[url]": "comment", "url": "pg://"})),
        )
        .unwrap();
        assert_eq!(tree.get("database.url"), Some(&Value::from("pg://")));
        assert_eq!(tree.get("database.typo"), None);
    }

    #[test]
    fn null_is_stored_explicitly() {
        let mut tree = ConfigTree::new(&app_class()).unwrap();
        tree.set("port", Value::Null).unwrap();
        assert_eq!(tree.get("port"), Some(&Value::Null));
    }
}
