//! Property metadata registry.
//!
//! A [`ConfigClass`] is the class-level schema: an ordered list of
//! [`PropertyDescriptor`]s built once through [`ClassBuilder`] and shared
//! behind an `Arc`. Every node instantiated from the class clones the list,
//! so sibling nodes never share descriptor state.
//!
//! Registration is best-effort. [`ClassBuilder::register_property`] merges
//! options into an existing descriptor of the same name, infers the type
//! from the initializer when none is given, and records which shapes it
//! recognized (config nodes, enums, arrays of either). Misconfiguration
//! only surfaces later, when a value is validated.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::tree::NodeRef;
use crate::types::{EnumType, PropertyType};
use crate::value::Value;

pub type AssertFn = Arc<dyn Fn(&Value, NodeRef<'_>) -> bool + Send + Sync>;
pub type HookFn = Arc<dyn Fn(&Value, NodeRef<'_>) + Send + Sync>;
pub type FactoryFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A custom assertion evaluated against the whole tree.
#[derive(Clone)]
pub struct Constraint {
    assert: AssertFn,
    fallback: Option<Value>,
    reason: Option<String>,
}

impl Constraint {
    /// `assert(value, root)` returns `true` when the value is acceptable.
    pub fn new<F>(assert: F) -> Self
    where
        F: Fn(&Value, NodeRef<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            assert: Arc::new(assert),
            fallback: None,
            reason: None,
        }
    }

    /// Value substituted when the assertion fails.
    pub fn fallback(mut self, value: impl Into<Value>) -> Self {
        self.fallback = Some(value.into());
        self
    }

    /// Human-readable explanation attached to failures and fallbacks.
    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn check(&self, value: &Value, root: NodeRef<'_>) -> bool {
        (self.assert)(value, root)
    }

    pub fn fallback_value(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }

    pub fn reason_text(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("fallback", &self.fallback)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// How a property gets its value at instantiation.
#[derive(Clone)]
pub enum Initializer {
    Value(Value),
    /// Evaluated per instantiation; the first result becomes the hard default.
    Factory(FactoryFn),
    /// Default-construct the nested config node.
    DefaultNode,
}

/// Options for one property, merged into the class registry.
///
/// Every field is optional so that several registrations of the same name
/// compose: later options override earlier ones field by field.
#[derive(Clone)]
pub struct Property {
    ty: Option<PropertyType>,
    array_type: Option<PropertyType>,
    initializer: Option<Initializer>,
    constraint: Option<Constraint>,
    volatile: Option<bool>,
    readonly: Option<bool>,
    description: Option<String>,
    env_alias: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    tags: Vec<String>,
    on_new_value: Option<HookFn>,
}

impl Property {
    /// Options with nothing set; the type is inferred from the default, if any.
    pub fn new() -> Self {
        Self {
            ty: None,
            array_type: None,
            initializer: None,
            constraint: None,
            volatile: None,
            readonly: None,
            description: None,
            env_alias: None,
            min: None,
            max: None,
            tags: Vec::new(),
            on_new_value: None,
        }
    }

    pub fn of(ty: PropertyType) -> Self {
        Self {
            ty: Some(ty),
            ..Self::new()
        }
    }

    pub fn string() -> Self {
        Self::of(PropertyType::String)
    }

    pub fn float() -> Self {
        Self::of(PropertyType::Float)
    }

    pub fn integer() -> Self {
        Self::of(PropertyType::Integer)
    }

    pub fn unsigned_int() -> Self {
        Self::of(PropertyType::UnsignedInt)
    }

    pub fn positive_float() -> Self {
        Self::of(PropertyType::PositiveFloat)
    }

    pub fn ratio() -> Self {
        Self::of(PropertyType::Ratio)
    }

    pub fn boolean() -> Self {
        Self::of(PropertyType::Boolean)
    }

    pub fn date() -> Self {
        Self::of(PropertyType::Date)
    }

    pub fn array(element: PropertyType) -> Self {
        Self {
            array_type: Some(element),
            ..Self::of(PropertyType::Array)
        }
    }

    pub fn enumeration(enum_type: &Arc<EnumType>) -> Self {
        Self::of(PropertyType::Enum(Arc::clone(enum_type)))
    }

    /// A nested config node, default-constructed at instantiation.
    pub fn node(class: &Arc<ConfigClass>) -> Self {
        Self {
            initializer: Some(Initializer::DefaultNode),
            ..Self::of(PropertyType::Node(Arc::clone(class)))
        }
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Value, NodeRef<'_>) -> PropertyType + Send + Sync + 'static,
    {
        Self::of(PropertyType::dynamic(f))
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.initializer = Some(Initializer::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.initializer = Some(Initializer::Factory(Arc::new(factory)));
        self
    }

    /// Leave the property undefined until something writes it.
    pub fn no_default(mut self) -> Self {
        self.initializer = None;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = Some(true);
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = Some(true);
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn env_alias(mut self, alias: &str) -> Self {
        self.env_alias = Some(alias.to_string());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn on_new_value<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, NodeRef<'_>) + Send + Sync + 'static,
    {
        self.on_new_value = Some(Arc::new(hook));
        self
    }
}

impl Default for Property {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-property metadata: type, constraints, defaults, flags, and the
/// current value.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub(crate) name: String,
    pub(crate) ty: Option<PropertyType>,
    pub(crate) array_type: Option<PropertyType>,
    pub(crate) value: Option<Value>,
    pub(crate) default: Option<Value>,
    pub(crate) hard_default: Option<Value>,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) constraint: Option<Constraint>,
    pub(crate) volatile: bool,
    pub(crate) readonly: bool,
    pub(crate) description: Option<String>,
    pub(crate) env_alias: Option<String>,
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) is_config_type: bool,
    pub(crate) is_enum_type: bool,
    pub(crate) is_config_array_type: bool,
    pub(crate) is_enum_array_type: bool,
    pub(crate) on_new_value: Option<HookFn>,
}

impl PropertyDescriptor {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: None,
            array_type: None,
            value: None,
            default: None,
            hard_default: None,
            initializer: None,
            constraint: None,
            volatile: false,
            readonly: false,
            description: None,
            env_alias: None,
            min: None,
            max: None,
            tags: BTreeSet::new(),
            is_config_type: false,
            is_enum_type: false,
            is_config_array_type: false,
            is_enum_array_type: false,
            on_new_value: None,
        }
    }

    pub(crate) fn from_options(name: &str, options: Property) -> Self {
        let mut descriptor = Self::new(name);
        descriptor.merge(options);
        descriptor
    }

    /// Merge `options` field by field, then re-run type inference and shape
    /// recognition.
    pub(crate) fn merge(&mut self, options: Property) {
        if options.ty.is_some() {
            self.ty = options.ty;
        }
        if options.array_type.is_some() {
            self.array_type = options.array_type;
        }
        if options.initializer.is_some() {
            self.initializer = options.initializer;
        }
        if options.constraint.is_some() {
            self.constraint = options.constraint;
        }
        if let Some(volatile) = options.volatile {
            self.volatile = volatile;
        }
        if let Some(readonly) = options.readonly {
            self.readonly = readonly;
        }
        if options.description.is_some() {
            self.description = options.description;
        }
        if options.env_alias.is_some() {
            self.env_alias = options.env_alias;
        }
        if options.min.is_some() {
            self.min = options.min;
        }
        if options.max.is_some() {
            self.max = options.max;
        }
        if options.on_new_value.is_some() {
            self.on_new_value = options.on_new_value;
        }
        self.tags.extend(options.tags);

        if self.ty.is_none()
            && let Some(Initializer::Value(value)) = &self.initializer
        {
            self.ty = PropertyType::infer(value);
        }
        self.recognize();
    }

    fn recognize(&mut self) {
        let enum_like = |ty: &Option<PropertyType>| {
            matches!(ty, Some(PropertyType::Enum(e)) if e.is_enum_like())
        };
        let is_array = matches!(self.ty, Some(PropertyType::Array));
        self.is_config_type = matches!(self.ty, Some(PropertyType::Node(_)));
        self.is_enum_type = enum_like(&self.ty);
        self.is_config_array_type =
            is_array && matches!(self.array_type, Some(PropertyType::Node(_)));
        self.is_enum_array_type = is_array && enum_like(&self.array_type);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> Option<&PropertyType> {
        self.ty.as_ref()
    }

    pub fn array_type(&self) -> Option<&PropertyType> {
        self.array_type.as_ref()
    }

    pub fn type_name(&self) -> &'static str {
        self.ty.as_ref().map_or("any", PropertyType::name)
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn hard_default(&self) -> Option<&Value> {
        self.hard_default.as_ref()
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn env_alias(&self) -> Option<&str> {
        self.env_alias.as_deref()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_config_type(&self) -> bool {
        self.is_config_type
    }

    pub fn is_enum_type(&self) -> bool {
        self.is_enum_type
    }

    pub fn is_config_array_type(&self) -> bool {
        self.is_config_array_type
    }

    pub fn is_enum_array_type(&self) -> bool {
        self.is_enum_array_type
    }

    /// The enum definition backing this property or its elements.
    pub(crate) fn enum_type(&self) -> Option<&EnumType> {
        match (&self.ty, &self.array_type) {
            (Some(PropertyType::Enum(e)), _) | (Some(PropertyType::Array), Some(PropertyType::Enum(e))) => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("array_type", &self.array_type)
            .field("value", &self.value)
            .field("default", &self.default)
            .field("hard_default", &self.hard_default)
            .field("readonly", &self.readonly)
            .field("volatile", &self.volatile)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Class-level behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassOptions {
    /// Accept writes to readonly properties instead of failing.
    pub soft_readonly: bool,
    /// Lock properties set from env vars or the command line.
    pub lock_external: bool,
    /// Write a fresh config file when the configured one is missing.
    pub create_if_missing: bool,
    /// Log swallowed file errors.
    pub debug: bool,
}

impl Default for ClassOptions {
    fn default() -> Self {
        Self {
            soft_readonly: false,
            lock_external: true,
            create_if_missing: false,
            debug: false,
        }
    }
}

/// A declared configuration type.
pub struct ConfigClass {
    name: String,
    properties: Vec<PropertyDescriptor>,
    options: ClassOptions,
    entry_template: Option<Property>,
    hard_defaults: OnceLock<Vec<Option<Value>>>,
}

impl ConfigClass {
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_string(),
            properties: Vec::new(),
            options: ClassOptions::default(),
            entry_template: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn options(&self) -> ClassOptions {
        self.options
    }

    /// Template for keys added at runtime to a map-like class.
    pub fn entry_template(&self) -> Option<&Property> {
        self.entry_template.as_ref()
    }

    /// Hard defaults, captured from the first instantiation only.
    pub(crate) fn capture_hard_defaults(
        &self,
        first: impl FnOnce() -> Vec<Option<Value>>,
    ) -> &[Option<Value>] {
        self.hard_defaults.get_or_init(first)
    }
}

impl fmt::Debug for ConfigClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigClass")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`ConfigClass`].
pub struct ClassBuilder {
    name: String,
    properties: Vec<PropertyDescriptor>,
    options: ClassOptions,
    entry_template: Option<Property>,
}

impl ClassBuilder {
    /// Declare (or re-declare) a property. See [`register_property`](Self::register_property).
    pub fn property(mut self, name: &str, options: Property) -> Self {
        self.register_property(name, options);
        self
    }

    /// Merge `options` into the descriptor for `name`, appending a new
    /// descriptor in declaration order if none exists. Never fails.
    pub fn register_property(&mut self, name: &str, options: Property) {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.merge(options),
            None => self
                .properties
                .push(PropertyDescriptor::from_options(name, options)),
        }
    }

    pub fn soft_readonly(mut self, enabled: bool) -> Self {
        self.options.soft_readonly = enabled;
        self
    }

    pub fn lock_external(mut self, enabled: bool) -> Self {
        self.options.lock_external = enabled;
        self
    }

    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.options.create_if_missing = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.options.debug = enabled;
        self
    }

    /// Make the class map-like: unknown keys loaded into it become new
    /// properties built from `template`.
    pub fn dynamic_entries(mut self, template: Property) -> Self {
        self.entry_template = Some(template);
        self
    }

    pub fn build(self) -> Arc<ConfigClass> {
        Arc::new(ConfigClass {
            name: self.name,
            properties: self.properties,
            options: self.options,
            entry_template: self.entry_template,
            hard_defaults: OnceLock::new(),
        })
    }
}
