//! Schema-validated, hierarchical configuration trees. Declare a schema,
//! compose a tree, and every write is type-checked and re-validated across
//! the whole tree.
//!
//! Proptree keeps configuration as a tree of typed nodes. Each node belongs
//! to a [`ConfigClass`], a registry of property descriptors with types,
//! defaults, ranges, constraints, tags, descriptions, and env aliases. A
//! [`ConfigTree`] instantiates the classes, wires every nested node to the
//! root, and validates the result.
//!
//! ```ignore
//! let database = ConfigClass::builder("Database")
//!     .property("url", Property::string().description("Connection string"))
//!     .property("poolSize", Property::unsigned_int().default_value(5))
//!     .build();
//! let app = ConfigClass::builder("App")
//!     .property("port", Property::integer().default_value(8080).min(1.0).max(65535.0))
//!     .property("database", Property::node(&database))
//!     .build();
//!
//! let mut tree = ConfigTree::new(&app)?;
//! ConfigLoader::new().app_name("myapp").load(&mut tree)?;
//! tree.set("database.poolSize", 10)?;
//! ```
//!
//! # The write path
//!
//! Every mutation goes through one entry point. A write:
//!
//! 1. is a no-op when the candidate equals the stored value, before or after
//!    coercion;
//! 2. fails with [`ConfigError::Readonly`] on a locked property (unless the
//!    class is `soft_readonly`);
//! 3. is coerced by the property's type, failing with
//!    [`ConfigError::Format`] or [`ConfigError::Range`] before anything is
//!    stored;
//! 4. is stored, and the property's `on_new_value` hook runs;
//! 5. triggers a whole-tree validation pass from the root.
//!
//! Constraints receive a [`NodeRef`] to the root, so a property may depend
//! on any other value in the tree. A failing constraint with a fallback is
//! replaced by the fallback (recorded in [`ConfigTree::fallbacks`]); one
//! without a fallback is collected. All collected violations come back as a
//! single [`ConfigError::Aggregate`] and the offending write is rolled back.
//!
//! # Defaults and state
//!
//! Every property tracks three values: the hard default (from the
//! declaration), the current default (overridable, e.g. by a file's
//! `__defaults` block), and the current value.
//! [`reset`](ConfigTree::reset) and [`reset_hard`](ConfigTree::reset_hard)
//! restore the latter from the former two.
//!
//! # Projection
//!
//! [`ConfigTree::to_json`] renders the tree as a plain `serde_json` object
//! under [`ProjectOptions`]: description comments as `//[name]` keys,
//! `__defaults` and `__state` blocks, enums by key, tag filtering, and
//! volatile inclusion. Keys follow declaration order.
//!
//! # Layer precedence
//!
//! ```text
//! Declared defaults     Property::default_value(...)
//!        ↑ overridden by
//! File __defaults       {"__defaults": {...}}
//!        ↑ overridden by
//! File values           {app_name}.json or .toml
//!        ↑ overridden by
//! Environment vars      PREFIX_KEY, or the property's env alias
//!        ↑ overridden by
//! Command line          --flat-key value
//! ```
//!
//! Values from the environment and the command line are locked readonly
//! once loaded, unless the class opts out with `lock_external(false)`.
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` Cargo feature, on by default) builds
//! a `clap::Command` from the tree at runtime: one `--<flat-key>` switch per
//! leaf property, plus `--help`, `--exitOnConfig`, and `--config <path>`.
//! To use proptree without clap:
//!
//! ```toml
//! proptree = { version = "...", default-features = false }
//! ```
//!
//! # Other features
//!
//! - `url`: `inject::parse_query` and `ConfigTree::inject_with_query` for
//!   URL query parameters.
//! - `tokio`: `ConfigLoader::load_async`.
//! - `rich-errors`: `miette::Diagnostic` on [`ConfigError`].

pub mod error;
pub mod inject;
pub mod loader;
pub mod manual;
pub mod merge;
pub mod project;
pub mod schema;
pub mod tree;
pub mod types;
pub mod value;

#[cfg(feature = "clap")]
mod cli;
mod coerce;
mod defaults;
mod env;
mod file;
mod persist;

#[cfg(test)]
mod fixtures;

#[cfg(feature = "clap")]
pub use cli::{CliOutcome, CliRequest, ConfigCli};
pub use error::ConfigError;
pub use loader::{ConfigLoader, LoadReport};
pub use merge::{Leaf, deep_merge};
pub use project::ProjectOptions;
pub use schema::{ClassBuilder, ClassOptions, ConfigClass, Constraint, Property, PropertyDescriptor};
pub use tree::{ConfigTree, FallbackApplied, NodeId, NodeRef};
pub use types::{EnumType, EnumValue, FileFormat, PropertyType, SearchPath};
pub use value::Value;
