//! External source merging.
//!
//! [`ConfigLoader`] merges a config file, environment variables, and
//! command-line overrides into an existing [`ConfigTree`]. Precedence,
//! lowest to highest:
//!
//! 1. The file's `__defaults` block
//! 2. The file's values (then its `__state` block)
//! 3. Environment variables, including aliases
//! 4. Command-line overrides
//!
//! Everything set from the environment or the command line is locked
//! readonly at the end of the load, unless the owning class opts out with
//! `lock_external(false)` or the source is being rewritten into the file.
//! File problems never fail a load: a missing file is created when the
//! class asks for it, and read, parse, or write failures fall back to the
//! in-memory state (logged when the class has `debug` on).

use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::env;
use crate::error::ConfigError;
use crate::file;
use crate::merge::{KeyIndex, deep_merge, raw_to_value};
use crate::persist;
use crate::project::ProjectOptions;
use crate::tree::{ConfigTree, NodeId};
use crate::types::{FileFormat, SearchPath};
use crate::value::Value;

/// What a load did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// The config file location, when one could be resolved.
    pub path: Option<PathBuf>,
    pub file_loaded: bool,
    pub file_created: bool,
    /// Dotted paths set from the environment.
    pub env_applied: Vec<String>,
    /// Dotted paths set from the command line.
    pub cli_applied: Vec<String>,
    pub persisted: bool,
}

/// Builder for merging external sources into a tree.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    app_name: Option<String>,
    file_name: Option<String>,
    config_file: Option<PathBuf>,
    search_path: SearchPath,
    env_prefix: Option<String>,
    env_enabled: bool,
    env_vars: Option<Vec<(String, String)>>,
    separator: String,
    cli_overrides: Vec<(String, Value)>,
    rewrite_env: bool,
    rewrite_cli: bool,
    strict: bool,
    persist_options: ProjectOptions,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            app_name: None,
            file_name: None,
            config_file: None,
            search_path: SearchPath::Platform,
            env_prefix: None,
            env_enabled: true,
            env_vars: None,
            separator: "-".into(),
            cli_overrides: Vec::new(),
            rewrite_env: false,
            rewrite_cli: false,
            strict: false,
            persist_options: ProjectOptions::new().attach_description(true),
        }
    }

    /// Set the application name. This derives sensible defaults:
    /// - `file_name` → `"{app_name}.json"`
    /// - `env_prefix` → `"{APP_NAME}"` (uppercased)
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Override the config file name (default: `"{app_name}.json"`).
    /// A `.toml` name switches the file format.
    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Use this exact file, bypassing the search path.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Directory that holds the config file (default: [`SearchPath::Platform`]).
    pub fn search_path(mut self, path: SearchPath) -> Self {
        self.search_path = path;
        self
    }

    /// Override the environment variable prefix (default: uppercased `app_name`).
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Read these pairs instead of the process environment.
    pub fn env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env_vars = Some(vars.into_iter().collect());
        self
    }

    /// Separator joining path segments in flat external keys (default: `-`).
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Add a CLI override. `None` values are ignored (useful for optional clap args).
    ///
    /// `key` may be a flat key (`database-url`), a dotted path
    /// (`database.url`), or an env alias.
    pub fn cli_override<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.cli_overrides.push((key.to_string(), v.into()));
        }
        self
    }

    /// Add raw `(key, value)` pairs as CLI overrides.
    pub fn cli_args(mut self, args: impl IntoIterator<Item = (String, String)>) -> Self {
        self.cli_overrides
            .extend(args.into_iter().map(|(k, v)| (k, Value::String(v))));
        self
    }

    /// Write env values back into the config file instead of locking them.
    pub fn rewrite_env(mut self, enabled: bool) -> Self {
        self.rewrite_env = enabled;
        self
    }

    /// Write CLI values back into the config file instead of locking them.
    pub fn rewrite_cli(mut self, enabled: bool) -> Self {
        self.rewrite_cli = enabled;
        self
    }

    /// Enable or disable strict mode (default: `false`).
    /// In strict mode, unknown keys in the config file produce errors.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Projection used when writing the file (default: with descriptions).
    pub fn persist_options(mut self, options: ProjectOptions) -> Self {
        self.persist_options = options;
        self
    }

    /// The config file this loader reads and writes, if it can be resolved.
    pub fn file_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_file {
            return Some(path.clone());
        }
        let app_name = self.app_name.as_deref().unwrap_or("config");
        let dir = file::resolve_search_path(&self.search_path, app_name)?;
        let file_name = self
            .file_name
            .clone()
            .unwrap_or_else(|| format!("{app_name}.json"));
        Some(dir.join(file_name))
    }

    fn effective_env_prefix(&self) -> Option<String> {
        self.env_prefix
            .clone()
            .or_else(|| self.app_name.as_ref().map(|n| n.to_uppercase()))
    }

    /// Merge every source into `tree`.
    ///
    /// Format, range, constraint and readonly errors from any source are
    /// returned; file IO and parse problems are not.
    pub fn load(&self, tree: &mut ConfigTree) -> Result<LoadReport, ConfigError> {
        let path = self.file_path();
        let read = path.as_deref().map(file::read_document);
        self.apply(tree, path, read)
    }

    /// [`load`](Self::load) with the file read through `tokio::fs`.
    #[cfg(feature = "tokio")]
    pub async fn load_async(&self, tree: &mut ConfigTree) -> Result<LoadReport, ConfigError> {
        let path = self.file_path();
        let read = match &path {
            Some(p) => Some(match tokio::fs::read_to_string(p).await {
                Ok(content) => file::parse_document(&content, p).map(Some),
                Err(e) if file::is_missing(&e) => Ok(None),
                Err(e) => Err(ConfigError::Io {
                    path: p.clone(),
                    source: e,
                }),
            }),
            None => None,
        };
        self.apply(tree, path, read)
    }

    fn apply(
        &self,
        tree: &mut ConfigTree,
        path: Option<PathBuf>,
        read: Option<Result<Option<Map<String, Json>>, ConfigError>>,
    ) -> Result<LoadReport, ConfigError> {
        let root = tree.root();
        let options = tree.class_of(root).options();
        let mut report = LoadReport {
            path: path.clone(),
            ..LoadReport::default()
        };

        match (read, &path) {
            (Some(Ok(Some(doc))), Some(path)) => {
                if self.strict {
                    let unknown = unknown_keys(tree, root, &doc);
                    if !unknown.is_empty() {
                        return Err(ConfigError::UnknownKeys {
                            path: path.clone(),
                            keys: unknown,
                        });
                    }
                }
                tree.load_document(root, &doc)?;
                report.file_loaded = true;
                debug!(path = %path.display(), "config file loaded");
            }
            (Some(Ok(None)), Some(path)) if options.create_if_missing => {
                match self.write_file(tree, path) {
                    Ok(()) => {
                        report.file_created = true;
                        debug!(path = %path.display(), "config file created");
                    }
                    Err(err) if options.debug => warn!(error = %err, "could not create config file"),
                    Err(_) => {}
                }
            }
            (Some(Err(err)), _) if options.debug => {
                warn!(error = %err, "config file ignored");
            }
            _ => {}
        }

        let leaves = tree.leaves(&self.separator);
        let index = KeyIndex::new(&leaves, &self.separator);

        if self.env_enabled {
            let prefix = self.effective_env_prefix();
            let entries = match &self.env_vars {
                Some(vars) => env::env_entries(prefix.as_deref(), &index, vars.iter().cloned()),
                None => env::env_entries(prefix.as_deref(), &index, std::env::vars()),
            };
            for (path, value) in entries {
                tree.set(&path, value)?;
                report.env_applied.push(path);
            }
        }

        for (key, value) in &self.cli_overrides {
            let leaf = index
                .lookup(key)
                .or_else(|| leaves.iter().find(|l| l.path == *key))
                .ok_or_else(|| ConfigError::UnknownProperty(key.clone()))?;
            let value = match value {
                Value::String(raw) => raw_to_value(raw, leaf),
                other => other.clone(),
            };
            tree.set(&leaf.path, value)?;
            if !report.cli_applied.contains(&leaf.path) {
                report.cli_applied.push(leaf.path.clone());
            }
        }

        let mut locked = Vec::new();
        if !self.rewrite_env {
            locked.extend(report.env_applied.iter());
        }
        if !self.rewrite_cli {
            locked.extend(report.cli_applied.iter());
        }
        for path in locked {
            if owner_locks_external(tree, path) {
                tree.lock(path)?;
            }
        }

        let rewrite = (self.rewrite_env && !report.env_applied.is_empty())
            || (self.rewrite_cli && !report.cli_applied.is_empty());
        if rewrite && let Some(path) = &path {
            match self.write_file(tree, path) {
                Ok(()) => report.persisted = true,
                Err(err) if options.debug => warn!(error = %err, "could not rewrite config file"),
                Err(_) => {}
            }
        }

        Ok(report)
    }

    /// Write the current tree to the config file, merged over whatever the
    /// file already holds.
    pub fn persist(&self, tree: &ConfigTree) -> Result<PathBuf, ConfigError> {
        let path = self.file_path().ok_or_else(|| ConfigError::Io {
            path: PathBuf::new(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no config directory could be resolved",
            ),
        })?;
        self.write_file(tree, &path)?;
        Ok(path)
    }

    fn write_file(&self, tree: &ConfigTree, path: &Path) -> Result<(), ConfigError> {
        let existing = match file::read_document(path) {
            Ok(Some(doc)) => doc,
            _ => Map::new(),
        };
        let projected = tree.project(tree.root(), &self.persist_options);
        let merged = deep_merge(existing, projected);
        let text = persist::render_document(&merged, FileFormat::from_path(path))?;
        file::write_document(path, &text)
    }
}

impl ConfigTree {
    /// Apply a file-shaped document to node `id`: the `__defaults` block,
    /// then the values, then the `__state` block.
    pub fn load_document(&mut self, id: NodeId, doc: &Map<String, Json>) -> Result<(), ConfigError> {
        if let Some(Json::Object(defaults)) = doc.get("__defaults") {
            self.apply_defaults(id, defaults)?;
        }
        let entries = doc
            .iter()
            .filter(|(key, _)| !key.starts_with("__"))
            .map(|(key, value)| (key.clone(), Value::from(value.clone())))
            .collect();
        self.load_entries(id, entries)?;
        if let Some(Json::Object(state)) = doc.get("__state") {
            self.apply_state(id, state)?;
        }
        Ok(())
    }
}

/// Document keys with no matching property, as dotted paths.
fn unknown_keys(tree: &ConfigTree, id: NodeId, doc: &Map<String, Json>) -> Vec<String> {
    let mut out = Vec::new();
    collect_unknown(tree, id, doc, &mut out);
    out
}

fn collect_unknown(tree: &ConfigTree, id: NodeId, doc: &Map<String, Json>, out: &mut Vec<String>) {
    let accepts_any = tree.class_of(id).entry_template().is_some();
    for (key, value) in doc {
        if key.starts_with("//") || key.starts_with("__") {
            continue;
        }
        match tree.index_of(id, key) {
            None if accepts_any => {}
            None => out.push(tree.path_of(id, key)),
            Some(index) => {
                if let (Json::Object(nested), Some(Value::Node(child))) =
                    (value, tree.descriptors(id)[index].value())
                {
                    collect_unknown(tree, *child, nested, out);
                }
            }
        }
    }
}

fn owner_locks_external(tree: &ConfigTree, path: &str) -> bool {
    let owner = match path.rsplit_once('.') {
        Some((parent, _)) => tree.node_at(parent),
        None => Some(tree.root()),
    };
    owner.is_some_and(|id| tree.class_of(id).options().lock_external)
}
