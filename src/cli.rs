//! Clap adapter for proptree.
//!
//! This module is the **optional integration layer** between the core and
//! the [clap](https://docs.rs/clap) CLI parser. It is compiled only when the
//! `clap` Cargo feature is enabled (on by default).
//!
//! Switches are derived from the schema at runtime: every leaf property
//! becomes `--<flat-key> <value>`, next to three meta switches (`--help`,
//! `--exitOnConfig`, `--config <path>`). Clap's own help and version flags
//! are disabled; `--help` prints the [`manual`](crate::manual) instead.
//!
//! The only bridge to the core is [`CliRequest::apply()`], which feeds the
//! parsed overrides into a [`ConfigLoader`]. If you use a different CLI
//! parser, call [`ConfigLoader::cli_args`] directly.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use tracing::debug;

use crate::error::ConfigError;
use crate::loader::{ConfigLoader, LoadReport};
use crate::manual;
use crate::tree::ConfigTree;

const HELP: &str = "help";
const EXIT_ON_CONFIG: &str = "exitOnConfig";
const CONFIG: &str = "config";

/// Runtime CLI built from a tree's leaves.
#[derive(Debug, Clone)]
pub struct ConfigCli {
    app_name: String,
    separator: String,
}

/// What the command line asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliRequest {
    /// `(flat key, raw value)` pairs in command-line order.
    pub overrides: Vec<(String, String)>,
    pub help: bool,
    pub exit_on_config: bool,
    pub config_file: Option<PathBuf>,
}

/// Whether the application should keep running after [`ConfigCli::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum CliOutcome {
    Continue(LoadReport),
    /// The request was fully served (manual printed or config written).
    Exit,
}

impl ConfigCli {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            separator: "-".into(),
        }
    }

    /// Separator joining path segments in switch names (default: `-`).
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Build the clap command for `tree`.
    pub fn command(&self, tree: &ConfigTree) -> Command {
        let mut command = Command::new(self.app_name.clone())
            .disable_help_flag(true)
            .disable_version_flag(true)
            .arg(Arg::new(HELP).long(HELP).action(ArgAction::SetTrue))
            .arg(
                Arg::new(EXIT_ON_CONFIG)
                    .long(EXIT_ON_CONFIG)
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new(CONFIG)
                    .long(CONFIG)
                    .value_name("path")
                    .value_parser(clap::value_parser!(PathBuf)),
            );

        for leaf in tree.leaves(&self.separator) {
            if [HELP, EXIT_ON_CONFIG, CONFIG].contains(&leaf.flat_key.as_str()) {
                debug!(key = %leaf.flat_key, "property switch shadowed by meta switch");
                continue;
            }
            let mut arg = Arg::new(leaf.flat_key.clone())
                .long(leaf.flat_key.clone())
                .value_name(leaf.type_name)
                .action(ArgAction::Set);
            if let Some(description) = &leaf.description {
                arg = arg.help(description.clone());
            }
            if leaf.type_name == "boolean" {
                arg = arg.num_args(0..=1).default_missing_value("true");
            }
            command = command.arg(arg);
        }
        command
    }

    /// Parse `args` (binary name first) against `tree`'s switches.
    pub fn parse_from<I, T>(&self, tree: &ConfigTree, args: I) -> Result<CliRequest, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = self
            .command(tree)
            .try_get_matches_from(args)
            .map_err(|e| ConfigError::Cli(e.to_string()))?;

        let mut overrides: Vec<(usize, String, String)> = Vec::new();
        for id in matches.ids() {
            let key = id.as_str();
            if [HELP, EXIT_ON_CONFIG, CONFIG].contains(&key) {
                continue;
            }
            let Some(value) = matches.get_one::<String>(key) else {
                continue;
            };
            let position = matches.index_of(key).unwrap_or(usize::MAX);
            overrides.push((position, key.to_string(), value.clone()));
        }
        overrides.sort_by_key(|(position, _, _)| *position);

        Ok(CliRequest {
            overrides: overrides
                .into_iter()
                .map(|(_, key, value)| (key, value))
                .collect(),
            help: matches.get_flag(HELP),
            exit_on_config: matches.get_flag(EXIT_ON_CONFIG),
            config_file: matches.get_one::<PathBuf>(CONFIG).cloned(),
        })
    }

    /// The `--help` text for `tree`.
    pub fn manual(&self, tree: &ConfigTree) -> String {
        manual::render(tree, &self.app_name, &self.separator)
    }

    /// Parse, then serve the request: print the manual, or load every
    /// source into `tree` and write the config file for `--exitOnConfig`.
    pub fn handle<I, T>(
        &self,
        tree: &mut ConfigTree,
        loader: ConfigLoader,
        args: I,
    ) -> Result<CliOutcome, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let request = self.parse_from(tree, args)?;
        if request.help {
            print!("{}", self.manual(tree));
            return Ok(CliOutcome::Exit);
        }
        let exit_on_config = request.exit_on_config;
        let loader = request.apply(loader.separator(&self.separator));
        let report = loader.load(tree)?;
        if exit_on_config {
            let path = loader.persist(tree)?;
            debug!(path = %path.display(), "config written, exiting");
            return Ok(CliOutcome::Exit);
        }
        Ok(CliOutcome::Continue(report))
    }
}

impl CliRequest {
    /// Feed the parsed overrides and `--config` path into `loader`.
    pub fn apply(self, loader: ConfigLoader) -> ConfigLoader {
        let loader = match self.config_file {
            Some(path) => loader.config_file(path),
            None => loader,
        };
        loader.cli_args(self.overrides)
    }
}
