use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum ConfigError {
    /// The value cannot be coerced to the declared type.
    #[error("Invalid value for '{path}': {reason}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::format)))]
    Format { path: String, reason: String },

    /// A numeric value lies outside the declared `min`/`max`.
    #[error("Value for '{path}' out of range: {reason}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::range)))]
    Range { path: String, reason: String },

    /// A custom assertion rejected the value and no fallback was declared.
    #[error("Constraint failed for '{path}': {reason}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::constraint)))]
    Constraint { path: String, reason: String },

    #[error("Property '{path}' is readonly")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(proptree::readonly),
            help("the value was locked by an external source; set softReadonly to accept writes")
        )
    )]
    Readonly { path: String },

    /// Every violation collected by one whole-tree validation pass.
    #[error("{}", join_messages(.0))]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::aggregate)))]
    Aggregate(#[cfg_attr(feature = "rich-errors", related)] Vec<ConfigError>),

    #[error("Unknown property '{0}'")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::unknown_property)))]
    UnknownProperty(String),

    #[error("Unknown keys in {path}: {}", .keys.join(", "))]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::unknown_keys)))]
    UnknownKeys { path: PathBuf, keys: Vec<String> },

    #[error("Failed to read {path}: {source}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::io)))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::parse)))]
    Parse { path: PathBuf, reason: String },

    #[error("Command line error: {0}")]
    #[cfg_attr(feature = "rich-errors", diagnostic(code(proptree::cli)))]
    Cli(String),
}

impl ConfigError {
    /// The individual violations carried by this error.
    ///
    /// An [`Aggregate`](ConfigError::Aggregate) yields its members, any other
    /// variant yields itself.
    pub fn violations(&self) -> &[ConfigError] {
        match self {
            ConfigError::Aggregate(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }

    /// Owned counterpart of [`violations`](Self::violations), flattening
    /// nested aggregates.
    pub fn into_violations(self) -> Vec<ConfigError> {
        match self {
            ConfigError::Aggregate(errors) => errors
                .into_iter()
                .flat_map(ConfigError::into_violations)
                .collect(),
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
