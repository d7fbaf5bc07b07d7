//! Config file discovery, reading, and writing.
//!
//! A [`SearchPath`] resolves to a directory; the config file is
//! `{dir}/{file_name}`. Documents are plain JSON objects on disk, or TOML
//! when the file name ends in `.toml`. Either way they are handed to the
//! rest of the crate as a `serde_json` object.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json};

use crate::error::ConfigError;
use crate::types::{FileFormat, SearchPath};

/// Resolve a [`SearchPath`] to a concrete directory.
///
/// `app_name` is used by `SearchPath::Platform` to construct the platform-specific
/// config directory (e.g. `~/.config/{app_name}/` on Linux).
///
/// Returns `None` if the path cannot be resolved (e.g. no home directory found).
pub fn resolve_search_path(sp: &SearchPath, app_name: &str) -> Option<PathBuf> {
    match sp {
        SearchPath::Platform => {
            let proj = directories::ProjectDirs::from("", "", app_name)?;
            Some(proj.config_dir().to_path_buf())
        }
        SearchPath::Home(subdir) => {
            let user = directories::UserDirs::new()?;
            Some(user.home_dir().join(subdir))
        }
        SearchPath::Cwd => std::env::current_dir().ok(),
        SearchPath::Path(p) => Some(p.clone()),
    }
}

/// Read and parse a config document.
///
/// A missing file is `Ok(None)`, including one whose parent is not a
/// directory. Anything else that goes wrong is an error for the caller to
/// swallow or surface.
pub fn read_document(path: &Path) -> Result<Option<Map<String, Json>>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    parse_document(&content, path).map(Some)
}

pub(crate) fn is_missing(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

/// Parse document text, choosing the format from the file extension.
pub fn parse_document(content: &str, path: &Path) -> Result<Map<String, Json>, ConfigError> {
    let parse_error = |reason: String| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    match FileFormat::from_path(path) {
        FileFormat::Json => match serde_json::from_str::<Json>(content) {
            Ok(Json::Object(map)) => Ok(map),
            Ok(other) => Err(parse_error(format!(
                "expected a top-level object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(parse_error(e.to_string())),
        },
        FileFormat::Toml => {
            let table: toml::Table = content.parse().map_err(|e: toml::de::Error| parse_error(e.to_string()))?;
            Ok(table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect())
        }
    }
}

/// Write document text, creating parent directories as needed.
pub fn write_document(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn toml_to_json(value: toml::Value) -> Json {
    match value {
        toml::Value::String(s) => Json::String(s),
        toml::Value::Integer(i) => Json::from(i),
        toml::Value::Float(f) => Json::from(f),
        toml::Value::Boolean(b) => Json::Bool(b),
        toml::Value::Datetime(d) => Json::String(d.to_string()),
        toml::Value::Array(items) => Json::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Json::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolve_explicit_path() {
        let p = PathBuf::from("/tmp/test");
        let resolved = resolve_search_path(&SearchPath::Path(p.clone()), "myapp");
        assert_eq!(resolved, Some(p));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let doc = read_document(&dir.path().join("absent.json")).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn path_under_a_regular_file_is_none() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let doc = read_document(&blocker.join("app.json")).unwrap();
        assert!(doc.is_none());
        assert!(write_document(&blocker.join("app.json"), "{}\n").is_err());
    }

    #[test]
    fn json_document_keeps_key_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"b": 1, "a": {"x": true}}"#).unwrap();
        let doc = read_document(&path).unwrap().unwrap();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(doc["a"], json!({"x": true}));
    }

    #[test]
    fn toml_document_converts_to_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(
            &path,
            "port = 3000\nwhen = 1979-05-27T07:32:00Z\n\n[database]\nurl = \"pg://\"\n",
        )
        .unwrap();
        let doc = read_document(&path).unwrap().unwrap();
        assert_eq!(doc["port"], json!(3000));
        assert_eq!(doc["when"], json!("1979-05-27T07:32:00Z"));
        assert_eq!(doc["database"], json!({"url": "pg://"}));
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "[1, 2]").unwrap();
        match read_document(&path) {
            Err(ConfigError::Parse { reason, .. }) => assert!(reason.contains("an array")),
            other => panic!("Expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn broken_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_document(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn unreadable_file_returns_io_error() {
        let dir = TempDir::new().unwrap();
        // A directory in place of the file fails to read as text.
        let path = dir.path().join("app.json");
        fs::create_dir(&path).unwrap();
        match read_document(&path) {
            Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected Io, got {other:?}"),
        }
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.json");
        write_document(&path, "{}\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
