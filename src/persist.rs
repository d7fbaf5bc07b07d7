//! Rendering projected documents to file text.
//!
//! JSON files get the projection as-is, pretty-printed. TOML files are
//! built with `toml_edit` so that `//[name]` description keys become real
//! `#` comments above the key (or table header) they describe. TOML has no
//! null, so null values are dropped.

use serde_json::{Map, Value as Json};

use crate::error::ConfigError;
use crate::types::FileFormat;

/// Render a document in the given format.
pub fn render_document(doc: &Map<String, Json>, format: FileFormat) -> Result<String, ConfigError> {
    match format {
        FileFormat::Json => {
            let mut text = serde_json::to_string_pretty(doc).map_err(|e| ConfigError::Parse {
                path: "<projection>".into(),
                reason: e.to_string(),
            })?;
            text.push('\n');
            Ok(text)
        }
        FileFormat::Toml => {
            let mut document = toml_edit::DocumentMut::new();
            fill_table(document.as_table_mut(), doc);
            Ok(document.to_string())
        }
    }
}

fn fill_table(table: &mut toml_edit::Table, obj: &Map<String, Json>) {
    for (key, value) in obj {
        if description_target(key).is_some() {
            continue;
        }
        let comment = obj
            .get(&format!("//[{key}]"))
            .and_then(Json::as_str)
            .map(|text| format!("# {text}\n"));

        match value {
            Json::Object(nested) => {
                let mut sub = toml_edit::Table::new();
                fill_table(&mut sub, nested);
                if let Some(comment) = comment {
                    sub.decor_mut().set_prefix(comment);
                }
                table.insert(key, toml_edit::Item::Table(sub));
            }
            Json::Array(items) if !items.is_empty() && items.iter().all(Json::is_object) => {
                let mut array = toml_edit::ArrayOfTables::new();
                for item in items.iter().filter_map(Json::as_object) {
                    let mut sub = toml_edit::Table::new();
                    fill_table(&mut sub, item);
                    array.push(sub);
                }
                table.insert(key, toml_edit::Item::ArrayOfTables(array));
            }
            other => {
                let Some(value) = to_toml_value(other) else {
                    continue;
                };
                table.insert(key, toml_edit::Item::Value(value));
                if let Some(comment) = comment
                    && let Some(mut key_mut) = table.key_mut(key)
                {
                    key_mut.leaf_decor_mut().set_prefix(comment);
                }
            }
        }
    }
}

fn description_target(key: &str) -> Option<&str> {
    key.strip_prefix("//[")?.strip_suffix(']')
}

fn to_toml_value(value: &Json) -> Option<toml_edit::Value> {
    match value {
        Json::Null => None,
        Json::Bool(b) => Some((*b).into()),
        Json::Number(n) => n
            .as_i64()
            .map(toml_edit::Value::from)
            .or_else(|| n.as_f64().map(toml_edit::Value::from)),
        Json::String(s) => Some(s.as_str().into()),
        Json::Array(items) => Some(toml_edit::Value::Array(
            items.iter().filter_map(to_toml_value).collect(),
        )),
        Json::Object(obj) => {
            let mut inline = toml_edit::InlineTable::new();
            for (key, value) in obj {
                if let Some(value) = to_toml_value(value) {
                    inline.insert(key.as_str(), value);
                }
            }
            Some(toml_edit::Value::InlineTable(inline))
        }
    }
}
