//! Loading pre-parsed payloads into a public subtree.
//!
//! A front end receives the projection of one subtree (usually with
//! `attach_state`) and loads it back into its own copy of the schema.
//! The payload goes through the same steps as a file: `__defaults`, then
//! values, then `__state`. With the `url` feature, query parameters using
//! the flat key convention can be layered on top.

use serde_json::Value as Json;

use crate::error::ConfigError;
use crate::tree::ConfigTree;

#[cfg(feature = "url")]
use serde_json::Map;

impl ConfigTree {
    /// Load `payload` into the node at `public_path` (empty for the root).
    pub fn inject(&mut self, public_path: &str, payload: &Json) -> Result<(), ConfigError> {
        let id = if public_path.is_empty() {
            self.root()
        } else {
            self.node_at(public_path)
                .ok_or_else(|| ConfigError::UnknownProperty(public_path.to_string()))?
        };
        let Json::Object(doc) = payload else {
            return Err(ConfigError::Format {
                path: public_path.to_string(),
                reason: format!("expected an object payload, got {payload}"),
            });
        };
        self.load_document(id, doc)
    }

    /// [`inject`](Self::inject) with URL query parameters merged over the
    /// payload.
    #[cfg(feature = "url")]
    pub fn inject_with_query(
        &mut self,
        public_path: &str,
        payload: &Json,
        query: &str,
        separator: &str,
    ) -> Result<(), ConfigError> {
        let base = match payload {
            Json::Object(doc) => doc.clone(),
            Json::Null => Map::new(),
            other => {
                return Err(ConfigError::Format {
                    path: public_path.to_string(),
                    reason: format!("expected an object payload, got {other}"),
                });
            }
        };
        let merged = crate::merge::deep_merge(base, parse_query(query, separator));
        self.inject(public_path, &Json::Object(merged))
    }
}

/// Parse a URL query string into a nested object.
///
/// `?database-poolSize=10&debug=true` becomes
/// `{"database": {"poolSize": "10"}, "debug": true}`. Keys are split on
/// `separator`, `+` decodes to a space, and `true`/`false` become booleans.
/// Later parameters win.
#[cfg(feature = "url")]
pub fn parse_query(query: &str, separator: &str) -> Map<String, Json> {
    let mut out = Map::new();
    let query = query.strip_prefix('?').unwrap_or(query);
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(raw_key);
        if key.is_empty() {
            continue;
        }
        let value = decode(raw_value);
        let value = if value.eq_ignore_ascii_case("true") {
            Json::Bool(true)
        } else if value.eq_ignore_ascii_case("false") {
            Json::Bool(false)
        } else {
            Json::String(value)
        };
        let segments: Vec<&str> = key.split(separator).collect();
        insert_nested(&mut out, &segments, value);
    }
    out
}

#[cfg(feature = "url")]
fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(feature = "url")]
fn insert_nested(map: &mut Map<String, Json>, segments: &[&str], value: Json) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.to_string(), value);
        return;
    }
    let slot = map
        .entry(head.to_string())
        .or_insert_with(|| Json::Object(Map::new()));
    if !slot.is_object() {
        *slot = Json::Object(Map::new());
    }
    if let Json::Object(nested) = slot {
        insert_nested(nested, rest, value);
    }
}
