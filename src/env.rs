use std::collections::HashMap;

use crate::merge::{KeyIndex, raw_to_value};
use crate::value::Value;

/// Resolve environment variables to `(dotted path, value)` overrides.
///
/// A variable matches a leaf by its explicit alias (exact name), or by the
/// leaf's flat key. With a prefix, `{PREFIX}_` is stripped first and the
/// rest is matched case-insensitively with `_` standing in for the
/// separator, so `MYAPP_DATABASE_POOLSIZE` reaches `database.poolSize`.
/// Without a prefix only exact flat keys match.
///
/// When both an alias and a flat key name the same leaf, the alias wins.
/// Results come back in leaf declaration order.
///
/// Takes an iterator so tests can pass synthetic data instead of `std::env::vars()`.
pub(crate) fn env_entries(
    prefix: Option<&str>,
    index: &KeyIndex<'_>,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, Value)> {
    let mut found: HashMap<String, (Value, bool)> = HashMap::new();

    for (key, raw) in vars {
        let (leaf, by_alias) = match index.lookup_alias(&key) {
            Some(leaf) => (leaf, true),
            None => {
                let leaf = match prefix {
                    Some(prefix) => strip_prefix(&key, prefix).and_then(|rest| index.lookup(rest)),
                    None => index.lookup_exact(&key),
                };
                let Some(leaf) = leaf else {
                    continue;
                };
                (leaf, false)
            }
        };
        if let Some((_, true)) = found.get(&leaf.path)
            && !by_alias
        {
            continue;
        }
        found.insert(leaf.path.clone(), (raw_to_value(&raw, leaf), by_alias));
    }

    let mut entries: Vec<(String, Value)> = found
        .into_iter()
        .map(|(path, (value, _))| (path, value))
        .collect();
    entries.sort_by_key(|(path, _)| index.position(path));
    entries
}

fn strip_prefix<'k>(key: &'k str, prefix: &str) -> Option<&'k str> {
    let head = key.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = key[prefix.len()..].strip_prefix('_')?;
    (!rest.is_empty()).then_some(rest)
}
