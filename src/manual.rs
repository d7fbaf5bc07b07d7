//! The `--help` manual.
//!
//! Lists the meta switches and one switch per leaf property, with its type,
//! default, description, and env alias.

use std::fmt::Write;

use serde_json::Value as Json;

use crate::merge::Leaf;
use crate::tree::ConfigTree;

/// Meta switches understood by every application, as `(switch, help)`.
pub const META_SWITCHES: &[(&str, &str)] = &[
    ("--help", "Print this manual and exit"),
    ("--exitOnConfig", "Write the resolved config file and exit"),
    ("--config <path>", "Read and write this config file"),
];

/// Render the manual for `tree`.
pub fn render(tree: &ConfigTree, app_name: &str, separator: &str) -> String {
    let leaves = tree.leaves(separator);
    let mut out = String::new();

    let _ = writeln!(out, "NAME");
    let _ = writeln!(out, "    {app_name}");
    let _ = writeln!(out);
    let _ = writeln!(out, "USAGE");
    let _ = writeln!(out, "    {app_name} [--<property> <value>]...");
    let _ = writeln!(out);

    let _ = writeln!(out, "META SWITCHES");
    for (switch, help) in META_SWITCHES {
        let _ = writeln!(out, "    {switch}");
        let _ = writeln!(out, "        {help}");
    }

    if !leaves.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "PROPERTY SWITCHES");
        for leaf in &leaves {
            write_leaf(&mut out, leaf);
        }
    }
    out
}

fn write_leaf(out: &mut String, leaf: &Leaf) {
    let _ = writeln!(out, "    --{} <{}>", leaf.flat_key, leaf.type_name);
    if let Some(description) = &leaf.description {
        let _ = writeln!(out, "        {description}");
    }
    if !leaf.choices.is_empty() {
        let _ = writeln!(out, "        [choices: {}]", leaf.choices.join(", "));
    }
    if let Some(default) = leaf.default.as_ref().filter(|d| !d.is_null()) {
        let _ = writeln!(out, "        [default: {}]", display_default(default));
    }
    if let Some(alias) = &leaf.env_alias {
        let _ = writeln!(out, "        [env: {alias}]");
    }
}

fn display_default(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::*;

    #[test]
    fn manual_lists_sections_in_order() {
        let tree = ConfigTree::new(&app_class()).unwrap();
        let text = render(&tree, "myapp", "-");
        let name = text.find("NAME").unwrap();
        let usage = text.find("USAGE").unwrap();
        let meta = text.find("META SWITCHES").unwrap();
        let props = text.find("PROPERTY SWITCHES").unwrap();
        assert!(name < usage && usage < meta && meta < props);
        assert!(text.contains("    myapp [--<property> <value>]..."));
        assert!(text.contains("--exitOnConfig"));
    }

    #[test]
    fn property_entries_show_type_default_and_description() {
        let tree = ConfigTree::new(&app_class()).unwrap();
        let text = render(&tree, "myapp", "-");
        assert!(text.contains(
            "    --port <integer>\n        The port number\n        [default: 8080]\n"
        ));
        assert!(text.contains("    --database-poolSize <unsignedInt>\n"));
        assert!(text.contains("    --host <string>\n        The application host\n        [default: localhost]\n"));
        assert!(text.contains("[choices: Red, Green, Blue]"));
    }

    #[test]
    fn alias_is_listed() {
        let tree = ConfigTree::new(&constrained_class()).unwrap();
        let text = render(&tree, "app", "-");
        assert!(text.contains("    --num <integer>\n        First number\n        [default: 5]\n        [env: numAlias]\n"));
    }

    #[test]
    fn properties_without_default_have_no_default_line() {
        let tree = ConfigTree::new(&app_class()).unwrap();
        let text = render(&tree, "myapp", "-");
        let start = text.find("--database-url").unwrap();
        let entry: String = text[start..].lines().take(3).collect::<Vec<_>>().join("\n");
        assert!(!entry.contains("[default"), "got:\n{entry}");
    }
}
