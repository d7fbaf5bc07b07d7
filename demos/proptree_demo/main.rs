//! # proptree demo application
//!
//! A sample CLI tool that showcases how to integrate proptree into a real
//! application. This is **not** a real app; it exists purely to demonstrate
//! and manually verify proptree's features.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example proptree_demo
//! cargo run --example proptree_demo -- --help
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature                  | How to exercise it                                                       |
//! |--------------------------|--------------------------------------------------------------------------|
//! | Declared defaults        | `cargo run --example proptree_demo`                                      |
//! | Config file              | Edit `proptree-demo.json` in the platform config dir (created on first run) |
//! | Env var override         | `PROPTREE_DEMO_DISPLAY_COLOR=Red cargo run --example proptree_demo`      |
//! | Env alias                | `PORT=9999 cargo run --example proptree_demo`                            |
//! | CLI override (nested)    | `cargo run --example proptree_demo -- --server-port 8080`                |
//! | Boolean switch           | `cargo run --example proptree_demo -- --verbose`                         |
//! | Constraint fallback      | `cargo run --example proptree_demo -- --verbose --server-maxConnections 50` |
//! | Manual                   | `cargo run --example proptree_demo -- --help`                            |
//! | Write config and exit    | `cargo run --example proptree_demo -- --server-host 0.0.0.0 --exitOnConfig` |
//! | Explicit config file     | `cargo run --example proptree_demo -- --config ./demo.toml --exitOnConfig` |
//! | Tracing output           | `RUST_LOG=proptree=debug cargo run --example proptree_demo`              |

mod config;

use proptree::{CliOutcome, ConfigCli, ConfigLoader, ConfigTree};
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "proptree-demo";

// ---------------------------------------------------------------------------
// ANSI color helpers
// ---------------------------------------------------------------------------

fn ansi_color_code(name: &str) -> &str {
    match name {
        "red" => "\x1b[31m",
        "green" => "\x1b[32m",
        "yellow" => "\x1b[33m",
        "blue" => "\x1b[34m",
        "magenta" => "\x1b[35m",
        "cyan" => "\x1b[36m",
        _ => "\x1b[0m",
    }
}

const RESET: &str = "\x1b[0m";

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn echo_all(tree: &ConfigTree) {
    let root = tree.root_ref();
    let color = ansi_color_code(root.get_str("display.color").unwrap_or_default());

    if root.get_bool("verbose").unwrap_or(false) {
        println!(
            "{color}[verbose] Resolved configuration for {:?}{RESET}",
            root.get_str("name").unwrap_or_default()
        );
        for fallback in tree.fallbacks() {
            println!("{color}[verbose] {}: {}{RESET}", fallback.path, fallback.reason);
        }
        println!();
    }

    let entries: Vec<(String, String)> = tree
        .leaves(".")
        .into_iter()
        .map(|leaf| {
            let value = tree
                .get_json(&leaf.path)
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_default();
            (leaf.path, value)
        })
        .collect();

    if root.get_str("display.format") == Some("plain") {
        for (key, value) in &entries {
            println!("{key}={value}");
        }
    } else {
        let max_key_len = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &entries {
            println!("{color}{key:<max_key_len$}{RESET}  {value}");
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut tree = ConfigTree::new(&config::demo_class()).unwrap_or_else(|e| {
        eprintln!("Invalid schema:\n{e}");
        std::process::exit(1);
    });

    let loader = ConfigLoader::new()
        .app_name(APP_NAME)
        .env_prefix("PROPTREE_DEMO");
    let outcome = ConfigCli::new(APP_NAME)
        .handle(&mut tree, loader, std::env::args())
        .unwrap_or_else(|e| {
            eprintln!("Failed to load config:\n{e}");
            std::process::exit(1);
        });

    match outcome {
        CliOutcome::Exit => std::process::exit(0),
        CliOutcome::Continue(_) => echo_all(&tree),
    }
}
