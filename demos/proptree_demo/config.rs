//! Schema for the proptree demo application.
//!
//! A root `Demo` class with two nested nodes, `server` and `display`, to
//! showcase hierarchical validation, enums, constraints, and env aliases.
//!
//! # Env var mapping
//!
//! With the prefix `PROPTREE_DEMO`, environment
//! variables map to dotted paths with `_` standing in for the separator:
//!
//! | Env var                                | Property                 |
//! |----------------------------------------|--------------------------|
//! | `PROPTREE_DEMO_NAME`                   | `name`                   |
//! | `PROPTREE_DEMO_VERBOSE`                | `verbose`                |
//! | `PROPTREE_DEMO_SERVER_HOST`            | `server.host`            |
//! | `PROPTREE_DEMO_SERVER_PORT` or `PORT`  | `server.port`            |
//! | `PROPTREE_DEMO_SERVER_MAXCONNECTIONS`  | `server.maxConnections`  |
//! | `PROPTREE_DEMO_DISPLAY_COLOR`          | `display.color`          |
//! | `PROPTREE_DEMO_DISPLAY_FORMAT`         | `display.format`         |

use std::sync::Arc;

use proptree::{ConfigClass, Constraint, EnumType, Property};

pub fn color() -> Arc<EnumType> {
    Arc::new(EnumType::strings(
        "Color",
        &[
            ("Red", "red"),
            ("Green", "green"),
            ("Yellow", "yellow"),
            ("Blue", "blue"),
            ("Magenta", "magenta"),
            ("Cyan", "cyan"),
        ],
    ))
}

pub fn format() -> Arc<EnumType> {
    Arc::new(EnumType::strings("Format", &[("Pretty", "pretty"), ("Plain", "plain")]))
}

/// Server settings, reachable as `server.*`.
pub fn server_class() -> Arc<ConfigClass> {
    ConfigClass::builder("Server")
        .property(
            "host",
            Property::string()
                .default_value("127.0.0.1")
                .description("Hostname to bind to"),
        )
        .property(
            "port",
            Property::integer()
                .default_value(3000)
                .min(1.0)
                .max(65535.0)
                .env_alias("PORT")
                .description("Port number"),
        )
        .property(
            "maxConnections",
            Property::unsigned_int()
                .default_value(100)
                .description("Maximum number of allowed connections")
                .constraint(
                    Constraint::new(|v, root| {
                        let verbose = root.get_bool("verbose").unwrap_or(false);
                        !verbose || v.as_i64().is_some_and(|n| n <= 10)
                    })
                    .fallback(10)
                    .reason("verbose mode allows at most 10 connections"),
                ),
        )
        .build()
}

/// Display settings, reachable as `display.*`.
pub fn display_class() -> Arc<ConfigClass> {
    ConfigClass::builder("Display")
        .property(
            "color",
            Property::enumeration(&color())
                .default_value("Yellow")
                .description("Terminal color for the echo output"),
        )
        .property(
            "format",
            Property::enumeration(&format())
                .default_value("Pretty")
                .description("Output format"),
        )
        .build()
}

/// Root schema.
pub fn demo_class() -> Arc<ConfigClass> {
    ConfigClass::builder("Demo")
        .debug(true)
        .create_if_missing(true)
        .property(
            "name",
            Property::string()
                .default_value("proptree-demo")
                .description("Application name shown in the echo banner"),
        )
        .property(
            "verbose",
            Property::boolean()
                .default_value(false)
                .description("Enable verbose output"),
        )
        .property("server", Property::node(&server_class()).description("Server settings"))
        .property("display", Property::node(&display_class()).description("Display settings"))
        .build()
}
