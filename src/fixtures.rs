#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    use crate::schema::{ConfigClass, Constraint, Property};
    use crate::tree::ConfigTree;
    use crate::types::{EnumType, PropertyType};
    use crate::value::Value;

    pub fn color() -> Arc<EnumType> {
        Arc::new(EnumType::numeric("Color", &["Red", "Green", "Blue"]))
    }

    /// Database settings nested under `database`.
    pub fn database_class() -> Arc<ConfigClass> {
        ConfigClass::builder("Database")
            .property("url", Property::string().description("Connection string URL"))
            .property(
                "poolSize",
                Property::unsigned_int()
                    .default_value(5)
                    .description("Connection pool size"),
            )
            .build()
    }

    /// A typical application schema: scalars, an enum, an internal tagged
    /// property without default, a volatile property, and a nested node.
    pub fn app_class() -> Arc<ConfigClass> {
        ConfigClass::builder("App")
            .property(
                "host",
                Property::string()
                    .default_value("localhost")
                    .description("The application host"),
            )
            .property(
                "port",
                Property::integer()
                    .default_value(8080)
                    .min(1.0)
                    .max(65535.0)
                    .description("The port number"),
            )
            .property(
                "debug",
                Property::boolean()
                    .default_value(false)
                    .description("Enable debug mode"),
            )
            .property("color", Property::enumeration(&color()).default_value("Green"))
            .property("token", Property::string().tag("internal"))
            .property("session", Property::string().default_value("s-1").volatile())
            .property("database", Property::node(&database_class()))
            .build()
    }

    /// `num` falls back to 10 whenever it drops below 5.
    pub fn constrained_class() -> Arc<ConfigClass> {
        ConfigClass::builder("Constrained")
            .property(
                "num",
                Property::integer()
                    .default_value(5)
                    .description("First number")
                    .env_alias("numAlias")
                    .constraint(
                        Constraint::new(|v, _| v.as_i64().is_some_and(|n| n >= 5))
                            .fallback(10)
                            .reason("num must be at least 5"),
                    ),
            )
            .property(
                "num2",
                Property::integer()
                    .default_value(7)
                    .description("Second number"),
            )
            .build()
    }

    /// `num >= 5` without a fallback, starting from `default`.
    pub fn strict_class(default: i64) -> Arc<ConfigClass> {
        ConfigClass::builder("Strict")
            .property(
                "num",
                Property::integer().default_value(default).constraint(
                    Constraint::new(|v, _| v.as_i64().is_some_and(|n| n >= 5))
                        .reason("num must be at least 5"),
                ),
            )
            .build()
    }

    /// `child.b` depends on `a`, `child.grandchild.c` depends on `child.b`.
    pub fn cascade_class() -> Arc<ConfigClass> {
        let grandchild = ConfigClass::builder("Grandchild")
            .property(
                "c",
                Property::integer().default_value(5).constraint(
                    Constraint::new(|_, root| root.get_i64("child.b").is_some_and(|b| b >= 5))
                        .fallback(3)
                        .reason("c requires child.b >= 5"),
                ),
            )
            .build();
        let child = ConfigClass::builder("Child")
            .property(
                "b",
                Property::integer().default_value(5).constraint(
                    Constraint::new(|_, root| root.get_i64("a").is_some_and(|a| a >= 5))
                        .fallback(2)
                        .reason("b requires a >= 5"),
                ),
            )
            .property("grandchild", Property::node(&grandchild))
            .build();
        ConfigClass::builder("Cascade")
            .property("a", Property::integer().default_value(5))
            .property("child", Property::node(&child))
            .build()
    }

    pub fn server_class() -> Arc<ConfigClass> {
        ConfigClass::builder("Server")
            .property("host", Property::string())
            .property("port", Property::integer().default_value(80))
            .build()
    }

    /// An array of config nodes.
    pub fn fleet_class() -> Arc<ConfigClass> {
        ConfigClass::builder("Fleet")
            .property(
                "servers",
                Property::array(PropertyType::Node(server_class())).default_value(Vec::<Value>::new()),
            )
            .property(
                "palette",
                Property::array(PropertyType::Enum(color())).default_value(vec!["Red", "Blue"]),
            )
            .build()
    }

    /// A map-like node accepting arbitrary string entries.
    pub fn labels_class() -> Arc<ConfigClass> {
        let labels = ConfigClass::builder("Labels")
            .dynamic_entries(Property::string())
            .build();
        ConfigClass::builder("Tagged")
            .property("labels", Property::node(&labels))
            .build()
    }

    #[test]
    fn fixtures_construct() {
        for class in [
            app_class(),
            constrained_class(),
            cascade_class(),
            fleet_class(),
            labels_class(),
        ] {
            assert!(ConfigTree::new(&class).is_ok(), "{} failed", class.name());
        }
    }
}
