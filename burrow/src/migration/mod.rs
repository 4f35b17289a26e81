use crate::error::Result;
use crate::schema::SchemaDefinition;
use crate::storage::StoreDb;
use std::collections::BTreeSet;

/// A single schema change detected between two schema versions.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaMigration {
    ClassAdded {
        name: String,
    },
    ClassRemoved {
        name: String,
    },
    PropertyAdded {
        class: String,
        property: String,
        has_default: bool,
        optional: bool,
    },
    PropertyRemoved {
        class: String,
        property: String,
    },
    PropertyTypeChanged {
        class: String,
        property: String,
    },
    LinkTargetChanged {
        class: String,
        property: String,
    },
    DefaultChanged {
        class: String,
        property: String,
    },
    MadeOptional {
        class: String,
        property: String,
    },
    MadeRequired {
        class: String,
        property: String,
    },
    IndexChanged {
        class: String,
        property: String,
        indexed: bool,
    },
    DeletePolicyChanged {
        class: String,
        property: String,
    },
    PrimaryKeyChanged {
        class: String,
    },
}

impl SchemaMigration {
    /// Whether the change can be applied to existing data without losing or
    /// invalidating anything.
    pub fn is_safe(&self) -> bool {
        match self {
            SchemaMigration::ClassAdded { .. }
            | SchemaMigration::DefaultChanged { .. }
            | SchemaMigration::MadeOptional { .. }
            | SchemaMigration::IndexChanged { .. }
            | SchemaMigration::DeletePolicyChanged { .. } => true,
            SchemaMigration::PropertyAdded {
                has_default,
                optional,
                ..
            } => *has_default || *optional,
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SchemaMigration::ClassAdded { name } => format!("Class '{name}' added"),
            SchemaMigration::ClassRemoved { name } => {
                format!("Class '{name}' removed (stored objects would be orphaned)")
            }
            SchemaMigration::PropertyAdded {
                class,
                property,
                has_default,
                optional,
            } => {
                let qualifier = if *has_default {
                    " (has default, will backfill)"
                } else if *optional {
                    " (optional, will backfill nil)"
                } else {
                    " (required, no default)"
                };
                format!("Property '{class}.{property}' added{qualifier}")
            }
            SchemaMigration::PropertyRemoved { class, property } => {
                format!("Property '{class}.{property}' removed")
            }
            SchemaMigration::PropertyTypeChanged { class, property } => {
                format!("Property '{class}.{property}' type changed")
            }
            SchemaMigration::LinkTargetChanged { class, property } => {
                format!("Link '{class}.{property}' target changed")
            }
            SchemaMigration::DefaultChanged { class, property } => {
                format!("Default value for '{class}.{property}' changed")
            }
            SchemaMigration::MadeOptional { class, property } => {
                format!("Property '{class}.{property}' made optional")
            }
            SchemaMigration::MadeRequired { class, property } => {
                format!("Property '{class}.{property}' made required")
            }
            SchemaMigration::IndexChanged {
                class,
                property,
                indexed,
            } => {
                let action = if *indexed { "added" } else { "removed" };
                format!("Index on '{class}.{property}' {action}")
            }
            SchemaMigration::DeletePolicyChanged { class, property } => {
                format!("Delete policy for link '{class}.{property}' changed")
            }
            SchemaMigration::PrimaryKeyChanged { class } => {
                format!("Primary key of '{class}' changed")
            }
        }
    }
}

/// Compare two schema versions and list the changes, in class and property order.
pub fn diff_schemas(old: &SchemaDefinition, new: &SchemaDefinition) -> Vec<SchemaMigration> {
    let mut migrations = Vec::new();

    let names: BTreeSet<&String> = old.classes.keys().chain(new.classes.keys()).collect();
    for name in names {
        let (old_class, new_class) = match (old.classes.get(name), new.classes.get(name)) {
            (None, Some(_)) => {
                migrations.push(SchemaMigration::ClassAdded { name: name.clone() });
                continue;
            }
            (Some(_), None) => {
                migrations.push(SchemaMigration::ClassRemoved { name: name.clone() });
                continue;
            }
            (Some(o), Some(n)) => (o, n),
            (None, None) => continue,
        };

        if old_class.primary_key != new_class.primary_key {
            migrations.push(SchemaMigration::PrimaryKeyChanged {
                class: name.clone(),
            });
        }

        let props: BTreeSet<&String> = old_class
            .properties
            .keys()
            .chain(new_class.properties.keys())
            .collect();

        for prop_name in props {
            let class = name.clone();
            let property = prop_name.clone();
            let (old_prop, new_prop) = match (
                old_class.properties.get(prop_name),
                new_class.properties.get(prop_name),
            ) {
                (None, Some(p)) => {
                    migrations.push(SchemaMigration::PropertyAdded {
                        class,
                        property,
                        // Links have a natural empty value.
                        has_default: p.default.is_some() || p.property_type.is_link(),
                        optional: p.optional,
                    });
                    continue;
                }
                (Some(_), None) => {
                    migrations.push(SchemaMigration::PropertyRemoved { class, property });
                    continue;
                }
                (Some(o), Some(n)) => (o, n),
                (None, None) => continue,
            };

            if old_prop.property_type != new_prop.property_type {
                migrations.push(SchemaMigration::PropertyTypeChanged { class, property });
                continue;
            }
            if old_prop.target != new_prop.target {
                migrations.push(SchemaMigration::LinkTargetChanged {
                    class: class.clone(),
                    property: property.clone(),
                });
            }
            if old_prop.default != new_prop.default {
                migrations.push(SchemaMigration::DefaultChanged {
                    class: class.clone(),
                    property: property.clone(),
                });
            }
            match (old_prop.optional, new_prop.optional) {
                (false, true) => migrations.push(SchemaMigration::MadeOptional {
                    class: class.clone(),
                    property: property.clone(),
                }),
                (true, false) => migrations.push(SchemaMigration::MadeRequired {
                    class: class.clone(),
                    property: property.clone(),
                }),
                _ => {}
            }
            if old_prop.indexed != new_prop.indexed {
                migrations.push(SchemaMigration::IndexChanged {
                    class: class.clone(),
                    property: property.clone(),
                    indexed: new_prop.indexed,
                });
            }
            if old_prop.effective_on_delete() != new_prop.effective_on_delete() {
                migrations.push(SchemaMigration::DeletePolicyChanged { class, property });
            }
        }
    }

    migrations
}

/// The changes that cannot be applied automatically.
pub fn unsafe_migrations(migrations: &[SchemaMigration]) -> Vec<&SchemaMigration> {
    migrations.iter().filter(|m| !m.is_safe()).collect()
}

/// Apply safe migrations to stored objects: newly added properties get their
/// default written into every existing object of the class. Must run inside a
/// write transaction. Returns the number of objects rewritten.
pub fn backfill(
    store: &StoreDb,
    schema: &SchemaDefinition,
    migrations: &[SchemaMigration],
) -> Result<usize> {
    let mut rewritten = 0;
    for migration in migrations {
        let SchemaMigration::PropertyAdded {
            class, property, ..
        } = migration
        else {
            continue;
        };
        let prop = schema.class(class)?.property(property).ok_or_else(|| {
            crate::BurrowError::Schema(format!("Property '{class}.{property}' not found"))
        })?;
        let default = prop.default_json()?;

        for record in store.list_objects(class)? {
            let mut data = record.parse_data()?;
            if let Some(map) = data.as_object_mut() {
                if map.contains_key(property) {
                    continue;
                }
                map.insert(property.clone(), default.clone());
            }
            store.upsert_object(class, &record.id, &data)?;
            rewritten += 1;
        }
        log::debug!("Backfilled '{class}.{property}'");
    }
    Ok(rewritten)
}
