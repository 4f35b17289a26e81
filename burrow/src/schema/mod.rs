mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::*;

/// Hash the canonical YAML form of a schema. Used to detect schema changes on open.
pub fn hash_schema(schema: &SchemaDefinition) -> crate::Result<String> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = canonical_yaml(schema)?;
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}

/// Serialize a schema deterministically (classes and properties are ordered maps).
pub fn canonical_yaml(schema: &SchemaDefinition) -> crate::Result<String> {
    Ok(serde_yaml::to_string(schema)?)
}
