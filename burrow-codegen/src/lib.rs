//! Burrow code generation: typed record structs from schema.yaml, at build time.
//!
//! [`generate_from_schema`] reads a schema file and writes a Rust source file
//! with one struct per class (each with a `Default` impl applying the schema
//! defaults and an `Object` impl), plus the embedded schema. Include it with
//! `include!(concat!(env!("OUT_DIR"), "/generated.rs"))`.

mod generator;
mod schema_gen;
mod struct_gen;
pub mod type_utils;

use std::path::Path;

/// Generate record types from a schema.yaml file.
///
/// Reads the schema at `schema_path` and writes the generated code to
/// `output_path`. Meant to be called from a `build.rs` build script.
///
/// # Example
///
/// ```no_run
/// // In build.rs:
/// let out = std::path::Path::new(&std::env::var("OUT_DIR").unwrap()).join("generated.rs");
/// burrow_codegen::generate_from_schema("schema.yaml", out.to_str().unwrap()).unwrap();
/// ```
pub fn generate_from_schema(
    schema_path: &str,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = burrow::schema::parse_schema(Path::new(schema_path))?;
    std::fs::write(output_path, generate(&schema)?)?;
    Ok(())
}

/// Like [`generate_from_schema`] but takes the YAML directly and returns the
/// generated source.
pub fn generate_from_schema_str(schema_yaml: &str) -> Result<String, Box<dyn std::error::Error>> {
    let schema = burrow::schema::parse_schema_str(schema_yaml)?;
    generate(&schema)
}

pub fn generate(
    schema: &burrow::SchemaDefinition,
) -> Result<String, Box<dyn std::error::Error>> {
    let tokens = generator::generate_all(schema)?;
    Ok(generator::format_token_stream(&tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_SCHEMA: &str = r#"
classes:
  Dog:
    properties:
      name: { type: string, default: "" }
      age: { type: int, default: 0 }
  Person:
    properties:
      name: { type: string }
      picture: { type: string, optional: true }
      dogs: { type: list, target: Dog }
      best_friend: { type: object, target: Dog, optional: true }
"#;

    #[test]
    fn test_generate_demo_schema() {
        let result = generate_from_schema_str(DEMO_SCHEMA);
        assert!(result.is_ok(), "Generation failed: {:?}", result.err());
        let code = result.unwrap();

        assert!(
            syn::parse_file(&code).is_ok(),
            "Generated code is not valid Rust:\n{}",
            &code[..code.len().min(2000)]
        );
        assert!(code.starts_with("// @generated"));
        assert!(code.contains("pub struct Dog"));
        assert!(code.contains("pub struct Person"));
        assert!(code.contains("impl burrow::Object for Dog"));
        assert!(code.contains("pub dogs: burrow::List<Dog>"));
        assert!(code.contains("pub best_friend: burrow::Link<Dog>"));
        assert!(code.contains("pub picture: Option<String>"));
        assert!(code.contains("pub fn schema()"));
    }

    #[test]
    fn test_generate_all_property_types() {
        let schema = r#"
classes:
  Record:
    primary_key: code
    properties:
      code: { type: string }
      count: { type: int, default: 3 }
      ratio: { type: float, default: 0.5 }
      active: { type: bool, default: true }
      seen: { type: date, default: "2024-01-01" }
      type: { type: string, optional: true }
      parent: { type: object, target: Record }
"#;
        let code = generate_from_schema_str(schema).unwrap();
        assert!(
            syn::parse_file(&code).is_ok(),
            "Not valid Rust:\n{}",
            &code[..code.len().min(2000)]
        );
        assert!(code.contains("pub r#type: Option<String>"));
        assert!(code.contains("identified by its `code` property"));
        assert!(code.contains("chrono::DateTime<chrono::Utc>"));
        assert!(code.contains("ratio: 0.5f64"));
        assert!(code.contains("active: true"));
    }

    #[test]
    fn test_invalid_schema_is_an_error() {
        let schema = "classes: { Person: { properties: { dogs: { type: list, target: Cat } } } }";
        assert!(generate_from_schema_str(schema).is_err());
    }
}
