use burrow::schema::SchemaDefinition;
use proc_macro2::TokenStream;

use crate::schema_gen::generate_schema_fn;
use crate::struct_gen::generate_structs;

const HEADER: &str = "// @generated by burrow-codegen from schema.yaml. Do not edit.\n\n";

/// Generate all code for a schema: the embedded schema, then one record
/// struct per class.
pub fn generate_all(schema: &SchemaDefinition) -> Result<TokenStream, burrow::BurrowError> {
    let mut tokens = generate_schema_fn(schema)?;
    tokens.extend(generate_structs(schema)?);
    Ok(tokens)
}

/// Pretty-print a token stream as a Rust source file.
pub fn format_token_stream(tokens: &TokenStream) -> Result<String, syn::Error> {
    let file: syn::File = syn::parse2(tokens.clone())?;
    Ok(format!("{HEADER}{}", prettyplease::unparse(&file)))
}
