use burrow::schema::{canonical_yaml, SchemaDefinition};
use proc_macro2::TokenStream;
use quote::quote;

/// Embed the schema the types were generated from, so a program opens its
/// store with exactly the classes it was compiled against.
pub fn generate_schema_fn(schema: &SchemaDefinition) -> Result<TokenStream, burrow::BurrowError> {
    let yaml = canonical_yaml(schema)?;
    Ok(quote! {
        /// The schema these types were generated from, in canonical form.
        pub const SCHEMA_YAML: &str = #yaml;

        /// Parse [`SCHEMA_YAML`].
        pub fn schema() -> burrow::Result<burrow::SchemaDefinition> {
            burrow::parse_schema_str(SCHEMA_YAML)
        }
    })
}
