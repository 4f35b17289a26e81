use burrow::schema::{ClassDefinition, PropertyDefinition, PropertyType, SchemaDefinition};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

use crate::type_utils::{class_struct_name, default_expr, property_rust_type, safe_field_ident};

/// Generate a record struct, its `Default` impl and its `Object` impl for
/// every class. Classes and properties come out in name order.
pub fn generate_structs(schema: &SchemaDefinition) -> Result<TokenStream, burrow::BurrowError> {
    let mut tokens = TokenStream::new();
    for (class_name, class) in &schema.classes {
        tokens.extend(generate_class_struct(class_name, class)?);
    }
    Ok(tokens)
}

fn generate_class_struct(
    class_name: &str,
    class: &ClassDefinition,
) -> Result<TokenStream, burrow::BurrowError> {
    let struct_ident = format_ident!("{}", class_struct_name(class_name));
    let doc_comment = match &class.primary_key {
        Some(pk) => format!(" A `{class_name}` record, identified by its `{pk}` property."),
        None => format!(" A `{class_name}` record."),
    };

    let mut fields = Vec::new();
    let mut defaults = Vec::new();
    for (prop_name, prop) in &class.properties {
        let ident = safe_field_ident(prop_name);
        let ty = property_rust_type(prop);
        let attrs = field_attrs(&ident, prop_name, prop);
        fields.push(quote! {
            #attrs
            pub #ident: #ty,
        });

        let value = default_expr(prop)?;
        defaults.push(quote! { #ident: #value, });
    }

    Ok(quote! {
        #[doc = #doc_comment]
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        pub struct #struct_ident {
            #[serde(skip)]
            pub _id: Option<burrow::ObjectId>,
            #(#fields)*
        }

        impl Default for #struct_ident {
            fn default() -> Self {
                #struct_ident {
                    _id: None,
                    #(#defaults)*
                }
            }
        }

        impl burrow::Object for #struct_ident {
            const CLASS_NAME: &'static str = #class_name;

            fn object_id(&self) -> Option<&burrow::ObjectId> {
                self._id.as_ref()
            }

            fn set_object_id(&mut self, id: Option<burrow::ObjectId>) {
                self._id = id;
            }
        }
    })
}

/// Serde attributes for one field: a rename when the Rust name differs from
/// the property name, and the epoch-millis adapter for dates.
fn field_attrs(ident: &proc_macro2::Ident, prop_name: &str, prop: &PropertyDefinition) -> TokenStream {
    let ident_str = ident.to_string();
    let rename = if ident_str.trim_start_matches("r#") != prop_name {
        Some(quote! { #[serde(rename = #prop_name)] })
    } else {
        None
    };

    let with = match (prop.property_type, prop.optional) {
        (PropertyType::Date, false) => Some(quote! { #[serde(with = "burrow::value::date_millis")] }),
        (PropertyType::Date, true) => {
            Some(quote! { #[serde(with = "burrow::value::optional_date_millis")] })
        }
        _ => None,
    };

    quote! {
        #rename
        #with
    }
}
