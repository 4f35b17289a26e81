use burrow::schema::{PropertyDefinition, PropertyType};
use heck::{ToPascalCase, ToSnakeCase};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

/// Struct name for a schema class. Class names are usually PascalCase
/// already; anything else is converted.
/// e.g. "Dog" -> "Dog", "dog_walker" -> "DogWalker"
pub fn class_struct_name(class_name: &str) -> String {
    class_name.to_pascal_case()
}

/// The Rust type of a property's field.
pub fn property_rust_type(prop: &PropertyDefinition) -> TokenStream {
    let target = || {
        let name = prop.target.as_deref().unwrap_or_default();
        format_ident!("{}", class_struct_name(name))
    };

    let base = match prop.property_type {
        PropertyType::String => quote! { String },
        PropertyType::Int => quote! { i64 },
        PropertyType::Float => quote! { f64 },
        PropertyType::Bool => quote! { bool },
        PropertyType::Date => quote! { chrono::DateTime<chrono::Utc> },
        // Links carry their own emptiness.
        PropertyType::Object => {
            let target = target();
            return quote! { burrow::Link<#target> };
        }
        PropertyType::List => {
            let target = target();
            return quote! { burrow::List<#target> };
        }
    };

    if prop.optional {
        quote! { Option<#base> }
    } else {
        base
    }
}

/// Expression producing a property's default value in a generated
/// `Default` impl. Mirrors the values the database fills in when a stored
/// object omits the property.
pub fn default_expr(prop: &PropertyDefinition) -> Result<TokenStream, burrow::BurrowError> {
    let json = match prop.property_type {
        PropertyType::Object => return Ok(quote! { burrow::Link::empty() }),
        PropertyType::List => return Ok(quote! { burrow::List::new() }),
        _ => prop.default_json()?,
    };
    if json.is_null() {
        return Ok(quote! { None });
    }

    let value = match prop.property_type {
        PropertyType::String => {
            let s = json.as_str().unwrap_or_default();
            quote! { #s.to_string() }
        }
        PropertyType::Int => {
            let n = Literal::i64_suffixed(json.as_i64().unwrap_or_default());
            quote! { #n }
        }
        PropertyType::Float => {
            let f = Literal::f64_suffixed(json.as_f64().unwrap_or_default());
            quote! { #f }
        }
        PropertyType::Bool => {
            if json.as_bool().unwrap_or_default() {
                quote! { true }
            } else {
                quote! { false }
            }
        }
        // date
        _ => {
            let millis = Literal::i64_suffixed(json.as_i64().unwrap_or_default());
            quote! { burrow::value::millis_to_date(#millis).unwrap_or_default() }
        }
    };

    Ok(if prop.optional {
        quote! { Some(#value) }
    } else {
        value
    })
}

/// Field identifier for a property name, using raw identifiers for keywords.
pub fn safe_field_ident(name: &str) -> proc_macro2::Ident {
    match name {
        "type" | "struct" | "enum" | "fn" | "let" | "mut" | "ref" | "super" | "mod" | "use"
        | "pub" | "impl" | "trait" | "for" | "loop" | "while" | "if" | "else" | "match"
        | "return" | "break" | "continue" | "as" | "in" | "where" | "async" | "await" | "dyn"
        | "move" | "static" | "const" | "unsafe" | "extern" | "true" | "false" | "abstract"
        | "become" | "box" | "do" | "final" | "macro" | "override" | "priv" | "typeof"
        | "unsized" | "virtual" | "yield" | "try" => format_ident!("r#{}", name),
        _ => format_ident!("{}", name.to_snake_case()),
    }
}
