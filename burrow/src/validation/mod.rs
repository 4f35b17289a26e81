use crate::error::{BurrowError, Result};
use crate::object::ObjectId;
use crate::schema::{ClassDefinition, PropertyDefinition, PropertyType};

/// Result of validating an object's data
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Validate an object's JSON data against its class definition.
/// With `strict` on, properties unknown to the class are errors; otherwise they
/// are reported as warnings (used when re-checking stored data after a schema change).
pub fn validate_object(
    class_name: &str,
    class: &ClassDefinition,
    data: &serde_json::Value,
    strict: bool,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    let map = match data.as_object() {
        Some(m) => m,
        None => {
            result
                .errors
                .push(format!("{class_name} data must be a JSON object"));
            return result;
        }
    };

    for (prop_name, prop) in &class.properties {
        match map.get(prop_name) {
            None => result
                .errors
                .push(format!("Property '{class_name}.{prop_name}' is missing")),
            Some(value) => {
                if let Some(issue) = check_value(prop, value) {
                    result
                        .errors
                        .push(format!("Property '{class_name}.{prop_name}' {issue}"));
                }
            }
        }
    }

    for key in map.keys() {
        if !class.properties.contains_key(key) {
            let msg = format!("Unexpected property '{class_name}.{key}'");
            if strict {
                result.errors.push(msg);
            } else {
                result.warnings.push(msg);
            }
        }
    }

    result
}

/// Fill in defaults for properties the data does not mention.
pub fn apply_defaults(class: &ClassDefinition, data: &mut serde_json::Value) -> Result<()> {
    let map = match data.as_object_mut() {
        Some(m) => m,
        None => return Ok(()),
    };

    for (prop_name, prop) in &class.properties {
        if !map.contains_key(prop_name) {
            map.insert(prop_name.clone(), prop.default_json()?);
        }
    }
    Ok(())
}

/// Apply defaults and validate strictly, failing on the first batch of errors.
pub fn validate_and_prepare(
    class_name: &str,
    class: &ClassDefinition,
    data: &mut serde_json::Value,
) -> Result<()> {
    apply_defaults(class, data)?;
    let result = validate_object(class_name, class, data, true);
    if !result.is_ok() {
        return Err(BurrowError::Validation(result.errors.join("; ")));
    }
    Ok(())
}

/// The link targets held by each link property of a validated object.
pub fn extract_links<'a>(
    class: &'a ClassDefinition,
    data: &serde_json::Value,
) -> Vec<(&'a str, &'a str, Vec<ObjectId>)> {
    let mut links = Vec::new();
    for (prop_name, prop) in class.link_properties() {
        let Some(target) = prop.target.as_deref() else {
            continue;
        };
        let ids = match data.get(prop_name) {
            Some(serde_json::Value::String(id)) => vec![ObjectId::new(id.as_str())],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(ObjectId::new)
                .collect(),
            _ => Vec::new(),
        };
        links.push((prop_name.as_str(), target, ids));
    }
    links
}

fn check_value(prop: &PropertyDefinition, value: &serde_json::Value) -> Option<String> {
    if value.is_null() {
        if prop.optional || prop.property_type == PropertyType::Object {
            return None;
        }
        return Some("is not optional but is null".to_string());
    }

    let ok = match prop.property_type {
        PropertyType::String => value.is_string(),
        PropertyType::Int | PropertyType::Date => value.is_i64(),
        PropertyType::Float => value.is_number(),
        PropertyType::Bool => value.is_boolean(),
        PropertyType::Object => value.is_string(),
        PropertyType::List => value
            .as_array()
            .map(|items| items.iter().all(|v| v.is_string()))
            .unwrap_or(false),
    };

    if ok {
        None
    } else {
        Some(format!(
            "expected {}, got {}",
            prop.property_type.name(),
            json_type_name(value)
        ))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "map",
    }
}
