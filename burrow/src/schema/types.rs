use crate::error::{BurrowError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Top-level schema definition parsed from schema.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub classes: BTreeMap<String, ClassDefinition>,
}

/// Definition of a single object class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IdConfig>,
}

/// Configuration for generated object identities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdConfig {
    pub auto: Option<AutoIdStrategy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

/// Definition of a single property in a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDeletePolicy>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Property type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Int,
    Float,
    Bool,
    Date,
    /// To-one link
    Object,
    /// Ordered to-many link
    List,
}

impl PropertyType {
    pub fn is_link(self) -> bool {
        matches!(self, PropertyType::Object | PropertyType::List)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, PropertyType::Int | PropertyType::Float | PropertyType::Date)
    }

    pub fn name(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Bool => "bool",
            PropertyType::Date => "date",
            PropertyType::Object => "object",
            PropertyType::List => "list",
        }
    }
}

/// What happens to a link when the object it points at is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDeletePolicy {
    #[default]
    Nullify,
    Error,
    Cascade,
}

impl PropertyDefinition {
    pub fn new(property_type: PropertyType) -> Self {
        PropertyDefinition {
            property_type,
            default: None,
            optional: false,
            indexed: false,
            target: None,
            on_delete: None,
        }
    }

    pub fn link(property_type: PropertyType, target: &str) -> Self {
        PropertyDefinition {
            target: Some(target.to_string()),
            ..PropertyDefinition::new(property_type)
        }
    }

    pub fn effective_on_delete(&self) -> OnDeletePolicy {
        self.on_delete.unwrap_or_default()
    }

    /// The stored JSON value used when an object omits this property.
    pub fn default_json(&self) -> Result<serde_json::Value> {
        if let Some(default) = &self.default {
            let json = serde_json::to_value(default)?;
            if self.property_type == PropertyType::Date {
                if let Some(s) = json.as_str() {
                    let millis = crate::value::parse_date_millis(s).ok_or_else(|| {
                        BurrowError::Schema(format!("Invalid date default '{s}'"))
                    })?;
                    return Ok(serde_json::Value::from(millis));
                }
            }
            return Ok(json);
        }

        if self.optional {
            return Ok(serde_json::Value::Null);
        }

        Ok(match self.property_type {
            PropertyType::String => serde_json::Value::String(String::new()),
            PropertyType::Int | PropertyType::Date => serde_json::Value::from(0i64),
            PropertyType::Float => serde_json::Value::from(0.0f64),
            PropertyType::Bool => serde_json::Value::Bool(false),
            PropertyType::Object => serde_json::Value::Null,
            PropertyType::List => serde_json::Value::Array(Vec::new()),
        })
    }
}

impl ClassDefinition {
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(name)
    }

    pub fn auto_id(&self) -> AutoIdStrategy {
        self.id
            .as_ref()
            .and_then(|c| c.auto)
            .unwrap_or_default()
    }

    /// Link properties of this class, in name order.
    pub fn link_properties(&self) -> impl Iterator<Item = (&String, &PropertyDefinition)> {
        self.properties
            .iter()
            .filter(|(_, p)| p.property_type.is_link())
    }
}

/// A link property somewhere in the schema that points at a given class.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingLink {
    pub class: String,
    pub property: String,
    pub property_type: PropertyType,
    pub on_delete: OnDeletePolicy,
}

impl SchemaDefinition {
    /// Look up a class, failing with a schema error if it is not declared.
    pub fn class(&self, name: &str) -> Result<&ClassDefinition> {
        self.classes
            .get(name)
            .ok_or_else(|| BurrowError::Schema(format!("Class '{name}' not found in schema")))
    }

    /// All link properties (in any class) whose target is `target`.
    pub fn incoming_links(&self, target: &str) -> Vec<IncomingLink> {
        let mut links = Vec::new();
        for (class_name, class) in &self.classes {
            for (prop_name, prop) in class.link_properties() {
                if prop.target.as_deref() == Some(target) {
                    links.push(IncomingLink {
                        class: class_name.clone(),
                        property: prop_name.clone(),
                        property_type: prop.property_type,
                        on_delete: prop.effective_on_delete(),
                    });
                }
            }
        }
        links
    }

    /// Check naming rules, link targets, primary keys and defaults.
    pub fn validate(&self) -> Result<()> {
        for (class_name, class) in &self.classes {
            if !is_identifier(class_name) {
                return Err(BurrowError::Schema(format!(
                    "Invalid class name '{class_name}'"
                )));
            }

            for (prop_name, prop) in &class.properties {
                if !is_identifier(prop_name) {
                    return Err(BurrowError::Schema(format!(
                        "Invalid property name '{class_name}.{prop_name}'"
                    )));
                }

                if prop.property_type.is_link() {
                    let target = prop.target.as_deref().ok_or_else(|| {
                        BurrowError::Schema(format!(
                            "Link property '{class_name}.{prop_name}' has no target"
                        ))
                    })?;
                    if !self.classes.contains_key(target) {
                        return Err(BurrowError::Schema(format!(
                            "Link property '{class_name}.{prop_name}' targets unknown class '{target}'"
                        )));
                    }
                    if prop.default.is_some() {
                        return Err(BurrowError::Schema(format!(
                            "Link property '{class_name}.{prop_name}' cannot have a default"
                        )));
                    }
                } else if prop.target.is_some() || prop.on_delete.is_some() {
                    return Err(BurrowError::Schema(format!(
                        "Property '{class_name}.{prop_name}' is not a link but declares a target or on_delete"
                    )));
                }

                let default = prop.default_json()?;
                if !default_matches(prop, &default) {
                    return Err(BurrowError::Schema(format!(
                        "Default for '{class_name}.{prop_name}' is not a valid {}",
                        prop.property_type.name()
                    )));
                }
            }

            if let Some(pk) = &class.primary_key {
                let prop = class.property(pk).ok_or_else(|| {
                    BurrowError::Schema(format!(
                        "Primary key '{pk}' is not a property of '{class_name}'"
                    ))
                })?;
                if !matches!(prop.property_type, PropertyType::String | PropertyType::Int)
                    || prop.optional
                {
                    return Err(BurrowError::Schema(format!(
                        "Primary key '{class_name}.{pk}' must be a non-optional string or int"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_matches(prop: &PropertyDefinition, value: &serde_json::Value) -> bool {
    if value.is_null() {
        return prop.optional || prop.property_type == PropertyType::Object;
    }
    match prop.property_type {
        PropertyType::String => value.is_string(),
        PropertyType::Int | PropertyType::Date => value.is_i64(),
        PropertyType::Float => value.is_number(),
        PropertyType::Bool => value.is_boolean(),
        PropertyType::Object => false,
        PropertyType::List => value.as_array().map(|a| a.is_empty()).unwrap_or(false),
    }
}

/// Class and property names: a letter followed by letters, digits or underscores.
pub fn is_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static regex"))
        .is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("Dog"));
        assert!(is_identifier("first_name2"));
        assert!(!is_identifier("_id"));
        assert!(!is_identifier("2dogs"));
        assert!(!is_identifier("name.first"));
    }

    #[test]
    fn test_zero_defaults() {
        assert_eq!(
            PropertyDefinition::new(PropertyType::String).default_json().unwrap(),
            serde_json::json!("")
        );
        assert_eq!(
            PropertyDefinition::new(PropertyType::Int).default_json().unwrap(),
            serde_json::json!(0)
        );
        assert_eq!(
            PropertyDefinition::link(PropertyType::List, "Dog")
                .default_json()
                .unwrap(),
            serde_json::json!([])
        );
        let mut optional = PropertyDefinition::new(PropertyType::Float);
        optional.optional = true;
        assert!(optional.default_json().unwrap().is_null());
    }

    #[test]
    fn test_incoming_links() {
        let mut schema = SchemaDefinition::default();
        schema.classes.insert("Dog".into(), ClassDefinition::default());
        let mut person = ClassDefinition::default();
        person.properties.insert(
            "dogs".into(),
            PropertyDefinition::link(PropertyType::List, "Dog"),
        );
        schema.classes.insert("Person".into(), person);

        let links = schema.incoming_links("Dog");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].class, "Person");
        assert_eq!(links[0].property, "dogs");
        assert_eq!(links[0].on_delete, OnDeletePolicy::Nullify);
        assert!(schema.incoming_links("Person").is_empty());
    }
}
