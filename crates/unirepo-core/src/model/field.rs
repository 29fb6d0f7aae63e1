use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of an entity field
///
/// Backends map these onto their own storage types; hydration checks raw
/// values against them instead of coercing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// Arbitrary JSON value (objects, arrays, scalars)
    Json,
}

impl FieldType {
    /// Stable lowercase name, as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Json => "json",
        }
    }

    /// Whether a non-null value has this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Json => true,
        }
    }

    /// Types usable for an identifier field
    pub fn is_identifier_type(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Integer)
    }
}

/// Name of the JSON type of a value, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of one entity field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Logical name used by application code and find descriptors
    pub name: String,
    /// Name of the column or document key in the backend
    pub storage_name: String,
    pub field_type: FieldType,
    pub is_identifier: bool,
    /// Omitted from results unless explicitly selected
    pub excluded_by_default: bool,
    /// Value used when the backend holds nothing for this field
    pub default: Option<Value>,
}

impl FieldSpec {
    /// Declare a field stored under its logical name
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            storage_name: name.clone(),
            name,
            field_type,
            is_identifier: false,
            excluded_by_default: false,
            default: None,
        }
    }

    /// Store the field under a different backend name
    pub fn stored_as(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = storage_name.into();
        self
    }

    /// Mark the field as the entity identifier
    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }

    /// Leave the field out of results unless selected
    pub fn hidden(mut self) -> Self {
        self.excluded_by_default = true;
        self
    }

    /// Value to hydrate when the backend has none
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_matches_json_kinds() {
        assert!(FieldType::String.accepts(&json!("a")));
        assert!(!FieldType::String.accepts(&json!(1)));
        assert!(FieldType::Integer.accepts(&json!(3)));
        assert!(!FieldType::Integer.accepts(&json!(3.5)));
        assert!(FieldType::Float.accepts(&json!(3)));
        assert!(FieldType::Boolean.accepts(&json!(true)));
        assert!(FieldType::Json.accepts(&json!({"a": [1]})));
    }

    #[test]
    fn test_builder_methods() {
        let spec = FieldSpec::new("body", FieldType::String)
            .stored_as("body_text")
            .hidden()
            .with_default("");
        assert_eq!(spec.name, "body");
        assert_eq!(spec.storage_name, "body_text");
        assert!(spec.excluded_by_default);
        assert_eq!(spec.default, Some(json!("")));
        assert!(!spec.is_identifier);
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&json!(1.5)), "float");
        assert_eq!(value_kind(&json!(1)), "integer");
        assert_eq!(value_kind(&Value::Null), "null");
    }
}
