use std::collections::{HashMap, HashSet};

use crate::errors::{RepoError, Result};
use crate::model::field::FieldSpec;

/// Static description of one entity type
///
/// Built once at registry initialization and immutable afterwards. Field
/// order is the declaration order and drives the column/key order of every
/// query and hydrated record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    name: String,
    storage_name: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    identifier: usize,
}

impl EntityMetadata {
    /// Start declaring an entity named `name`
    pub fn builder(name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder::new(name)
    }

    /// Logical entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection or table name
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by logical name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field by logical name, failing with `UnknownField`
    pub fn require_field(&self, name: &str) -> Result<&FieldSpec> {
        self.field(name).ok_or_else(|| RepoError::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Look up a field by its storage name
    pub fn field_by_storage_name(&self, storage_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.storage_name == storage_name)
    }

    /// The identifier field
    pub fn identifier(&self) -> &FieldSpec {
        &self.fields[self.identifier]
    }

    /// Whether `name` is a declared field
    pub fn is_known_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Logical field names in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Builder enforcing the metadata invariants
#[derive(Debug, Clone)]
pub struct EntityMetadataBuilder {
    name: String,
    storage_name: Option<String>,
    fields: Vec<FieldSpec>,
    identifier: Option<String>,
}

impl EntityMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_name: None,
            fields: Vec::new(),
            identifier: None,
        }
    }

    /// Collection or table name (defaults to the entity name)
    pub fn storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    /// Append a field declaration
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Append several field declarations
    pub fn fields(mut self, specs: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(specs);
        self
    }

    /// Name the identifier field (alternative to `FieldSpec::identifier`)
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.identifier = Some(name.into());
        self
    }

    /// Validate and freeze the declaration
    ///
    /// # Errors
    ///
    /// Returns `InvalidMetadata` when the entity name is empty, a field or
    /// storage name is empty, duplicated or starts with `$`, or when there is
    /// not exactly one identifier of type string or integer.
    pub fn build(self) -> Result<EntityMetadata> {
        let invalid = |reason: String| RepoError::InvalidMetadata {
            entity: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("entity name cannot be empty".to_string()));
        }
        if self.fields.is_empty() {
            return Err(invalid("entity declares no fields".to_string()));
        }

        let mut fields = self.fields.clone();
        if let Some(id_name) = &self.identifier {
            let spec = fields
                .iter_mut()
                .find(|f| &f.name == id_name)
                .ok_or_else(|| invalid(format!("identifier '{}' is not a declared field", id_name)))?;
            spec.is_identifier = true;
        }

        let mut index = HashMap::new();
        let mut storage_names = HashSet::new();
        for (i, spec) in fields.iter().enumerate() {
            if spec.name.is_empty() || spec.storage_name.is_empty() {
                return Err(invalid("field names cannot be empty".to_string()));
            }
            if spec.name.starts_with('$') || spec.storage_name.starts_with('$') {
                return Err(invalid(format!("field '{}' cannot start with '$'", spec.name)));
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate field '{}'", spec.name)));
            }
            if !storage_names.insert(spec.storage_name.clone()) {
                return Err(invalid(format!(
                    "duplicate storage name '{}'",
                    spec.storage_name
                )));
            }
        }

        let identifiers: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_identifier)
            .map(|(i, _)| i)
            .collect();
        let identifier = match identifiers.as_slice() {
            [single] => *single,
            [] => return Err(invalid("no identifier field declared".to_string())),
            _ => return Err(invalid("more than one identifier field declared".to_string())),
        };

        let id_spec = &fields[identifier];
        if !id_spec.field_type.is_identifier_type() {
            return Err(invalid(format!(
                "identifier '{}' must be string or integer, not {}",
                id_spec.name,
                id_spec.field_type.name()
            )));
        }
        if id_spec.excluded_by_default {
            return Err(invalid(format!(
                "identifier '{}' cannot be hidden",
                id_spec.name
            )));
        }

        Ok(EntityMetadata {
            storage_name: self.storage_name.clone().unwrap_or_else(|| self.name.clone()),
            name: self.name,
            fields,
            index,
            identifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::FieldType;

    fn post() -> EntityMetadataBuilder {
        EntityMetadata::builder("post")
            .storage_name("posts")
            .field(FieldSpec::new("id", FieldType::String).identifier())
            .field(FieldSpec::new("title", FieldType::String))
            .field(FieldSpec::new("text", FieldType::String))
    }

    #[test]
    fn test_build_valid_metadata() {
        let meta = post().build().unwrap();
        assert_eq!(meta.name(), "post");
        assert_eq!(meta.storage_name(), "posts");
        assert_eq!(meta.identifier().name, "id");
        assert!(meta.is_known_field("title"));
        assert!(!meta.is_known_field("author"));
        assert_eq!(
            meta.field_names().collect::<Vec<_>>(),
            vec!["id", "title", "text"]
        );
    }

    #[test]
    fn test_storage_name_defaults_to_entity_name() {
        let meta = EntityMetadata::builder("tag")
            .field(FieldSpec::new("id", FieldType::Integer))
            .identifier("id")
            .build()
            .unwrap();
        assert_eq!(meta.storage_name(), "tag");
        assert!(meta.identifier().is_identifier);
    }

    #[test]
    fn test_rejects_duplicate_field() {
        let err = post()
            .field(FieldSpec::new("title", FieldType::String))
            .build()
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_rejects_duplicate_storage_name() {
        let err = post()
            .field(FieldSpec::new("heading", FieldType::String).stored_as("title"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_rejects_missing_or_multiple_identifiers() {
        let none = EntityMetadata::builder("x")
            .field(FieldSpec::new("a", FieldType::String))
            .build();
        assert!(none.is_err());

        let two = post()
            .field(FieldSpec::new("uuid", FieldType::String).identifier())
            .build();
        assert!(two.is_err());
    }

    #[test]
    fn test_rejects_non_scalar_identifier() {
        let err = EntityMetadata::builder("x")
            .field(FieldSpec::new("id", FieldType::Json).identifier())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("string or integer"));
    }

    #[test]
    fn test_require_field_reports_unknown_field() {
        let meta = post().build().unwrap();
        let err = meta.require_field("author").unwrap_err();
        assert_eq!(
            err,
            RepoError::UnknownField {
                entity: "post".to_string(),
                field: "author".to_string()
            }
        );
    }
}
