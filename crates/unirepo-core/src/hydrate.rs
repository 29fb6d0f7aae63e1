//! Raw record → entity
//!
//! Applies the resolved projection, converts the native identifier into the
//! domain identifier type and checks every visible value against its
//! declared type.

use serde_json::Value;

use crate::backend::RawRecord;
use crate::errors::{RepoError, Result};
use crate::model::field::value_kind;
use crate::model::{Document, Entity, EntityMetadata};
use crate::query::ResolvedProjection;

/// Hydrated record without a compiled Rust type
///
/// `fields` holds logical names, only for fields the projection made
/// visible. The identity is carried regardless of projection.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    entity: String,
    identity: Value,
    fields: Document,
}

impl EntityRecord {
    pub fn new(entity: impl Into<String>, identity: Value, fields: Document) -> Self {
        Self {
            entity: entity.into(),
            identity,
            fields,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Domain identifier, present even when not visible
    pub fn identity(&self) -> &Value {
        &self.identity
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn into_document(self) -> Document {
        self.fields
    }

    /// JSON object of the visible fields
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Deserialize the visible fields into an entity
    ///
    /// # Errors
    ///
    /// `Serialization` when the document does not fit `T`.
    pub fn into_entity<T: Entity>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields))?)
    }
}

/// Pass-through converter for untyped cursors and finds
///
/// # Errors
///
/// Never fails.
pub fn as_record(record: EntityRecord) -> Result<EntityRecord> {
    Ok(record)
}

/// Hydrate one raw record under a projection
///
/// # Errors
///
/// `Hydration` naming the field when the identifier cannot be converted or
/// a visible value has the wrong type.
pub fn hydrate(
    metadata: &EntityMetadata,
    raw: RawRecord,
    projection: &ResolvedProjection,
) -> Result<EntityRecord> {
    let id_spec = metadata.identifier();
    let identity = raw
        .id
        .to_domain(id_spec.field_type)
        .ok_or_else(|| RepoError::Hydration {
            entity: metadata.name().to_string(),
            field: id_spec.name.clone(),
            expected: id_spec.field_type.name().to_string(),
            found: raw.id.to_string(),
        })?;

    let mut stored = raw.fields;
    let mut fields = Document::new();
    for name in &projection.visible {
        let spec = metadata.require_field(name)?;
        if spec.is_identifier {
            fields.insert(name.clone(), identity.clone());
            continue;
        }

        let value = match stored.remove(&spec.storage_name) {
            None | Some(Value::Null) => spec.default.clone().unwrap_or(Value::Null),
            Some(value) if spec.field_type.accepts(&value) => value,
            Some(value) => {
                return Err(RepoError::Hydration {
                    entity: metadata.name().to_string(),
                    field: name.clone(),
                    expected: spec.field_type.name().to_string(),
                    found: value_kind(&value).to_string(),
                })
            }
        };
        fields.insert(name.clone(), value);
    }

    Ok(EntityRecord::new(metadata.name(), identity, fields))
}
