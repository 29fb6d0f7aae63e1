//! Entity metadata registry
//!
//! Built once at startup through `RegistryBuilder`, then shared read-only
//! behind an `Arc`. Lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{RepoError, Result};
use crate::model::{Entity, EntityMetadata, FieldSpec};

/// Immutable map of entity name → metadata
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
    order: Vec<String>,
}

impl MetadataRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Metadata for a compiled entity type
    ///
    /// # Errors
    ///
    /// `UnknownEntity` when `T` was never registered.
    pub fn resolve<T: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        self.resolve_name(T::entity_name())
    }

    /// Metadata by entity name
    ///
    /// # Errors
    ///
    /// `UnknownEntity` when no entity of that name was registered.
    pub fn resolve_name(&self, name: &str) -> Result<Arc<EntityMetadata>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    pub fn is_known_field(&self, metadata: &EntityMetadata, name: &str) -> bool {
        metadata.is_known_field(name)
    }

    /// Registered entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Collects entity declarations before freezing them into a registry
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: HashMap<String, Arc<EntityMetadata>>,
    order: Vec<String>,
}

impl RegistryBuilder {
    /// Register a compiled entity type from its static declaration
    ///
    /// # Errors
    ///
    /// `InvalidMetadata` when the declaration is malformed,
    /// `DuplicateEntity` when the name is taken.
    pub fn register<T: Entity>(self) -> Result<Self> {
        let metadata = T::describe(EntityMetadata::builder(T::entity_name())).build()?;
        self.register_metadata(metadata)
    }

    /// Register an entity from field specs and the identifier's name
    ///
    /// # Errors
    ///
    /// Same as [`RegistryBuilder::register`].
    pub fn register_entity(
        self,
        name: &str,
        fields: Vec<FieldSpec>,
        identifier: &str,
    ) -> Result<Self> {
        let metadata = EntityMetadata::builder(name)
            .fields(fields)
            .identifier(identifier)
            .build()?;
        self.register_metadata(metadata)
    }

    /// Register already-validated metadata
    ///
    /// # Errors
    ///
    /// `DuplicateEntity` when the entity name is taken, `InvalidMetadata`
    /// when another entity already uses the same storage name.
    pub fn register_metadata(mut self, metadata: EntityMetadata) -> Result<Self> {
        if self.entities.contains_key(metadata.name()) {
            return Err(RepoError::DuplicateEntity {
                entity: metadata.name().to_string(),
            });
        }
        if let Some(other) = self
            .entities
            .values()
            .find(|m| m.storage_name() == metadata.storage_name())
        {
            return Err(RepoError::InvalidMetadata {
                entity: metadata.name().to_string(),
                reason: format!(
                    "storage name '{}' already used by entity '{}'",
                    metadata.storage_name(),
                    other.name()
                ),
            });
        }

        tracing::debug!(
            entity = metadata.name(),
            storage = metadata.storage_name(),
            fields = metadata.fields().len(),
            "registered entity"
        );
        self.order.push(metadata.name().to_string());
        self.entities
            .insert(metadata.name().to_string(), Arc::new(metadata));
        Ok(self)
    }

    pub fn build(self) -> MetadataRegistry {
        MetadataRegistry {
            entities: self.entities,
            order: self.order,
        }
    }
}
