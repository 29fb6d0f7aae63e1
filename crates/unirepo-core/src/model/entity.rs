use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::metadata::EntityMetadataBuilder;

/// A domain type persisted through a repository
///
/// Implementations declare their fields explicitly; the registry calls
/// `describe` once at startup and never inspects the type again.
///
/// Fields that a projection may leave out should be `Option` with
/// `#[serde(default, skip_serializing_if = "Option::is_none")]`, so that an
/// excluded field deserializes as `None` and an unsaved identifier is simply
/// absent.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use unirepo_core::model::{Entity, EntityMetadataBuilder, FieldSpec, FieldType};
///
/// #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
/// struct Post {
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     id: Option<String>,
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     title: Option<String>,
/// }
///
/// impl Entity for Post {
///     fn entity_name() -> &'static str {
///         "post"
///     }
///
///     fn describe(entity: EntityMetadataBuilder) -> EntityMetadataBuilder {
///         entity
///             .storage_name("posts")
///             .field(FieldSpec::new("id", FieldType::String).identifier())
///             .field(FieldSpec::new("title", FieldType::String))
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Registry key of this type
    fn entity_name() -> &'static str;

    /// Declare storage name and fields on a builder already named
    /// `entity_name()`
    fn describe(entity: EntityMetadataBuilder) -> EntityMetadataBuilder;
}
