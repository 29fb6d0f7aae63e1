pub mod document;
pub mod entity;
pub mod field;
pub mod metadata;

pub use document::{Document, NativeId, ObjectId};
pub use entity::Entity;
pub use field::{FieldSpec, FieldType};
pub use metadata::{EntityMetadata, EntityMetadataBuilder};
