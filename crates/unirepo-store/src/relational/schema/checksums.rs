//! Checksums of entity declarations
//!
//! A declaration is rendered to a canonical string and hashed with SHA-256
//! so a later synchronize can tell whether the entity changed.

use sha2::{Digest, Sha256};

use unirepo_core::model::EntityMetadata;

/// Compute SHA256 checksum of a string
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical column declaration of an entity: table, then one
/// `column:type[:id]` item per field in declaration order
pub fn declaration(metadata: &EntityMetadata) -> String {
    let mut parts = vec![metadata.storage_name().to_string()];
    for field in metadata.fields() {
        let mut item = format!("{}:{}", field.storage_name, field.field_type.name());
        if field.is_identifier {
            item.push_str(":id");
        }
        parts.push(item);
    }
    parts.join(";")
}

pub fn declaration_checksum(metadata: &EntityMetadata) -> String {
    compute_checksum(&declaration(metadata))
}
