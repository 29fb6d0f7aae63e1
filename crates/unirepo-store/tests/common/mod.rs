//! Shared fixtures: `Post` and `Tag` entities and connected sources for both
//! backends.

#![allow(dead_code)]

use std::path::Path;

use serde::{Deserialize, Serialize};

use unirepo_core::backend::Backend;
use unirepo_core::config::{BackendKind, ConnectionConfig};
use unirepo_core::model::{Entity, EntityMetadataBuilder, FieldSpec, FieldType};
use unirepo_core::{DataSource, MetadataRegistry};
use unirepo_store::{document_source, sqlite_source, DocumentBackend, SqliteBackend};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Post {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            id: None,
            title: Some(title.to_string()),
            text: Some(text.to_string()),
        }
    }
}

impl Entity for Post {
    fn entity_name() -> &'static str {
        "post"
    }

    fn describe(entity: EntityMetadataBuilder) -> EntityMetadataBuilder {
        entity
            .storage_name("posts")
            .field(FieldSpec::new("id", FieldType::String).identifier())
            .field(FieldSpec::new("title", FieldType::String))
            .field(FieldSpec::new("text", FieldType::String).stored_as("body"))
    }
}

/// Entity with an integer identifier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.to_string()),
        }
    }
}

impl Entity for Tag {
    fn entity_name() -> &'static str {
        "tag"
    }

    fn describe(entity: EntityMetadataBuilder) -> EntityMetadataBuilder {
        entity
            .storage_name("tags")
            .field(FieldSpec::new("id", FieldType::Integer).identifier())
            .field(FieldSpec::new("name", FieldType::String))
    }
}

pub fn post_registry() -> MetadataRegistry {
    MetadataRegistry::builder()
        .register::<Post>()
        .unwrap()
        .register::<Tag>()
        .unwrap()
        .build()
}

/// Small batches so cursors need several round trips
pub fn config(kind: BackendKind) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(kind);
    config.name = format!("{:?}-test", kind).to_lowercase();
    config.cursor_batch_size = 1;
    config.synchronize = true;
    config
}

pub async fn document() -> DataSource<DocumentBackend> {
    document_source(&config(BackendKind::Document), post_registry())
        .await
        .unwrap()
}

pub async fn sqlite() -> DataSource<SqliteBackend> {
    sqlite_source(&config(BackendKind::Sqlite), post_registry())
        .await
        .unwrap()
}

pub async fn sqlite_at(path: &Path, registry: MetadataRegistry) -> unirepo_core::Result<DataSource<SqliteBackend>> {
    let mut config = config(BackendKind::Sqlite);
    config.path = Some(path.to_path_buf());
    sqlite_source(&config, registry).await
}

pub async fn document_at(path: &Path) -> DataSource<DocumentBackend> {
    let mut config = config(BackendKind::Document);
    config.path = Some(path.to_path_buf());
    document_source(&config, post_registry()).await.unwrap()
}

/// Save Post #1 and Post #2, returning them with identifiers
pub async fn seed<B: Backend>(source: &DataSource<B>) -> Vec<Post> {
    let posts = source.repository::<Post>().unwrap();
    let mut saved = Vec::new();
    for n in 1..=2 {
        let post = Post::new(&format!("Post #{}", n), &format!("About post #{}", n));
        saved.push(posts.save(&post).await.unwrap());
    }
    saved
}
