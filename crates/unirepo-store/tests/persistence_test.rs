//! On-disk databases: reopening, and declaration drift

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{document_at, post_registry, seed, sqlite_at, Post};
use unirepo_core::errors::RepoError;
use unirepo_core::model::{EntityMetadata, FieldSpec, FieldType};
use unirepo_core::query::{FindDescriptor, PredicateNode};
use unirepo_core::MetadataRegistry;

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");

    let source = sqlite_at(&path, post_registry()).await.unwrap();
    let saved = seed(&source).await;
    source.close().await;

    let reopened = sqlite_at(&path, post_registry()).await.unwrap();
    let posts = reopened.repository::<Post>().unwrap();
    let found = posts
        .find_by_id(saved[1].id.clone().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, saved[1]);
}

#[tokio::test]
async fn test_sqlite_detects_declaration_drift() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift.db");

    let source = sqlite_at(&path, post_registry()).await.unwrap();
    source.close().await;

    let changed = MetadataRegistry::builder()
        .register_metadata(
            EntityMetadata::builder("post")
                .storage_name("posts")
                .field(FieldSpec::new("id", FieldType::String).identifier())
                .field(FieldSpec::new("title", FieldType::String))
                .field(FieldSpec::new("text", FieldType::String).stored_as("body"))
                .field(FieldSpec::new("views", FieldType::Integer))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build();

    let err = sqlite_at(&path, changed).await.err().unwrap();
    assert!(matches!(err, RepoError::InvalidMetadata { ref entity, .. } if entity == "post"));
}

#[tokio::test]
async fn test_document_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.json");

    let source = document_at(&path).await;
    seed(&source).await;
    source.close().await;

    let reopened = document_at(&path).await;
    let posts = reopened.repository::<Post>().unwrap();
    let found = posts
        .find(&FindDescriptor::new().filter(PredicateNode::eq("title", "Post #2")))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text.as_deref(), Some("About post #2"));
}
