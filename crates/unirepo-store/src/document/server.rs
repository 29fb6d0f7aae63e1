//! In-process document store
//!
//! Holds named collections of JSON documents keyed by `_id` and a table of
//! server-side cursors. Optionally persists every collection to a JSON file
//! after each write.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use unirepo_core::Document;

use crate::document::matcher::{matches, project, sort_documents, values_equal};
use crate::document::query::DocumentQuery;

pub const ID_KEY: &str = "_id";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    #[error("duplicate key: _id {0} already exists")]
    DuplicateKey(String),

    #[error("unknown operator {0}")]
    UnknownOperator(String),

    #[error("bad filter: {0}")]
    BadFilter(String),

    #[error("cannot mix inclusion and exclusion in one projection")]
    MixedProjection,

    #[error("document has no _id")]
    MissingId,

    #[error("cursor {0} not found")]
    CursorNotFound(u64),

    #[error("storage file error: {0}")]
    Storage(String),
}

type Collections = HashMap<String, Vec<Document>>;

#[derive(Debug)]
struct ServerCursor {
    pending: VecDeque<Document>,
}

#[derive(Debug, Default)]
pub struct DocumentServer {
    collections: RwLock<Collections>,
    cursors: Mutex<HashMap<u64, ServerCursor>>,
    next_cursor: AtomicU64,
    path: Option<PathBuf>,
}

impl DocumentServer {
    /// Empty, memory-only server
    pub fn new() -> Self {
        Self::default()
    }

    /// Server persisted to `path`, loading it when it exists
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref().to_path_buf();
        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Collections>(&bytes)
                .map_err(|e| ServerError::Storage(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(e) => return Err(ServerError::Storage(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            collections: RwLock::new(collections),
            path: Some(path),
            ..Self::default()
        })
    }

    pub async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), ServerError> {
        let id = doc.get(ID_KEY).cloned().ok_or(ServerError::MissingId)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| same_id(d, &id)) {
            return Err(ServerError::DuplicateKey(id.to_string()));
        }
        docs.push(doc);
        self.persist(&collections).await
    }

    /// Insert `doc` under the next integer `_id` of `collection`
    ///
    /// The sequence is one past the largest integer `_id` already stored,
    /// starting at 1. Returns the assigned id.
    pub async fn insert_sequenced(&self, collection: &str, mut doc: Document) -> Result<i64, ServerError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let next = docs
            .iter()
            .filter_map(|d| d.get(ID_KEY).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1;
        doc.insert(ID_KEY.to_string(), Value::from(next));
        docs.push(doc);
        self.persist(&collections).await?;
        Ok(next)
    }

    /// Replace the document with the same `_id`, inserting when `upsert`
    ///
    /// Returns whether a document was replaced or inserted.
    pub async fn replace_one(
        &self,
        collection: &str,
        doc: Document,
        upsert: bool,
    ) -> Result<bool, ServerError> {
        let id = doc.get(ID_KEY).cloned().ok_or(ServerError::MissingId)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let written = match docs.iter_mut().find(|d| same_id(d, &id)) {
            Some(existing) => {
                *existing = doc;
                true
            }
            None if upsert => {
                docs.push(doc);
                true
            }
            None => false,
        };
        self.persist(&collections).await?;
        Ok(written)
    }

    pub async fn delete_one(&self, collection: &str, id: &Value) -> Result<bool, ServerError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(position) = docs.iter().position(|d| same_id(d, id)) else {
            return Ok(false);
        };
        docs.remove(position);
        self.persist(&collections).await?;
        Ok(true)
    }

    /// Run a find to completion
    pub async fn find(&self, query: &DocumentQuery) -> Result<Vec<Document>, ServerError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut selected = Vec::new();
        for doc in docs {
            if matches(&query.filter, doc)? {
                selected.push(doc.clone());
            }
        }
        drop(collections);

        sort_documents(&mut selected, &query.sort);
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        selected
            .into_iter()
            .skip(query.skip as usize)
            .take(limit)
            .map(|doc| project(doc, &query.projection))
            .collect()
    }

    pub async fn count(&self, collection: &str, filter: &Value) -> Result<u64, ServerError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };
        let mut n = 0;
        for doc in docs {
            if matches(filter, doc)? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Evaluate a query and park its results behind a cursor id
    ///
    /// The result set is fixed when the cursor opens.
    pub async fn open_cursor(&self, query: &DocumentQuery) -> Result<u64, ServerError> {
        let results = self.find(query).await?;
        let id = self.next_cursor.fetch_add(1, Ordering::Relaxed) + 1;
        self.cursor_table()?.insert(
            id,
            ServerCursor {
                pending: results.into(),
            },
        );
        Ok(id)
    }

    /// Up to `batch_size` documents; `None` (and the cursor is dropped)
    /// once nothing is left
    pub fn get_more(&self, cursor_id: u64, batch_size: usize) -> Result<Option<Vec<Document>>, ServerError> {
        let mut cursors = self.cursor_table()?;
        let cursor = cursors
            .get_mut(&cursor_id)
            .ok_or(ServerError::CursorNotFound(cursor_id))?;
        if cursor.pending.is_empty() {
            cursors.remove(&cursor_id);
            return Ok(None);
        }
        let take = batch_size.max(1).min(cursor.pending.len());
        Ok(Some(cursor.pending.drain(..take).collect()))
    }

    /// Returns whether the cursor existed
    pub fn kill_cursor(&self, cursor_id: u64) -> bool {
        self.cursor_table()
            .map(|mut cursors| cursors.remove(&cursor_id).is_some())
            .unwrap_or(false)
    }

    pub fn open_cursor_count(&self) -> usize {
        self.cursor_table().map(|c| c.len()).unwrap_or(0)
    }

    fn cursor_table(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<u64, ServerCursor>>, ServerError> {
        self.cursors
            .lock()
            .map_err(|_| ServerError::Storage("cursor table lock poisoned".to_string()))
    }

    async fn persist(&self, collections: &Collections) -> Result<(), ServerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(collections)
            .map_err(|e| ServerError::Storage(e.to_string()))?;
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| ServerError::Storage(format!("{}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| ServerError::Storage(format!("{}: {}", path.display(), e)))
    }
}

fn same_id(doc: &Document, id: &Value) -> bool {
    doc.get(ID_KEY).map_or(false, |d| values_equal(d, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let server = DocumentServer::new();
        server.insert_one("posts", doc(json!({"_id": 1, "title": "a"}))).await.unwrap();
        let err = server
            .insert_one("posts", doc(json!({"_id": 1, "title": "b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateKey(_)));
        assert!(matches!(
            server.insert_one("posts", doc(json!({"title": "c"}))).await,
            Err(ServerError::MissingId)
        ));
    }

    #[tokio::test]
    async fn test_insert_sequenced_continues_after_largest_integer_id() {
        let server = DocumentServer::new();
        assert_eq!(server.insert_sequenced("tags", doc(json!({"name": "a"}))).await.unwrap(), 1);
        server.insert_one("tags", doc(json!({"_id": 7, "name": "b"}))).await.unwrap();
        server.insert_one("tags", doc(json!({"_id": "x", "name": "c"}))).await.unwrap();
        assert_eq!(server.insert_sequenced("tags", doc(json!({"name": "d"}))).await.unwrap(), 8);
        assert_eq!(server.count("tags", &json!({"_id": 8})).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let server = DocumentServer::new();
        assert!(!server
            .replace_one("posts", doc(json!({"_id": 1, "title": "a"})), false)
            .await
            .unwrap());
        assert!(server
            .replace_one("posts", doc(json!({"_id": 1, "title": "a"})), true)
            .await
            .unwrap());
        server
            .replace_one("posts", doc(json!({"_id": 1, "title": "b"})), true)
            .await
            .unwrap();

        let found = server.find(&DocumentQuery::new("posts")).await.unwrap();
        assert_eq!(found, vec![doc(json!({"_id": 1, "title": "b"}))]);

        assert!(server.delete_one("posts", &json!(1)).await.unwrap());
        assert!(!server.delete_one("posts", &json!(1)).await.unwrap());
        assert_eq!(server.count("posts", &json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cursor_batches_and_cleanup() {
        let server = DocumentServer::new();
        for i in 0..5 {
            server.insert_one("n", doc(json!({"_id": i}))).await.unwrap();
        }
        let id = server.open_cursor(&DocumentQuery::new("n")).await.unwrap();
        assert_eq!(server.open_cursor_count(), 1);

        assert_eq!(server.get_more(id, 2).unwrap().unwrap().len(), 2);
        assert_eq!(server.get_more(id, 2).unwrap().unwrap().len(), 2);
        assert_eq!(server.get_more(id, 2).unwrap().unwrap().len(), 1);
        assert_eq!(server.get_more(id, 2).unwrap(), None);
        assert_eq!(server.open_cursor_count(), 0);
        assert!(matches!(
            server.get_more(id, 2),
            Err(ServerError::CursorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let server = DocumentServer::open(&path).await.unwrap();
        server.insert_one("posts", doc(json!({"_id": 1, "title": "a"}))).await.unwrap();
        drop(server);

        let reopened = DocumentServer::open(&path).await.unwrap();
        assert_eq!(reopened.count("posts", &json!({})).await.unwrap(), 1);
    }
}
