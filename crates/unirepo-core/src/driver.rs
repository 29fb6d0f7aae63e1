//! Driver execution adapter
//!
//! Runs compiled queries against a live backend. Enforces liveness, applies
//! the per-connection query timeout and de-duplicates eager results by
//! identity.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, RawRecord};
use crate::errors::{RepoError, Result};
use crate::model::{Document, EntityMetadata, NativeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Eager,
    Lazy,
}

/// Outcome of [`DriverAdapter::execute`]
#[derive(Debug)]
pub enum Execution<C> {
    Eager(Vec<RawRecord>),
    Lazy(C),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionOptions {
    /// Upper bound for one backend round trip
    pub timeout: Option<Duration>,
}

impl ExecutionOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

pub struct DriverAdapter<B: Backend> {
    backend: Arc<B>,
    options: ExecutionOptions,
}

impl<B: Backend> DriverAdapter<B> {
    pub fn new(backend: Arc<B>, options: ExecutionOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn options(&self) -> ExecutionOptions {
        self.options
    }

    /// Execute a compiled query eagerly or lazily
    ///
    /// # Errors
    ///
    /// `Connection` when the backend is not live, `QueryExecution` when it
    /// fails or the timeout elapses. A timed-out eager query yields no
    /// partial results.
    pub async fn execute(&self, query: B::Query, mode: ExecutionMode) -> Result<Execution<B::Cursor>> {
        match mode {
            ExecutionMode::Eager => self.fetch(query).await.map(Execution::Eager),
            ExecutionMode::Lazy => self.open_cursor(query).await.map(Execution::Lazy),
        }
    }

    async fn fetch(&self, query: B::Query) -> Result<Vec<RawRecord>> {
        self.ensure_live()?;
        let records = self.bounded(self.backend.fetch(query)).await?;
        Ok(dedupe_by_identity(records))
    }

    async fn open_cursor(&self, query: B::Query) -> Result<B::Cursor> {
        self.ensure_live()?;
        self.bounded(self.backend.open_cursor(query)).await
    }

    /// # Errors
    ///
    /// See [`DriverAdapter::execute`].
    pub async fn count(&self, metadata: &EntityMetadata, filter: Option<B::Filter>) -> Result<u64> {
        self.ensure_live()?;
        self.bounded(self.backend.count(metadata, filter)).await
    }

    /// # Errors
    ///
    /// See [`DriverAdapter::execute`].
    pub async fn insert(&self, metadata: &EntityMetadata, document: Document) -> Result<NativeId> {
        self.ensure_live()?;
        self.bounded(self.backend.insert(metadata, document)).await
    }

    /// # Errors
    ///
    /// See [`DriverAdapter::execute`].
    pub async fn upsert(
        &self,
        metadata: &EntityMetadata,
        id: NativeId,
        document: Document,
    ) -> Result<()> {
        self.ensure_live()?;
        self.bounded(self.backend.upsert(metadata, id, document)).await
    }

    /// # Errors
    ///
    /// See [`DriverAdapter::execute`].
    pub async fn delete(&self, metadata: &EntityMetadata, id: NativeId) -> Result<bool> {
        self.ensure_live()?;
        self.bounded(self.backend.delete(metadata, id)).await
    }

    fn ensure_live(&self) -> Result<()> {
        if self.backend.is_live() {
            Ok(())
        } else {
            Err(RepoError::connection(
                self.backend.name(),
                "connection is closed",
            ))
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        bounded(self.backend.name(), self.options.timeout, fut).await
    }
}

/// Apply an optional timeout to a backend round trip
///
/// # Errors
///
/// `QueryExecution` when the timeout elapses, otherwise the future's own
/// error.
pub async fn bounded<T, F>(backend: &str, timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            RepoError::query(
                backend,
                format!("query timed out after {} ms", limit.as_millis()),
            )
        })?,
        None => fut.await,
    }
}

/// Drop repeated identities, keeping the first occurrence
pub fn dedupe_by_identity(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, title: &str) -> RawRecord {
        let mut fields = Document::new();
        fields.insert("title".to_string(), json!(title));
        RawRecord::new(NativeId::Integer(id), fields)
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let out = dedupe_by_identity(vec![record(1, "a"), record(2, "b"), record(1, "c")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].fields["title"], json!("a"));
        assert_eq!(out[1].id, NativeId::Integer(2));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, RepoError>(1)
        };
        let err = bounded("test", Some(Duration::from_millis(5)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::QueryExecution { message, .. } if message.contains("timed out")));
    }

    #[tokio::test]
    async fn test_bounded_without_timeout_passes_through() {
        let value = bounded("test", None, async { Ok::<_, RepoError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
