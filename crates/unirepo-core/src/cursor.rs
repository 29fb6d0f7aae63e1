//! Lazy entity cursor
//!
//! State machine: `Open → (Reading)* → Exhausted | Closed`. The first pull
//! that finds the stream drained returns `Ok(None)` and releases the backend
//! cursor; any later pull fails with `CursorClosed`.
//!
//! Repeated identities are dropped within a batch only. Backend cursors
//! read from a snapshot taken at open, so an identity never spans two
//! batches and the cursor keeps no per-stream identity set.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};

use crate::backend::{RawCursor, RawRecord};
use crate::driver;
use crate::errors::{RepoError, Result};
use crate::hydrate::{hydrate, EntityRecord};
use crate::model::EntityMetadata;
use crate::query::ResolvedProjection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Reading,
    Exhausted,
    Closed,
}

impl CursorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorState::Open => "open",
            CursorState::Reading => "reading",
            CursorState::Exhausted => "exhausted",
            CursorState::Closed => "closed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, CursorState::Exhausted | CursorState::Closed)
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a hydrated record into the cursor's item type
pub type Converter<T> = fn(EntityRecord) -> Result<T>;

/// Single-owner, single-pass cursor over hydrated entities
pub struct EntityCursor<T, C: RawCursor> {
    raw: Option<C>,
    metadata: Arc<EntityMetadata>,
    projection: ResolvedProjection,
    convert: Converter<T>,
    backend: String,
    timeout: Option<Duration>,
    buffer: VecDeque<RawRecord>,
    state: CursorState,
}

impl<T, C: RawCursor> fmt::Debug for EntityCursor<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCursor")
            .field("entity", &self.metadata.name())
            .field("backend", &self.backend)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T, C: RawCursor> EntityCursor<T, C> {
    pub fn new(
        raw: C,
        metadata: Arc<EntityMetadata>,
        projection: ResolvedProjection,
        convert: Converter<T>,
    ) -> Self {
        tracing::debug!(
            cursor_id = raw.id(),
            entity = metadata.name(),
            "cursor opened"
        );
        Self {
            raw: Some(raw),
            metadata,
            projection,
            convert,
            backend: String::new(),
            timeout: None,
            buffer: VecDeque::new(),
            state: CursorState::Open,
        }
    }

    /// Bound every batch pull by `timeout`
    pub fn with_timeout(mut self, backend: impl Into<String>, timeout: Option<Duration>) -> Self {
        self.backend = backend.into();
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// Next entity, `None` once the stream is drained
    ///
    /// # Errors
    ///
    /// `CursorClosed` when pulled after exhaustion or close; backend and
    /// hydration errors otherwise. A backend error closes the cursor.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if self.state.is_terminal() {
                return Err(RepoError::CursorClosed {
                    entity: self.metadata.name().to_string(),
                    state: self.state.to_string(),
                });
            }

            if let Some(raw) = self.buffer.pop_front() {
                self.state = CursorState::Reading;
                let record = hydrate(&self.metadata, raw, &self.projection)?;
                return (self.convert)(record).map(Some);
            }

            let Some(raw) = self.raw.as_mut() else {
                self.state = CursorState::Exhausted;
                return Ok(None);
            };
            let batch = driver::bounded(&self.backend, self.timeout, raw.next_batch()).await;
            match batch {
                Ok(Some(records)) => self.buffer.extend(driver::dedupe_by_identity(records)),
                Ok(None) => {
                    self.release();
                    self.state = CursorState::Exhausted;
                    tracing::debug!(entity = self.metadata.name(), "cursor exhausted");
                    return Ok(None);
                }
                Err(err) => {
                    self.release();
                    self.state = CursorState::Closed;
                    return Err(err);
                }
            }
        }
    }

    /// Drain the remaining entities
    ///
    /// # Errors
    ///
    /// Same as [`EntityCursor::next`].
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// Release backend resources; later pulls fail with `CursorClosed`
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.release();
        self.buffer.clear();
        self.state = CursorState::Closed;
        tracing::debug!(entity = self.metadata.name(), "cursor closed");
    }

    /// Consume the cursor as a stream that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::unfold((self, false), |(mut cursor, failed)| async move {
            if failed {
                return None;
            }
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), (cursor, false))),
                Ok(None) => None,
                Err(err) => Some((Err(err), (cursor, true))),
            }
        })
    }

    fn release(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            raw.close();
        }
    }
}

impl<T, C: RawCursor> Drop for EntityCursor<T, C> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.as_ref() {
            tracing::warn!(
                cursor_id = raw.id(),
                entity = self.metadata.name(),
                state = self.state.as_str(),
                "cursor dropped while open; releasing"
            );
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::as_record;
    use crate::model::{Document, FieldSpec, FieldType, NativeId};
    use crate::query::projection;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedCursor {
        batches: VecDeque<Vec<RawRecord>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RawCursor for ScriptedCursor {
        fn id(&self) -> u64 {
            1
        }

        async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
            Ok(self.batches.pop_front())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn record(id: i64, title: &str) -> RawRecord {
        let mut fields = Document::new();
        fields.insert("title".to_string(), json!(title));
        RawRecord::new(NativeId::Integer(id), fields)
    }

    fn cursor(
        batches: Vec<Vec<RawRecord>>,
    ) -> (EntityCursor<EntityRecord, ScriptedCursor>, Arc<AtomicBool>) {
        let metadata = Arc::new(
            EntityMetadata::builder("tag")
                .field(FieldSpec::new("id", FieldType::Integer).identifier())
                .field(FieldSpec::new("title", FieldType::String))
                .build()
                .unwrap(),
        );
        let projection = projection::resolve(&metadata, &[], &[]).unwrap();
        let closed = Arc::new(AtomicBool::new(false));
        let raw = ScriptedCursor {
            batches: batches.into(),
            closed: closed.clone(),
        };
        (
            EntityCursor::new(raw, metadata, projection, as_record),
            closed,
        )
    }

    #[tokio::test]
    async fn test_drain_then_pull_fails() {
        let (mut c, closed) = cursor(vec![vec![record(1, "a"), record(2, "b")], vec![record(3, "c")]]);
        assert_eq!(c.state(), CursorState::Open);

        let items = c.to_vec().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(c.state(), CursorState::Exhausted);
        assert!(closed.load(Ordering::SeqCst));

        let err = c.next().await.unwrap_err();
        assert!(matches!(err, RepoError::CursorClosed { state, .. } if state == "exhausted"));
    }

    #[tokio::test]
    async fn test_duplicates_within_a_batch_are_skipped() {
        let (mut c, _) = cursor(vec![vec![record(1, "a"), record(1, "a"), record(2, "b")]]);
        let ids: Vec<_> = c
            .to_vec()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identity().clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_close_releases_and_rejects_pulls() {
        let (mut c, closed) = cursor(vec![vec![record(1, "a")]]);
        assert!(c.next().await.unwrap().is_some());
        assert_eq!(c.state(), CursorState::Reading);

        c.close();
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(
            c.next().await,
            Err(RepoError::CursorClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_backend_cursor() {
        let (c, closed) = cursor(vec![vec![record(1, "a")]]);
        drop(c);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_yields_all_items() {
        use futures::StreamExt;

        let (c, _) = cursor(vec![vec![record(1, "a"), record(2, "b")]]);
        let items: Vec<_> = c.into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|r| r.is_ok()));
    }
}
