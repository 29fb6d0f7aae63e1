//! Backend capability trait
//!
//! A backend knows how to lower predicate leaves and projections into its
//! native query form, compile them into an executable query, and run it.
//! The translator, driver adapter and repository are generic over it.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::model::{Document, EntityMetadata, FieldSpec, NativeId};
use crate::query::{ComparisonOp, LogicalOp, ResolvedProjection, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    Document,
    Relational,
}

impl BackendFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Document => "document",
            BackendFamily::Relational => "relational",
        }
    }
}

/// One record as returned by a backend
///
/// `fields` is keyed by storage name and never contains the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: NativeId,
    pub fields: Document,
}

impl RawRecord {
    pub fn new(id: NativeId, fields: Document) -> Self {
        Self { id, fields }
    }
}

/// `skip`/`limit`; `None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Lowered pieces handed to [`Backend::compile`]
///
/// `order` holds storage names.
#[derive(Debug, Clone)]
pub struct QueryPlan<F, P> {
    pub filter: Option<F>,
    pub projection: P,
    pub order: Vec<(String, SortDirection)>,
    pub page: Page,
}

/// Server-side result stream
#[async_trait]
pub trait RawCursor: Send + 'static {
    /// Backend-assigned cursor id, for logging
    fn id(&self) -> u64;

    /// Next batch of records, `None` once the stream is drained
    ///
    /// # Errors
    ///
    /// `QueryExecution` when the backend fails mid-stream, `Connection`
    /// when the connection was closed under the cursor.
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>>;

    /// Release server resources; idempotent
    fn close(&mut self);
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Filter: Debug + Send;
    type Projection: Debug + Send;
    type Query: Debug + Send;
    type Cursor: RawCursor;

    fn family(&self) -> BackendFamily;

    /// Connection name, used in error context and logs
    fn name(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Lower one comparison leaf
    ///
    /// Values have already been checked against the field type.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the value cannot be represented natively (for
    /// instance a non-numeric identifier on an integer-keyed table).
    fn lower_comparison(
        &self,
        field: &FieldSpec,
        op: ComparisonOp,
        value: &Value,
    ) -> Result<Self::Filter>;

    /// Combine lowered children, preserving their order
    fn lower_logical(&self, op: LogicalOp, children: Vec<Self::Filter>) -> Self::Filter;

    fn lower_projection(
        &self,
        metadata: &EntityMetadata,
        projection: &ResolvedProjection,
    ) -> Self::Projection;

    fn compile(
        &self,
        metadata: &EntityMetadata,
        plan: QueryPlan<Self::Filter, Self::Projection>,
    ) -> Self::Query;

    /// Run a query to completion
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn fetch(&self, query: Self::Query) -> Result<Vec<RawRecord>>;

    /// Open a server-side cursor for a query
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn open_cursor(&self, query: Self::Query) -> Result<Self::Cursor>;

    /// Count records matching a lowered filter
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn count(&self, metadata: &EntityMetadata, filter: Option<Self::Filter>)
        -> Result<u64>;

    /// Convert a domain identifier into the backend's representation
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the value cannot identify a record here.
    fn native_id(&self, identifier: &FieldSpec, value: &Value) -> Result<NativeId>;

    /// Insert a new record; the backend assigns the identifier
    ///
    /// `document` is keyed by storage name and excludes the identifier.
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn insert(&self, metadata: &EntityMetadata, document: Document) -> Result<NativeId>;

    /// Insert or fully replace the record with identifier `id`
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn upsert(&self, metadata: &EntityMetadata, id: NativeId, document: Document)
        -> Result<()>;

    /// Remove a record; `true` when something was removed
    ///
    /// # Errors
    ///
    /// `QueryExecution` on backend failure.
    async fn delete(&self, metadata: &EntityMetadata, id: NativeId) -> Result<bool>;

    /// Mark the connection not live and release open cursors
    async fn close(&self);
}
