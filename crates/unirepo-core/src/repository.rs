//! Repository facade
//!
//! One repository per (connection, entity). `RecordRepository` works on
//! untyped [`EntityRecord`]s; `Repository<T, B>` wraps it for a compiled
//! [`Entity`] type. Every operation runs in a `repository` span carrying a
//! fresh request id and logs one start and one end (or end_error) event.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::Instrument;

use unirepo_core_types::OperationContext;

use crate::backend::{Backend, RawRecord};
use crate::cursor::{Converter, EntityCursor};
use crate::driver::{DriverAdapter, Execution, ExecutionMode, ExecutionOptions};
use crate::errors::{RepoError, Result};
use crate::hydrate::{as_record, hydrate, EntityRecord};
use crate::model::field::value_kind;
use crate::model::{Document, Entity, EntityMetadata, NativeId};
use crate::query::{projection, FindDescriptor, PredicateNode};
use crate::registry::MetadataRegistry;
use crate::translate::{translate, translate_filter};
use crate::{log_op_end, log_op_error, log_op_start};

/// Repository over untyped records
pub struct RecordRepository<B: Backend> {
    driver: Arc<DriverAdapter<B>>,
    metadata: Arc<EntityMetadata>,
}

impl<B: Backend> Clone for RecordRepository<B> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<B: Backend> std::fmt::Debug for RecordRepository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRepository")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> RecordRepository<B> {
    pub fn new(driver: Arc<DriverAdapter<B>>, metadata: Arc<EntityMetadata>) -> Self {
        Self { driver, metadata }
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    /// Insert when the identifier is absent or null, upsert otherwise
    ///
    /// `document` uses logical field names. Returns the stored record with
    /// its identifier under the default projection.
    ///
    /// # Errors
    ///
    /// `UnknownField` for undeclared keys, `InvalidInput` for mistyped
    /// values, backend errors from the write.
    pub async fn save(&self, document: Document) -> Result<EntityRecord> {
        self.observe("save", self.save_document(document), |_| 1)
            .await
    }

    /// All matching records; empty when nothing matches
    ///
    /// # Errors
    ///
    /// Validation errors before any backend call, then backend and
    /// hydration errors.
    pub async fn find(&self, descriptor: &FindDescriptor) -> Result<Vec<EntityRecord>> {
        self.observe("find", self.find_with(descriptor, as_record), Vec::len)
            .await
    }

    /// First matching record
    ///
    /// # Errors
    ///
    /// Same as [`RecordRepository::find`].
    pub async fn find_one(&self, descriptor: &FindDescriptor) -> Result<Option<EntityRecord>> {
        self.observe(
            "find_one",
            self.find_one_with(descriptor, as_record),
            option_rows,
        )
        .await
    }

    /// Record with the given domain identifier
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `id` does not fit the identifier type.
    pub async fn find_by_id(&self, id: &Value) -> Result<Option<EntityRecord>> {
        self.observe(
            "find_by_id",
            self.find_by_id_with(id, as_record),
            option_rows,
        )
        .await
    }

    /// Number of records matching `filter`
    ///
    /// # Errors
    ///
    /// Validation errors before any backend call, then backend errors.
    pub async fn count(&self, filter: Option<&PredicateNode>) -> Result<u64> {
        self.observe("count", self.count_matching(filter), |n| *n as usize)
            .await
    }

    /// Remove the record with the given identifier
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `id` does not fit the identifier type, backend
    /// errors from the delete.
    pub async fn delete_by_id(&self, id: &Value) -> Result<bool> {
        self.observe("delete_by_id", self.delete_record(id), |removed| {
            usize::from(*removed)
        })
        .await
    }

    /// Lazy cursor over records matching a JSON filter shorthand
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed filter, then as
    /// [`RecordRepository::create_cursor_with`].
    pub async fn create_cursor(
        &self,
        filter: &Value,
    ) -> Result<EntityCursor<EntityRecord, B::Cursor>> {
        let descriptor = FindDescriptor::from_filter(filter)?;
        self.create_cursor_with(&descriptor).await
    }

    /// Lazy cursor honouring projection, order and pagination
    ///
    /// # Errors
    ///
    /// Validation errors before any backend call, then backend errors from
    /// opening the cursor.
    pub async fn create_cursor_with(
        &self,
        descriptor: &FindDescriptor,
    ) -> Result<EntityCursor<EntityRecord, B::Cursor>> {
        self.observe(
            "create_cursor",
            self.cursor_with(descriptor, as_record),
            |_| 0,
        )
        .await
    }

    pub(crate) async fn observe<R, F>(
        &self,
        op: &'static str,
        fut: F,
        rows: fn(&R) -> usize,
    ) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        let ctx = OperationContext::new(op, self.metadata.name());
        let span = tracing::info_span!(
            "repository",
            op = ctx.op,
            entity = %ctx.entity,
            request_id = %ctx.request_id
        );
        let backend = self.driver.backend().name().to_string();
        let family = self.driver.backend().family();

        async move {
            let start = Instant::now();
            log_op_start!(
                op,
                entity = ctx.entity.as_str(),
                backend = backend.as_str(),
                family = family.as_str()
            );
            let result = fut.await;
            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(value) => {
                    log_op_end!(
                        op,
                        duration_ms = duration_ms,
                        rows = rows(value),
                        entity = ctx.entity.as_str()
                    );
                }
                Err(err) => {
                    log_op_error!(
                        op,
                        err.clone(),
                        duration_ms = duration_ms,
                        entity = ctx.entity.as_str()
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn save_document(&self, document: Document) -> Result<EntityRecord> {
        let (id, stored) = self.prepare_write(document)?;
        let id = match id {
            Some(id) => {
                self.driver
                    .upsert(&self.metadata, id.clone(), stored.clone())
                    .await?;
                id
            }
            None => self.driver.insert(&self.metadata, stored.clone()).await?,
        };

        let projection = projection::resolve(&self.metadata, &[], &[])?;
        hydrate(&self.metadata, RawRecord::new(id, stored), &projection)
    }

    /// Split a logical document into the native id and the storage-keyed
    /// fields
    fn prepare_write(&self, document: Document) -> Result<(Option<NativeId>, Document)> {
        let mut id = None;
        let mut stored = Document::new();
        for (key, value) in document {
            let spec = self.metadata.require_field(&key)?;
            if !value.is_null() && !spec.field_type.accepts(&value) {
                return Err(RepoError::InvalidInput {
                    reason: format!(
                        "{}.{} expects {}, got {}",
                        self.metadata.name(),
                        key,
                        spec.field_type.name(),
                        value_kind(&value)
                    ),
                });
            }
            if spec.is_identifier {
                if !value.is_null() {
                    id = Some(self.driver.backend().native_id(spec, &value)?);
                }
            } else {
                stored.insert(spec.storage_name.clone(), value);
            }
        }
        Ok((id, stored))
    }

    pub(crate) async fn find_with<T>(
        &self,
        descriptor: &FindDescriptor,
        convert: Converter<T>,
    ) -> Result<Vec<T>> {
        let translated = translate(self.driver.backend().as_ref(), &self.metadata, descriptor)?;
        let Execution::Eager(records) = self
            .driver
            .execute(translated.native, ExecutionMode::Eager)
            .await?
        else {
            return Err(RepoError::query(
                self.driver.backend().name(),
                "eager execution returned a cursor",
            ));
        };
        records
            .into_iter()
            .map(|raw| hydrate(&self.metadata, raw, &translated.projection).and_then(convert))
            .collect()
    }

    pub(crate) async fn find_one_with<T>(
        &self,
        descriptor: &FindDescriptor,
        convert: Converter<T>,
    ) -> Result<Option<T>> {
        let mut descriptor = descriptor.clone();
        descriptor.limit = Some(descriptor.limit.map_or(1, |limit| limit.min(1)));
        let found = self.find_with(&descriptor, convert).await?;
        Ok(found.into_iter().next())
    }

    pub(crate) async fn find_by_id_with<T>(
        &self,
        id: &Value,
        convert: Converter<T>,
    ) -> Result<Option<T>> {
        let id_spec = self.metadata.identifier();
        if !id_spec.field_type.accepts(id) {
            return Err(RepoError::InvalidInput {
                reason: format!(
                    "identifier of {} expects {}, got {}",
                    self.metadata.name(),
                    id_spec.field_type.name(),
                    value_kind(id)
                ),
            });
        }
        let descriptor =
            FindDescriptor::new().filter(PredicateNode::eq(id_spec.name.clone(), id.clone()));
        self.find_one_with(&descriptor, convert).await
    }

    async fn count_matching(&self, filter: Option<&PredicateNode>) -> Result<u64> {
        let lowered = translate_filter(self.driver.backend().as_ref(), &self.metadata, filter)?;
        self.driver.count(&self.metadata, lowered).await
    }

    pub(crate) async fn delete_record(&self, id: &Value) -> Result<bool> {
        let native = self
            .driver
            .backend()
            .native_id(self.metadata.identifier(), id)?;
        self.driver.delete(&self.metadata, native).await
    }

    pub(crate) async fn cursor_with<T>(
        &self,
        descriptor: &FindDescriptor,
        convert: Converter<T>,
    ) -> Result<EntityCursor<T, B::Cursor>> {
        let translated = translate(self.driver.backend().as_ref(), &self.metadata, descriptor)?;
        let Execution::Lazy(raw) = self
            .driver
            .execute(translated.native, ExecutionMode::Lazy)
            .await?
        else {
            return Err(RepoError::query(
                self.driver.backend().name(),
                "lazy execution returned materialized records",
            ));
        };
        Ok(
            EntityCursor::new(raw, self.metadata.clone(), translated.projection, convert)
                .with_timeout(
                    self.driver.backend().name(),
                    self.driver.options().timeout,
                ),
        )
    }
}

fn option_rows<T>(found: &Option<T>) -> usize {
    usize::from(found.is_some())
}

/// Repository for a compiled entity type
pub struct Repository<T: Entity, B: Backend> {
    inner: RecordRepository<B>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, B: Backend> Clone for Repository<T, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, B: Backend> Repository<T, B> {
    pub fn new(inner: RecordRepository<B>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        self.inner.metadata()
    }

    /// Untyped view over the same entity
    pub fn records(&self) -> &RecordRepository<B> {
        &self.inner
    }

    /// Persist `entity`, returning it with its identifier set
    ///
    /// # Errors
    ///
    /// `Serialization` when `T` does not serialize to an object, otherwise
    /// as [`RecordRepository::save`].
    pub async fn save(&self, entity: &T) -> Result<T> {
        self.inner.observe("save", self.save_entity(entity), |_| 1).await
    }

    /// Save several entities in order
    ///
    /// # Errors
    ///
    /// Stops at the first failing save; earlier saves stay applied.
    pub async fn save_all(&self, entities: &[T]) -> Result<Vec<T>> {
        self.inner
            .observe(
                "save_all",
                async {
                    let mut saved = Vec::with_capacity(entities.len());
                    for entity in entities {
                        saved.push(self.save_entity(entity).await?);
                    }
                    Ok::<_, RepoError>(saved)
                },
                Vec::len,
            )
            .await
    }

    /// # Errors
    ///
    /// As [`RecordRepository::find`], plus `Serialization` when a record does
    /// not deserialize into `T`.
    pub async fn find(&self, descriptor: &FindDescriptor) -> Result<Vec<T>> {
        self.inner
            .observe(
                "find",
                self.inner.find_with(descriptor, EntityRecord::into_entity::<T>),
                Vec::len,
            )
            .await
    }

    /// # Errors
    ///
    /// As [`Repository::find`].
    pub async fn find_one(&self, descriptor: &FindDescriptor) -> Result<Option<T>> {
        self.inner
            .observe(
                "find_one",
                self.inner
                    .find_one_with(descriptor, EntityRecord::into_entity::<T>),
                option_rows,
            )
            .await
    }

    /// # Errors
    ///
    /// As [`RecordRepository::find_by_id`].
    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<T>> {
        let id = id.into();
        self.inner
            .observe(
                "find_by_id",
                self.inner
                    .find_by_id_with(&id, EntityRecord::into_entity::<T>),
                option_rows,
            )
            .await
    }

    /// # Errors
    ///
    /// As [`RecordRepository::count`].
    pub async fn count(&self, filter: Option<&PredicateNode>) -> Result<u64> {
        self.inner.count(filter).await
    }

    /// # Errors
    ///
    /// As [`RecordRepository::delete_by_id`].
    pub async fn delete_by_id(&self, id: impl Into<Value>) -> Result<bool> {
        self.inner.delete_by_id(&id.into()).await
    }

    /// Lazy cursor over entities matching a JSON filter shorthand
    ///
    /// # Errors
    ///
    /// As [`RecordRepository::create_cursor`].
    pub async fn create_cursor(&self, filter: &Value) -> Result<EntityCursor<T, B::Cursor>> {
        let descriptor = FindDescriptor::from_filter(filter)?;
        self.create_cursor_with(&descriptor).await
    }

    /// # Errors
    ///
    /// As [`RecordRepository::create_cursor_with`].
    pub async fn create_cursor_with(
        &self,
        descriptor: &FindDescriptor,
    ) -> Result<EntityCursor<T, B::Cursor>> {
        self.inner
            .observe(
                "create_cursor",
                self.inner
                    .cursor_with(descriptor, EntityRecord::into_entity::<T>),
                |_| 0,
            )
            .await
    }

    async fn save_entity(&self, entity: &T) -> Result<T> {
        let Value::Object(mut document) = serde_json::to_value(entity)? else {
            return Err(RepoError::Serialization {
                message: format!("{} must serialize to a JSON object", T::entity_name()),
            });
        };
        let record = self.inner.save_document(document.clone()).await?;
        document.insert(
            self.metadata().identifier().name.clone(),
            record.identity().clone(),
        );
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}

/// One live connection plus the registry
///
/// Hands out repositories that share the connection.
pub struct DataSource<B: Backend> {
    driver: Arc<DriverAdapter<B>>,
    registry: Arc<MetadataRegistry>,
}

impl<B: Backend> DataSource<B> {
    pub fn new(backend: B, registry: MetadataRegistry, options: ExecutionOptions) -> Self {
        Self::from_shared(Arc::new(backend), Arc::new(registry), options)
    }

    pub fn from_shared(
        backend: Arc<B>,
        registry: Arc<MetadataRegistry>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            driver: Arc::new(DriverAdapter::new(backend, options)),
            registry,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        self.driver.backend()
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn is_live(&self) -> bool {
        self.driver.backend().is_live()
    }

    /// Repository for a registered entity type
    ///
    /// # Errors
    ///
    /// `UnknownEntity` when `T` was never registered.
    pub fn repository<T: Entity>(&self) -> Result<Repository<T, B>> {
        let metadata = self.registry.resolve::<T>()?;
        Ok(Repository::new(RecordRepository::new(
            self.driver.clone(),
            metadata,
        )))
    }

    /// Untyped repository by entity name
    ///
    /// # Errors
    ///
    /// `UnknownEntity` when no entity of that name was registered.
    pub fn record_repository(&self, name: &str) -> Result<RecordRepository<B>> {
        let metadata = self.registry.resolve_name(name)?;
        Ok(RecordRepository::new(self.driver.clone(), metadata))
    }

    /// Close the underlying connection
    pub async fn close(&self) {
        self.driver.backend().close().await;
        tracing::info!(backend = self.driver.backend().name(), "data source closed");
    }
}
