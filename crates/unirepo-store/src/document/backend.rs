//! Document backend
//!
//! Lowers predicates to filter documents (`{"title": "x"}`,
//! `{"$or": [...]}`), projections to inclusion maps and runs them against a
//! [`DocumentServer`]. Identifiers live under `_id`; backend-assigned ones
//! are [`ObjectId`]s, or a per-collection sequence for integer identifiers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use unirepo_core::backend::{Backend, BackendFamily, QueryPlan, RawRecord};
use unirepo_core::config::{BackendKind, ConnectionConfig};
use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::{Document, EntityMetadata, FieldSpec, FieldType, NativeId, ObjectId};
use unirepo_core::query::{ComparisonOp, LogicalOp, ResolvedProjection, SortDirection};

use crate::document::cursor::DocumentCursor;
use crate::document::query::DocumentQuery;
use crate::document::server::{DocumentServer, ServerError, ID_KEY};

/// Liveness and open cursors of one connection
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) live: AtomicBool,
    pub(crate) cursors: Mutex<HashSet<u64>>,
}

impl Session {
    fn live() -> Self {
        Self {
            live: AtomicBool::new(true),
            cursors: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn forget(&self, cursor_id: u64) {
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.remove(&cursor_id);
        }
    }
}

pub struct DocumentBackend {
    name: String,
    server: Arc<DocumentServer>,
    session: Arc<Session>,
    batch_size: usize,
}

impl DocumentBackend {
    /// Connect to a private server, persisted at `config.path` when set
    ///
    /// # Errors
    ///
    /// `Config` when `config` is not a document connection, `Connection`
    /// when the storage file cannot be loaded.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        if config.backend != BackendKind::Document {
            return Err(RepoError::Config {
                message: format!("connection '{}' is not a document connection", config.name),
            });
        }
        let server = match &config.path {
            Some(path) => DocumentServer::open(path)
                .await
                .map_err(|e| RepoError::connection(&config.name, e.to_string()))?,
            None => DocumentServer::new(),
        };
        Ok(Self::connect_to(Arc::new(server), config))
    }

    /// Connect to an existing, possibly shared, server
    pub fn connect_to(server: Arc<DocumentServer>, config: &ConnectionConfig) -> Self {
        tracing::info!(
            backend = config.name.as_str(),
            family = BackendFamily::Document.as_str(),
            persisted = config.path.is_some(),
            "document connection opened"
        );
        Self {
            name: config.name.clone(),
            server,
            session: Arc::new(Session::live()),
            batch_size: config.cursor_batch_size.max(1),
        }
    }

    pub fn server(&self) -> &Arc<DocumentServer> {
        &self.server
    }

    fn server_error(&self, err: ServerError) -> RepoError {
        RepoError::query(&self.name, err.to_string())
    }

    fn storage_id(&self, identifier: &FieldSpec, value: &Value) -> Result<Value> {
        self.native_id(identifier, value)
            .map(|id| id.to_storage_value())
    }

    /// Split `_id` off a stored document
    fn to_raw(&self, mut doc: Document) -> Result<RawRecord> {
        let id = doc
            .remove(ID_KEY)
            .as_ref()
            .and_then(NativeId::from_storage_value)
            .ok_or_else(|| self.server_error(ServerError::MissingId))?;
        Ok(RawRecord::new(id, doc))
    }

    fn with_id(id: &NativeId, document: Document) -> Document {
        let mut stored = Document::new();
        stored.insert(ID_KEY.to_string(), id.to_storage_value());
        stored.extend(document);
        stored
    }
}

#[async_trait]
impl Backend for DocumentBackend {
    type Filter = Value;
    type Projection = Map<String, Value>;
    type Query = DocumentQuery;
    type Cursor = DocumentCursor;

    fn family(&self) -> BackendFamily {
        BackendFamily::Document
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        self.session.live.load(Ordering::SeqCst)
    }

    fn lower_comparison(&self, field: &FieldSpec, op: ComparisonOp, value: &Value) -> Result<Value> {
        let (key, operand) = if field.is_identifier {
            let operand = match (op, value) {
                (_, Value::Null) => Value::Null,
                (ComparisonOp::In, Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Null => Ok(Value::Null),
                            item => self.storage_id(field, item),
                        })
                        .collect::<Result<_>>()?,
                ),
                (_, value) => self.storage_id(field, value)?,
            };
            (ID_KEY.to_string(), operand)
        } else {
            (field.storage_name.clone(), value.clone())
        };

        // a bare object would read as an operator document
        let condition = match op {
            ComparisonOp::Eq if !operand.is_object() => operand,
            op => json!({ op.operator_name(): operand }),
        };
        let mut clause = Map::new();
        clause.insert(key, condition);
        Ok(Value::Object(clause))
    }

    fn lower_logical(&self, op: LogicalOp, children: Vec<Value>) -> Value {
        json!({ op.operator_name(): children })
    }

    fn lower_projection(
        &self,
        metadata: &EntityMetadata,
        projection: &ResolvedProjection,
    ) -> Map<String, Value> {
        let mut lowered = Map::new();
        lowered.insert(ID_KEY.to_string(), json!(1));
        for name in &projection.retrieve {
            if let Some(spec) = metadata.field(name).filter(|s| !s.is_identifier) {
                lowered.insert(spec.storage_name.clone(), json!(1));
            }
        }
        lowered
    }

    fn compile(
        &self,
        metadata: &EntityMetadata,
        plan: QueryPlan<Value, Map<String, Value>>,
    ) -> DocumentQuery {
        let id_storage = &metadata.identifier().storage_name;
        let sort = plan
            .order
            .into_iter()
            .map(|(key, direction)| {
                let key = if &key == id_storage { ID_KEY.to_string() } else { key };
                let direction = match direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (key, direction)
            })
            .collect();

        DocumentQuery {
            collection: metadata.storage_name().to_string(),
            filter: plan.filter.unwrap_or_else(|| json!({})),
            projection: plan.projection,
            sort,
            skip: plan.page.skip.unwrap_or(0),
            limit: plan.page.limit,
        }
    }

    async fn fetch(&self, query: DocumentQuery) -> Result<Vec<RawRecord>> {
        tracing::debug!(backend = self.name.as_str(), command = %query.to_command(), "find");
        let docs = self
            .server
            .find(&query)
            .await
            .map_err(|e| self.server_error(e))?;
        docs.into_iter().map(|doc| self.to_raw(doc)).collect()
    }

    async fn open_cursor(&self, query: DocumentQuery) -> Result<DocumentCursor> {
        tracing::debug!(backend = self.name.as_str(), command = %query.to_command(), "open cursor");
        let id = self
            .server
            .open_cursor(&query)
            .await
            .map_err(|e| self.server_error(e))?;
        if let Ok(mut cursors) = self.session.cursors.lock() {
            cursors.insert(id);
        }
        Ok(DocumentCursor::new(
            id,
            self.name.clone(),
            self.server.clone(),
            self.session.clone(),
            self.batch_size,
        ))
    }

    async fn count(&self, metadata: &EntityMetadata, filter: Option<Value>) -> Result<u64> {
        let filter = filter.unwrap_or_else(|| json!({}));
        self.server
            .count(metadata.storage_name(), &filter)
            .await
            .map_err(|e| self.server_error(e))
    }

    fn native_id(&self, identifier: &FieldSpec, value: &Value) -> Result<NativeId> {
        match value {
            Value::String(s) => Ok(ObjectId::parse_str(s)
                .map(NativeId::ObjectId)
                .unwrap_or_else(|| NativeId::Text(s.clone()))),
            Value::Number(n) => n.as_i64().map(NativeId::Integer).ok_or_else(|| {
                RepoError::InvalidInput {
                    reason: format!("identifier {} must be an integer, got {}", identifier.name, n),
                }
            }),
            other => Err(RepoError::InvalidInput {
                reason: format!("unsupported identifier value for {}: {}", identifier.name, other),
            }),
        }
    }

    async fn insert(&self, metadata: &EntityMetadata, document: Document) -> Result<NativeId> {
        if metadata.identifier().field_type == FieldType::Integer {
            let mut stored = document;
            stored.remove(ID_KEY);
            return self
                .server
                .insert_sequenced(metadata.storage_name(), stored)
                .await
                .map(NativeId::Integer)
                .map_err(|e| self.server_error(e));
        }
        let id = NativeId::ObjectId(ObjectId::new());
        self.server
            .insert_one(metadata.storage_name(), Self::with_id(&id, document))
            .await
            .map_err(|e| self.server_error(e))?;
        Ok(id)
    }

    async fn upsert(&self, metadata: &EntityMetadata, id: NativeId, document: Document) -> Result<()> {
        self.server
            .replace_one(metadata.storage_name(), Self::with_id(&id, document), true)
            .await
            .map(|_| ())
            .map_err(|e| self.server_error(e))
    }

    async fn delete(&self, metadata: &EntityMetadata, id: NativeId) -> Result<bool> {
        self.server
            .delete_one(metadata.storage_name(), &id.to_storage_value())
            .await
            .map_err(|e| self.server_error(e))
    }

    async fn close(&self) {
        self.session.live.store(false, Ordering::SeqCst);
        let ids: Vec<u64> = self
            .session
            .cursors
            .lock()
            .map(|mut cursors| cursors.drain().collect())
            .unwrap_or_default();
        for id in &ids {
            self.server.kill_cursor(*id);
        }
        tracing::info!(
            backend = self.name.as_str(),
            released_cursors = ids.len(),
            "document connection closed"
        );
    }
}
