//! SQLite backend
//!
//! Predicates lower to parameterized WHERE fragments, projections to column
//! lists. The single connection sits behind a mutex and every call runs on
//! the blocking pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use unirepo_core::backend::{Backend, BackendFamily, QueryPlan, RawRecord};
use unirepo_core::config::{BackendKind, ConnectionConfig};
use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::{Document, EntityMetadata, FieldSpec, NativeId};
use unirepo_core::query::{ComparisonOp, LogicalOp, ResolvedProjection};
use unirepo_core::registry::MetadataRegistry;

use crate::db;
use crate::errors::{closed, from_rusqlite, join_error, lock_poisoned};
use crate::relational::cursor::SqliteCursor;
use crate::relational::row::decode_row;
use crate::relational::schema::{self, SyncOutcome};
use crate::relational::sql::{quote, to_sql_value, SqlFilter, SqlProjection, SqlQuery};

/// State shared between the backend and its cursors
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) conn: Mutex<Connection>,
    pub(crate) live: AtomicBool,
    pub(crate) cursors: Mutex<HashSet<u64>>,
}

impl Shared {
    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn forget(&self, cursor_id: u64) {
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.remove(&cursor_id);
        }
    }

    pub(crate) fn is_registered(&self, cursor_id: u64) -> bool {
        self.cursors
            .lock()
            .map(|cursors| cursors.contains(&cursor_id))
            .unwrap_or(false)
    }
}

/// Run `f` against the connection on the blocking pool
pub(crate) async fn with_conn<R, F>(shared: &Arc<Shared>, f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
{
    if !shared.is_live() {
        return Err(closed(&shared.name));
    }
    let shared = shared.clone();
    let name = shared.name.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = shared.conn.lock().map_err(|_| lock_poisoned(&shared.name))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| join_error(&name, e))?
}

pub struct SqliteBackend {
    shared: Arc<Shared>,
    batch_size: usize,
}

impl SqliteBackend {
    /// Open the database at `config.path`, in memory when absent
    ///
    /// # Errors
    ///
    /// `Config` when `config` is not a sqlite connection, `Connection` when
    /// the database cannot be opened.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        if config.backend != BackendKind::Sqlite {
            return Err(RepoError::Config {
                message: format!("connection '{}' is not a sqlite connection", config.name),
            });
        }

        let name = config.name.clone();
        let path = config.path.clone();
        let conn = tokio::task::spawn_blocking(move || match path {
            Some(path) => db::open(&name, path),
            None => db::open_in_memory(&name),
        })
        .await
        .map_err(|e| RepoError::connection(&config.name, e.to_string()))??;

        tracing::info!(
            backend = config.name.as_str(),
            family = BackendFamily::Relational.as_str(),
            persisted = config.path.is_some(),
            "sqlite connection opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name.clone(),
                conn: Mutex::new(conn),
                live: AtomicBool::new(true),
                cursors: Mutex::new(HashSet::new()),
            }),
            batch_size: config.cursor_batch_size.max(1),
        })
    }

    /// Create missing tables for every registered entity
    ///
    /// # Errors
    ///
    /// `InvalidMetadata` when an entity's declaration changed since it was
    /// first synchronized.
    pub async fn synchronize(&self, registry: &MetadataRegistry) -> Result<Vec<SyncOutcome>> {
        let registry = registry.clone();
        let name = self.shared.name.clone();
        with_conn(&self.shared, move |conn| schema::synchronize(&name, conn, &registry)).await
    }

    /// Cursors opened and not yet released
    pub fn open_cursor_count(&self) -> usize {
        self.shared.cursors.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn column_values(
        &self,
        metadata: &EntityMetadata,
        document: &Document,
    ) -> Result<Vec<(String, SqlValue)>> {
        document
            .iter()
            .map(|(column, value)| {
                let spec = metadata
                    .field_by_storage_name(column)
                    .filter(|spec| !spec.is_identifier)
                    .ok_or_else(|| RepoError::InvalidInput {
                        reason: format!("{} has no column '{}'", metadata.storage_name(), column),
                    })?;
                Ok((column.clone(), to_sql_value(spec.field_type, value)?))
            })
            .collect()
    }

    fn id_value(id: &NativeId) -> Result<i64> {
        match id {
            NativeId::Integer(i) => Ok(*i),
            NativeId::Text(s) => s.parse().map_err(|_| RepoError::InvalidInput {
                reason: format!("identifier '{}' is not an integer", s),
            }),
            NativeId::ObjectId(oid) => Err(RepoError::InvalidInput {
                reason: format!("object id {} cannot key a sqlite row", oid),
            }),
        }
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    type Filter = SqlFilter;
    type Projection = SqlProjection;
    type Query = SqlQuery;
    type Cursor = SqliteCursor;

    fn family(&self) -> BackendFamily {
        BackendFamily::Relational
    }

    fn name(&self) -> &str {
        &self.shared.name
    }

    fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    fn lower_comparison(&self, field: &FieldSpec, op: ComparisonOp, value: &Value) -> Result<SqlFilter> {
        let convert = |item: &Value| -> Result<SqlValue> {
            match item {
                Value::Null => Ok(SqlValue::Null),
                item if field.is_identifier => {
                    Self::id_value(&self.native_id(field, item)?).map(SqlValue::Integer)
                }
                item => to_sql_value(field.field_type, item),
            }
        };
        let values = match (op, value) {
            (ComparisonOp::In, Value::Array(items)) => {
                items.iter().map(convert).collect::<Result<Vec<_>>>()?
            }
            (_, value) => vec![convert(value)?],
        };
        Ok(SqlFilter::compare(&field.storage_name, op, values))
    }

    fn lower_logical(&self, op: LogicalOp, children: Vec<SqlFilter>) -> SqlFilter {
        SqlFilter::combine(op, children)
    }

    fn lower_projection(&self, metadata: &EntityMetadata, projection: &ResolvedProjection) -> SqlProjection {
        SqlProjection {
            columns: metadata
                .fields()
                .iter()
                .filter(|spec| !spec.is_identifier && projection.retrieves(&spec.name))
                .map(|spec| (spec.storage_name.clone(), spec.field_type))
                .collect(),
        }
    }

    fn compile(&self, metadata: &EntityMetadata, plan: QueryPlan<SqlFilter, SqlProjection>) -> SqlQuery {
        SqlQuery {
            table: metadata.storage_name().to_string(),
            id_column: metadata.identifier().storage_name.clone(),
            projection: plan.projection,
            filter: plan.filter,
            order: plan.order,
            offset: plan.page.skip.unwrap_or(0),
            limit: plan.page.limit,
        }
    }

    async fn fetch(&self, query: SqlQuery) -> Result<Vec<RawRecord>> {
        let name = self.shared.name.clone();
        with_conn(&self.shared, move |conn| {
            let (sql, params) = query.render();
            tracing::debug!(backend = name.as_str(), sql = sql.as_str(), "select");
            run_select(&name, conn, &sql, &params, &query.projection)
        })
        .await
    }

    async fn open_cursor(&self, query: SqlQuery) -> Result<SqliteCursor> {
        if !self.is_live() {
            return Err(closed(&self.shared.name));
        }
        let name = self.shared.name.clone();
        let (sql, params) = query.render_ids();
        let ids = with_conn(&self.shared, move |conn| select_ids(&name, conn, &sql, &params)).await?;
        let cursor = SqliteCursor::new(self.shared.clone(), query, ids, self.batch_size);
        if let Ok(mut cursors) = self.shared.cursors.lock() {
            cursors.insert(cursor.cursor_id());
        }
        tracing::debug!(
            backend = self.shared.name.as_str(),
            cursor_id = cursor.cursor_id(),
            matched = cursor.remaining(),
            "open cursor"
        );
        Ok(cursor)
    }

    async fn count(&self, metadata: &EntityMetadata, filter: Option<SqlFilter>) -> Result<u64> {
        let name = self.shared.name.clone();
        let table = metadata.storage_name().to_string();
        with_conn(&self.shared, move |conn| {
            let (sql, params) = SqlQuery::render_count(&table, filter.as_ref());
            let count: i64 = conn
                .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
                .map_err(|e| from_rusqlite(&name, e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn native_id(&self, identifier: &FieldSpec, value: &Value) -> Result<NativeId> {
        let invalid = || RepoError::InvalidInput {
            reason: format!(
                "identifier {} must be an integer or integer string, got {}",
                identifier.name, value
            ),
        };
        match value {
            Value::Number(n) => n.as_i64().map(NativeId::Integer).ok_or_else(invalid),
            Value::String(s) => s.trim().parse().map(NativeId::Integer).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    async fn insert(&self, metadata: &EntityMetadata, document: Document) -> Result<NativeId> {
        let values = self.column_values(metadata, &document)?;
        let name = self.shared.name.clone();
        let table = quote(metadata.storage_name());
        with_conn(&self.shared, move |conn| {
            let sql = if values.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", table)
            } else {
                let columns: Vec<String> = values.iter().map(|(c, _)| quote(c)).collect();
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders)
            };
            conn.execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))
                .map_err(|e| from_rusqlite(&name, e))?;
            Ok(NativeId::Integer(conn.last_insert_rowid()))
        })
        .await
    }

    async fn upsert(&self, metadata: &EntityMetadata, id: NativeId, document: Document) -> Result<()> {
        let id = Self::id_value(&id)?;
        let given = self.column_values(metadata, &document)?;

        // full replace: columns absent from the document are reset to NULL
        let mut columns = Vec::new();
        let mut params = vec![SqlValue::Integer(id)];
        for spec in metadata.fields().iter().filter(|s| !s.is_identifier) {
            let value = given
                .iter()
                .find(|(c, _)| c == &spec.storage_name)
                .map(|(_, v)| v.clone())
                .unwrap_or(SqlValue::Null);
            columns.push(quote(&spec.storage_name));
            params.push(value);
        }

        let table = quote(metadata.storage_name());
        let id_column = quote(&metadata.identifier().storage_name);
        let sql = if columns.is_empty() {
            format!("INSERT OR IGNORE INTO {} ({}) VALUES (?)", table, id_column)
        } else {
            let updates: Vec<String> = columns
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            format!(
                "INSERT INTO {} ({}, {}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
                table,
                id_column,
                columns.join(", "),
                vec!["?"; params.len()].join(", "),
                id_column,
                updates.join(", ")
            )
        };

        let name = self.shared.name.clone();
        with_conn(&self.shared, move |conn| {
            conn.execute(&sql, params_from_iter(params.iter()))
                .map_err(|e| from_rusqlite(&name, e))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, metadata: &EntityMetadata, id: NativeId) -> Result<bool> {
        let id = Self::id_value(&id)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote(metadata.storage_name()),
            quote(&metadata.identifier().storage_name)
        );
        let name = self.shared.name.clone();
        with_conn(&self.shared, move |conn| {
            let removed = conn.execute(&sql, [id]).map_err(|e| from_rusqlite(&name, e))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn close(&self) {
        self.shared.live.store(false, Ordering::SeqCst);
        let released = self
            .shared
            .cursors
            .lock()
            .map(|mut cursors| cursors.drain().count())
            .unwrap_or(0);
        tracing::info!(
            backend = self.shared.name.as_str(),
            released_cursors = released,
            "sqlite connection closed"
        );
    }
}

/// Run a rendered SELECT and decode every row
pub(crate) fn run_select(
    backend: &str,
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    projection: &SqlProjection,
) -> Result<Vec<RawRecord>> {
    let mut stmt = conn.prepare(sql).map_err(|e| from_rusqlite(backend, e))?;
    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| from_rusqlite(backend, e))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(|e| from_rusqlite(backend, e))? {
        records.push(decode_row(backend, row, &projection.columns)?);
    }
    Ok(records)
}

/// Run a rendered identifier SELECT
fn select_ids(backend: &str, conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql).map_err(|e| from_rusqlite(backend, e))?;
    let ids = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))
        .map_err(|e| from_rusqlite(backend, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| from_rusqlite(backend, e))?;
    Ok(ids)
}
