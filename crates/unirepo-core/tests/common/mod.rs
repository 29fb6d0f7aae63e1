//! Shared fixtures: a `Post` entity and a small in-memory backend that
//! records how many round trips reach it.

#![allow(dead_code)]

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use unirepo_core::backend::{Backend, BackendFamily, QueryPlan, RawCursor, RawRecord};
use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::{
    Document, Entity, EntityMetadata, EntityMetadataBuilder, FieldSpec, FieldType, NativeId,
};
use unirepo_core::query::{ComparisonOp, LogicalOp, ResolvedProjection, SortDirection};
use unirepo_core::{DataSource, ExecutionOptions, MetadataRegistry};

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

#[derive(Debug, Clone)]
pub enum MemFilter {
    Id(ComparisonOp, Value),
    Field(String, ComparisonOp, Value),
    Logical(LogicalOp, Vec<MemFilter>),
}

#[derive(Debug)]
pub struct MemQuery {
    pub collection: String,
    pub filter: Option<MemFilter>,
    pub projection: Vec<String>,
    pub order: Vec<(String, SortDirection)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// In-memory backend with integer identifiers
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Vec<(i64, Document)>>>,
    next_id: AtomicI64,
    closed: AtomicBool,
    pub round_trips: AtomicUsize,
    pub open_cursors: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
    }

    fn run(&self, query: &MemQuery) -> Vec<RawRecord> {
        let collections = self.collections.lock().unwrap();
        let mut rows: Vec<(i64, Document)> = collections
            .get(&query.collection)
            .map(|rows| {
                rows.iter()
                    .filter(|(id, doc)| query.filter.as_ref().map_or(true, |f| matches(f, *id, doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for (field, direction) in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare(a.1.get(field), b.1.get(field));
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        rows.into_iter()
            .skip(query.skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(id, doc)| {
                let fields = doc
                    .into_iter()
                    .filter(|(k, _)| query.projection.contains(k))
                    .collect();
                RawRecord::new(NativeId::Integer(id), fields)
            })
            .collect()
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

fn test_op(op: ComparisonOp, actual: Option<&Value>, expected: &Value) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    match op {
        ComparisonOp::Eq => actual == expected,
        ComparisonOp::Ne => actual != expected,
        ComparisonOp::In => expected
            .as_array()
            .map_or(false, |items| items.contains(actual)),
        ComparisonOp::Gt => compare(Some(actual), Some(expected)) == CmpOrdering::Greater,
        ComparisonOp::Gte => compare(Some(actual), Some(expected)) != CmpOrdering::Less,
        ComparisonOp::Lt => compare(Some(actual), Some(expected)) == CmpOrdering::Less,
        ComparisonOp::Lte => compare(Some(actual), Some(expected)) != CmpOrdering::Greater,
    }
}

fn matches(filter: &MemFilter, id: i64, doc: &Document) -> bool {
    match filter {
        MemFilter::Id(op, value) => test_op(*op, Some(&Value::from(id)), value),
        MemFilter::Field(field, op, value) => test_op(*op, doc.get(field), value),
        MemFilter::Logical(LogicalOp::And, children) => {
            children.iter().all(|c| matches(c, id, doc))
        }
        MemFilter::Logical(LogicalOp::Or, children) => {
            children.iter().any(|c| matches(c, id, doc))
        }
    }
}

fn to_integer_id(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| RepoError::InvalidInput {
        reason: format!("not an integer identifier: {}", value),
    })
}

pub struct MemCursor {
    rows: VecDeque<RawRecord>,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl RawCursor for MemCursor {
    fn id(&self) -> u64 {
        7
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let take = self.rows.len().min(2);
        Ok(Some(self.rows.drain(..take).collect()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Filter = MemFilter;
    type Projection = Vec<String>;
    type Query = MemQuery;
    type Cursor = MemCursor;

    fn family(&self) -> BackendFamily {
        BackendFamily::Document
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn lower_comparison(&self, field: &FieldSpec, op: ComparisonOp, value: &Value) -> Result<MemFilter> {
        if field.is_identifier {
            let value = match (op, value) {
                (ComparisonOp::In, Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|v| to_integer_id(v).map(Value::from))
                        .collect::<Result<_>>()?,
                ),
                (_, v) => Value::from(to_integer_id(v)?),
            };
            return Ok(MemFilter::Id(op, value));
        }
        Ok(MemFilter::Field(field.storage_name.clone(), op, value.clone()))
    }

    fn lower_logical(&self, op: LogicalOp, children: Vec<MemFilter>) -> MemFilter {
        MemFilter::Logical(op, children)
    }

    fn lower_projection(&self, metadata: &EntityMetadata, projection: &ResolvedProjection) -> Vec<String> {
        projection
            .retrieve
            .iter()
            .filter_map(|name| metadata.field(name))
            .map(|spec| spec.storage_name.clone())
            .collect()
    }

    fn compile(&self, metadata: &EntityMetadata, plan: QueryPlan<MemFilter, Vec<String>>) -> MemQuery {
        MemQuery {
            collection: metadata.storage_name().to_string(),
            filter: plan.filter,
            projection: plan.projection,
            order: plan.order,
            skip: plan.page.skip.unwrap_or(0) as usize,
            limit: plan.page.limit.map(|l| l as usize),
        }
    }

    async fn fetch(&self, query: MemQuery) -> Result<Vec<RawRecord>> {
        self.touch();
        Ok(self.run(&query))
    }

    async fn open_cursor(&self, query: MemQuery) -> Result<MemCursor> {
        self.touch();
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(MemCursor {
            rows: self.run(&query).into(),
            open_cursors: self.open_cursors.clone(),
            closed: false,
        })
    }

    async fn count(&self, metadata: &EntityMetadata, filter: Option<MemFilter>) -> Result<u64> {
        self.touch();
        let query = MemQuery {
            collection: metadata.storage_name().to_string(),
            filter,
            projection: Vec::new(),
            order: Vec::new(),
            skip: 0,
            limit: None,
        };
        Ok(self.run(&query).len() as u64)
    }

    fn native_id(&self, _identifier: &FieldSpec, value: &Value) -> Result<NativeId> {
        to_integer_id(value).map(NativeId::Integer)
    }

    async fn insert(&self, metadata: &EntityMetadata, document: Document) -> Result<NativeId> {
        self.touch();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.collections
            .lock()
            .unwrap()
            .entry(metadata.storage_name().to_string())
            .or_default()
            .push((id, document));
        Ok(NativeId::Integer(id))
    }

    async fn upsert(&self, metadata: &EntityMetadata, id: NativeId, document: Document) -> Result<()> {
        self.touch();
        let NativeId::Integer(id) = id else {
            return Err(RepoError::query("memory", "integer identifiers only"));
        };
        let mut collections = self.collections.lock().unwrap();
        let rows = collections
            .entry(metadata.storage_name().to_string())
            .or_default();
        match rows.iter_mut().find(|(existing, _)| *existing == id) {
            Some(row) => row.1 = document,
            None => rows.push((id, document)),
        }
        Ok(())
    }

    async fn delete(&self, metadata: &EntityMetadata, id: NativeId) -> Result<bool> {
        self.touch();
        let NativeId::Integer(id) = id else {
            return Ok(false);
        };
        let mut collections = self.collections.lock().unwrap();
        let Some(rows) = collections.get_mut(metadata.storage_name()) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|(existing, _)| *existing != id);
        Ok(rows.len() < before)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn post_registry() -> MetadataRegistry {
    MetadataRegistry::builder()
        .register::<Post>()
        .unwrap()
        .build()
}

pub fn memory_source() -> DataSource<MemoryBackend> {
    DataSource::new(
        MemoryBackend::default(),
        post_registry(),
        ExecutionOptions::default(),
    )
}

/// Data source holding Post #1 and Post #2
pub async fn seeded_source() -> DataSource<MemoryBackend> {
    let source = memory_source();
    let posts = source.repository::<Post>().unwrap();
    posts
        .save_all(&[
            Post::new("Post #1", "About post #1"),
            Post::new("Post #2", "About post #2"),
        ])
        .await
        .unwrap();
    source
}
