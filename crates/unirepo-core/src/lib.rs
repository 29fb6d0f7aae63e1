//! unirepo core - backend-agnostic repository layer
//!
//! This crate provides:
//! - Entity metadata and the immutable metadata registry
//! - Find descriptors, filter predicates and projection resolution
//! - The `Backend` capability trait and the query translator
//! - The driver execution adapter, hydrator and lazy cursor
//! - The repository facade and `DataSource`
//! - Error facility, logging facility and TOML configuration
//!
//! Concrete backends live in `unirepo-store`.

pub mod backend;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod errors;
pub mod hydrate;
pub mod logging_facility;
pub mod model;
pub mod query;
pub mod registry;
pub mod repository;
pub mod translate;

pub use unirepo_core_types;

// Re-export commonly used types
pub use backend::{Backend, BackendFamily, Page, QueryPlan, RawCursor, RawRecord};
pub use config::{AppConfig, BackendKind, ConnectionConfig};
pub use cursor::{CursorState, EntityCursor};
pub use driver::{DriverAdapter, Execution, ExecutionMode, ExecutionOptions};
pub use errors::{ExError, ExErrorKind, RepoError, Result};
pub use hydrate::EntityRecord;
pub use model::{Document, Entity, EntityMetadata, FieldSpec, FieldType, NativeId, ObjectId};
pub use query::{FindDescriptor, PredicateNode, SortDirection};
pub use registry::MetadataRegistry;
pub use repository::{DataSource, RecordRepository, Repository};
