//! unirepo store - concrete backends for the repository core
//!
//! Provides:
//! - a document backend over an in-process document server, optionally
//!   persisted to a JSON file
//! - a SQLite backend with table synchronization and drift detection
//! - bootstrap helpers producing a ready `DataSource` from configuration

pub mod bootstrap;
pub mod db;
pub mod document;
pub mod errors;
pub mod relational;

pub use bootstrap::{document_source, sqlite_source};
pub use document::{DocumentBackend, DocumentServer};
pub use errors::Result;
pub use relational::{SqliteBackend, SyncOutcome};
