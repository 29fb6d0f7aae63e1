//! Error helpers for unirepo-store
//!
//! Backends report failures through the core `RepoError`; these helpers
//! attach the connection name.

use unirepo_core::errors::RepoError;

pub use unirepo_core::errors::Result;

/// Query failure reported by SQLite
pub fn from_rusqlite(backend: &str, err: rusqlite::Error) -> RepoError {
    RepoError::query(backend, err.to_string())
}

/// SQLite database could not be opened or configured
pub fn open_error(backend: &str, err: rusqlite::Error) -> RepoError {
    RepoError::connection(backend, format!("cannot open database: {}", err))
}

/// Blocking task panicked or was cancelled
pub fn join_error(backend: &str, err: tokio::task::JoinError) -> RepoError {
    RepoError::query(backend, format!("blocking task failed: {}", err))
}

/// Connection mutex poisoned by a panic in another task
pub fn lock_poisoned(backend: &str) -> RepoError {
    RepoError::connection(backend, "connection lock poisoned")
}

/// Connection closed under an open cursor or pending call
pub fn closed(backend: &str) -> RepoError {
    RepoError::connection(backend, "connection is closed")
}

/// Entity declaration differs from the one recorded at synchronization
pub fn schema_drift(entity: &str, table: &str, recorded: &str, declared: &str) -> RepoError {
    RepoError::InvalidMetadata {
        entity: entity.to_string(),
        reason: format!(
            "declaration of table '{}' changed since it was synchronized (recorded checksum {}, declared {})",
            table, recorded, declared
        ),
    }
}
