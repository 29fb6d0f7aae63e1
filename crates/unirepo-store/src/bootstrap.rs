//! Connection bootstrap
//!
//! Turns a loaded configuration into a live [`DataSource`].

use unirepo_core::config::ConnectionConfig;
use unirepo_core::errors::Result;
use unirepo_core::registry::MetadataRegistry;
use unirepo_core::repository::DataSource;

use crate::document::DocumentBackend;
use crate::relational::SqliteBackend;

/// Connect a document data source
///
/// # Errors
///
/// `Config` for an invalid or non-document connection, `Connection` when
/// the storage file cannot be loaded.
pub async fn document_source(
    config: &ConnectionConfig,
    registry: MetadataRegistry,
) -> Result<DataSource<DocumentBackend>> {
    let backend = DocumentBackend::connect(config).await?;
    Ok(DataSource::new(backend, registry, config.execution_options()))
}

/// Connect a sqlite data source, synchronizing tables when configured to
///
/// # Errors
///
/// `Config` for an invalid or non-sqlite connection, `Connection` when the
/// database cannot be opened, `InvalidMetadata` on schema drift.
pub async fn sqlite_source(
    config: &ConnectionConfig,
    registry: MetadataRegistry,
) -> Result<DataSource<SqliteBackend>> {
    let backend = SqliteBackend::connect(config).await?;
    if config.synchronize {
        backend.synchronize(&registry).await?;
    }
    Ok(DataSource::new(backend, registry, config.execution_options()))
}
