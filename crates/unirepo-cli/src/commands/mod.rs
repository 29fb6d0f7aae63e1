//! Subcommands and the connection plumbing they share

use std::path::Path;

use serde_json::Value;
use unirepo_core::config::{AppConfig, BackendKind};
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::DataSource;
use unirepo_store::{document_source, sqlite_source, DocumentBackend, SqliteBackend};

pub mod count;
pub mod delete;
pub mod find;
pub mod save;
pub mod sync;

/// A data source for whichever backend the configuration names
pub enum Connected {
    Document(DataSource<DocumentBackend>),
    Sqlite(DataSource<SqliteBackend>),
}

impl Connected {
    pub async fn close(&self) {
        match self {
            Connected::Document(source) => source.close().await,
            Connected::Sqlite(source) => source.close().await,
        }
    }
}

/// Evaluate `$body` with `$source` bound to the connected `DataSource`
macro_rules! with_source {
    ($connected:expr, |$source:ident| $body:expr) => {
        match $connected {
            $crate::commands::Connected::Document($source) => $body,
            $crate::commands::Connected::Sqlite($source) => $body,
        }
    };
}
pub(crate) use with_source;

/// Load the configuration; a relative database path is taken relative to
/// the configuration file
pub fn load(path: &Path) -> Result<AppConfig, ExError> {
    let mut config = AppConfig::load(path).map_err(|e| op_error("load_config", e))?;
    if let (Some(db_path), Some(dir)) = (config.connection.path.as_mut(), path.parent()) {
        if db_path.is_relative() {
            *db_path = dir.join(&*db_path);
        }
    }
    Ok(config)
}

pub async fn connect(config: &AppConfig) -> Result<Connected, RepoError> {
    let registry = config.build_registry()?;
    match config.connection.backend {
        BackendKind::Document => document_source(&config.connection, registry)
            .await
            .map(Connected::Document),
        BackendKind::Sqlite => sqlite_source(&config.connection, registry)
            .await
            .map(Connected::Sqlite),
    }
}

pub fn op_error(op: &'static str, err: RepoError) -> ExError {
    ExError::from(err).with_op(op)
}

/// Print each result as one JSON line
pub fn emit(op: &'static str, result: Result<Vec<Value>, RepoError>) -> Result<(), ExError> {
    for line in result.map_err(|e| op_error(op, e))? {
        println!("{}", line);
    }
    Ok(())
}

/// Parse a JSON argument
pub fn parse_json(flag: &str, text: &str) -> Result<Value, RepoError> {
    serde_json::from_str(text).map_err(|e| RepoError::InvalidInput {
        reason: format!("{} is not valid JSON: {}", flag, e),
    })
}
