//! Sync command
//!
//! Usage: unirepo sync
//!
//! Creates missing tables on a sqlite connection and fails when an entity's
//! declaration drifted since it was first synchronized. Document
//! collections need no preparation.

use clap::Args;
use serde_json::{json, Value};
use unirepo_core::config::{AppConfig, BackendKind};
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::Backend;
use unirepo_store::{SqliteBackend, SyncOutcome};

use super::emit;

#[derive(Debug, Args)]
pub struct SyncArgs {}

pub async fn execute(config: &AppConfig, _args: SyncArgs) -> Result<(), ExError> {
    emit("sync", sync(config).await)
}

async fn sync(config: &AppConfig) -> Result<Vec<Value>, RepoError> {
    let registry = config.build_registry()?;
    match config.connection.backend {
        BackendKind::Document => Ok(registry
            .entities()
            .map(|meta| {
                json!({
                    "entity": meta.name(),
                    "collection": meta.storage_name(),
                    "status": "schemaless"
                })
            })
            .collect()),
        BackendKind::Sqlite => {
            let backend = SqliteBackend::connect(&config.connection).await?;
            let outcomes = backend.synchronize(&registry).await;
            backend.close().await;
            Ok(outcomes?.iter().map(outcome_line).collect())
        }
    }
}

fn outcome_line(outcome: &SyncOutcome) -> Value {
    match outcome {
        SyncOutcome::Created { entity, table } => {
            json!({"entity": entity, "table": table, "status": "created"})
        }
        SyncOutcome::Unchanged { entity, table } => {
            json!({"entity": entity, "table": table, "status": "unchanged"})
        }
    }
}
