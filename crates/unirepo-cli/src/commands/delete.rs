//! Delete command
//!
//! Usage: unirepo delete --entity <NAME> --id <ID>

use clap::Args;
use serde_json::{json, Value};
use unirepo_core::backend::Backend;
use unirepo_core::config::AppConfig;
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::model::FieldType;
use unirepo_core::DataSource;

use super::{connect, emit, op_error, with_source};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(long)]
    pub entity: String,

    #[arg(long)]
    pub id: String,
}

pub async fn execute(config: &AppConfig, args: DeleteArgs) -> Result<(), ExError> {
    let connected = connect(config).await.map_err(|e| op_error("delete", e))?;
    let result = with_source!(&connected, |source| delete(source, &args).await);
    connected.close().await;
    emit("delete", result)
}

async fn delete<B: Backend>(source: &DataSource<B>, args: &DeleteArgs) -> Result<Vec<Value>, RepoError> {
    let records = source.record_repository(&args.entity)?;
    let id = identifier_value(records.metadata().identifier().field_type, &args.id)?;
    let deleted = records.delete_by_id(&id).await?;
    Ok(vec![json!({"entity": args.entity, "id": id, "deleted": deleted})])
}

/// Command-line identifiers arrive as text; integer identifiers are parsed
fn identifier_value(field_type: FieldType, raw: &str) -> Result<Value, RepoError> {
    match field_type {
        FieldType::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| RepoError::InvalidInput {
                reason: format!("identifier '{}' is not an integer", raw),
            }),
        _ => Ok(Value::String(raw.to_string())),
    }
}
