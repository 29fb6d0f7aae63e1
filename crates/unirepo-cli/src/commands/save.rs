//! Save command
//!
//! Usage: unirepo save --entity <NAME> --json <OBJECT>
//!
//! Without an identifier the record is inserted; with one it is inserted or
//! fully replaced.

use clap::Args;
use serde_json::Value;
use unirepo_core::backend::Backend;
use unirepo_core::config::AppConfig;
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::DataSource;

use super::{connect, emit, op_error, parse_json, with_source};

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[arg(long)]
    pub entity: String,

    /// Record as a JSON object keyed by field name
    #[arg(long)]
    pub json: String,
}

pub async fn execute(config: &AppConfig, args: SaveArgs) -> Result<(), ExError> {
    let connected = connect(config).await.map_err(|e| op_error("save", e))?;
    let result = with_source!(&connected, |source| save(source, &args).await);
    connected.close().await;
    emit("save", result)
}

async fn save<B: Backend>(source: &DataSource<B>, args: &SaveArgs) -> Result<Vec<Value>, RepoError> {
    let records = source.record_repository(&args.entity)?;
    let Value::Object(document) = parse_json("--json", &args.json)? else {
        return Err(RepoError::InvalidInput {
            reason: "--json must be a JSON object".to_string(),
        });
    };
    let saved = records.save(document).await?;
    Ok(vec![saved.to_json()])
}
