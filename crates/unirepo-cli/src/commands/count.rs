//! Count command
//!
//! Usage: unirepo count --entity <NAME> [--where <JSON>]

use clap::Args;
use serde_json::{json, Value};
use unirepo_core::backend::Backend;
use unirepo_core::config::AppConfig;
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::query::PredicateNode;
use unirepo_core::DataSource;

use super::{connect, emit, op_error, parse_json, with_source};

#[derive(Debug, Args)]
pub struct CountArgs {
    #[arg(long)]
    pub entity: String,

    /// Filter document
    #[arg(long = "where")]
    pub filter: Option<String>,
}

pub async fn execute(config: &AppConfig, args: CountArgs) -> Result<(), ExError> {
    let connected = connect(config).await.map_err(|e| op_error("count", e))?;
    let result = with_source!(&connected, |source| count(source, &args).await);
    connected.close().await;
    emit("count", result)
}

async fn count<B: Backend>(source: &DataSource<B>, args: &CountArgs) -> Result<Vec<Value>, RepoError> {
    let records = source.record_repository(&args.entity)?;
    let filter = match &args.filter {
        Some(text) => PredicateNode::from_filter(&parse_json("--where", text)?)?,
        None => None,
    };
    let n = records.count(filter.as_ref()).await?;
    Ok(vec![json!({"entity": args.entity, "count": n})])
}
