//! Find command
//!
//! Usage: unirepo find --entity <NAME> [--where <JSON>] [--select a,b | --exclude a,b]
//!        [--order field[:desc]]... [--skip N] [--limit N] [--stream]

use clap::Args;
use serde_json::Value;
use unirepo_core::backend::Backend;
use unirepo_core::config::AppConfig;
use unirepo_core::errors::{ExError, RepoError};
use unirepo_core::query::{FindDescriptor, SortDirection};
use unirepo_core::DataSource;

use super::{connect, emit, op_error, parse_json, with_source};

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Entity name as declared in the configuration
    #[arg(long)]
    pub entity: String,

    /// Filter document, e.g. '{"$or": [{"title": "a"}, {"title": "b"}]}'
    #[arg(long = "where")]
    pub filter: Option<String>,

    /// Fields to return
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<String>,

    /// Fields to leave out
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Sort key, `field` or `field:desc`; repeatable
    #[arg(long)]
    pub order: Vec<String>,

    #[arg(long)]
    pub skip: Option<u64>,

    #[arg(long)]
    pub limit: Option<u64>,

    /// Read through a cursor instead of one eager query
    #[arg(long)]
    pub stream: bool,
}

pub async fn execute(config: &AppConfig, args: FindArgs) -> Result<(), ExError> {
    let connected = connect(config).await.map_err(|e| op_error("find", e))?;
    let result = with_source!(&connected, |source| find(source, &args).await);
    connected.close().await;
    emit("find", result)
}

async fn find<B: Backend>(source: &DataSource<B>, args: &FindArgs) -> Result<Vec<Value>, RepoError> {
    let records = source.record_repository(&args.entity)?;
    let descriptor = descriptor(args)?;

    if args.stream {
        let mut cursor = records.create_cursor_with(&descriptor).await?;
        let mut out = Vec::new();
        while let Some(record) = cursor.next().await? {
            out.push(record.to_json());
        }
        return Ok(out);
    }

    Ok(records
        .find(&descriptor)
        .await?
        .iter()
        .map(|record| record.to_json())
        .collect())
}

fn descriptor(args: &FindArgs) -> Result<FindDescriptor, RepoError> {
    let mut descriptor = match &args.filter {
        Some(text) => FindDescriptor::from_filter(&parse_json("--where", text)?)?,
        None => FindDescriptor::new(),
    };
    if !args.select.is_empty() {
        descriptor = descriptor.select(args.select.iter().cloned());
    }
    if !args.exclude.is_empty() {
        descriptor = descriptor.exclude(args.exclude.iter().cloned());
    }
    for key in &args.order {
        let (field, direction) = parse_order(key)?;
        descriptor = descriptor.order_by(field, direction);
    }
    if let Some(skip) = args.skip {
        descriptor = descriptor.skip(skip);
    }
    if let Some(limit) = args.limit {
        descriptor = descriptor.limit(limit);
    }
    Ok(descriptor)
}

fn parse_order(key: &str) -> Result<(&str, SortDirection), RepoError> {
    match key.split_once(':') {
        None => Ok((key, SortDirection::Asc)),
        Some((field, "asc")) => Ok((field, SortDirection::Asc)),
        Some((field, "desc")) => Ok((field, SortDirection::Desc)),
        Some((_, other)) => Err(RepoError::InvalidInput {
            reason: format!("sort direction must be asc or desc, got '{}'", other),
        }),
    }
}
