//! unirepo CLI
//!
//! Runs repository operations against the connection and entities declared
//! in a TOML configuration file. Records are printed as JSON lines.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use unirepo_core::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "unirepo")]
#[command(about = "unirepo - one repository API over document and relational stores", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "unirepo.toml")]
    config: PathBuf,

    /// Emit logs as JSON instead of human-readable lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create missing tables and check declarations for drift
    Sync(commands::sync::SyncArgs),
    /// Find records of an entity
    Find(commands::find::FindArgs),
    /// Count records of an entity
    Count(commands::count::CountArgs),
    /// Insert or replace one record
    Save(commands::save::SaveArgs),
    /// Delete one record by identifier
    Delete(commands::delete::DeleteArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init(if cli.json_logs {
        Profile::Production
    } else {
        Profile::Development
    });

    let result = match commands::load(&cli.config) {
        Ok(config) => match cli.command {
            Commands::Sync(args) => commands::sync::execute(&config, args).await,
            Commands::Find(args) => commands::find::execute(&config, args).await,
            Commands::Count(args) => commands::count::execute(&config, args).await,
            Commands::Save(args) => commands::save::execute(&config, args).await,
            Commands::Delete(args) => commands::delete::execute(&config, args).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
