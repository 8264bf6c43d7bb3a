//! ebb CLI - Inspect and replay the offline mutation queue
//!
//! Operator tooling over the queue and conflict log persisted by ebb-core.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::conflicts::{run_conflicts, run_conflicts_clear};
use crate::commands::queue::run_queue;
use crate::commands::replay::run_replay;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "ebb=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Queue { command } => {
            let db_path = resolve_db_path(cli.db_path)?;
            let config_path = resolve_config_path(cli.config)?;
            run_queue(command, &db_path, &config_path).await?;
        }
        Commands::Conflicts { limit, json, clear } => {
            let db_path = resolve_db_path(cli.db_path)?;
            if clear {
                run_conflicts_clear(&db_path)?;
            } else {
                run_conflicts(limit, json, &db_path)?;
            }
        }
        Commands::Replay { endpoint } => {
            let db_path = resolve_db_path(cli.db_path)?;
            let config_path = resolve_config_path(cli.config)?;
            run_replay(endpoint, &db_path, &config_path).await?;
        }
        Commands::Config { command } => {
            let config_path = resolve_config_path(cli.config)?;
            run_config(command, &config_path)?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
