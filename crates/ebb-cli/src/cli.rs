use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ebb")]
#[command(about = "Inspect and replay the offline mutation queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or edit queued operations
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// List recorded merges and conflicts
    Conflicts {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Delete every recorded entry instead of listing
        #[arg(long)]
        clear: bool,
    },
    /// Replay queued operations against the configured endpoint
    Replay {
        /// Endpoint override for this run
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
    },
    /// Manage sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one queued operation as JSON
    Show {
        /// Operation ID
        id: String,
    },
    /// Remove one queued operation without replaying it
    Drop {
        /// Operation ID
        id: String,
    },
    /// Remove every queued operation
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the settings file
    Init {
        /// GraphQL endpoint
        #[arg(long, value_name = "URL")]
        endpoint: String,
        /// Storage key namespace
        #[arg(long, value_name = "NAME")]
        namespace: Option<String>,
        /// Re-submissions allowed per conflicting replay
        #[arg(long, value_name = "COUNT")]
        max_conflict_retries: Option<u32>,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Print the effective settings
    Show,
}
