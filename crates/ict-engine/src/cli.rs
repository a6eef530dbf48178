use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator-facing CLI surface (spec.md §6): `start`, `stop`, `status`,
/// `export-memory`, `import-memory`.
#[derive(Debug, Parser)]
#[command(name = "ict-engine", about = "Institutional-style ICT pattern trading engine")]
pub struct Cli {
    /// Path to the TOML config file (defaults to built-in values if absent).
    #[arg(long, env = "ICT_ENGINE_CONFIG", default_value = "ict-engine.toml")]
    pub config: PathBuf,

    /// Root of the persisted-state tree (memory/, metrics/, status/, journal/, reports/).
    #[arg(long, env = "ICT_ENGINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine loop until a shutdown signal is received.
    Start,
    /// Request a running instance to stop gracefully (via its PID file).
    Stop,
    /// Print a snapshot of engine health and positions, then exit.
    Status,
    /// Export the historical memory snapshot to the given path.
    ExportMemory {
        #[arg(long)]
        out: PathBuf,
    },
    /// Import a historical memory snapshot from the given path, replacing
    /// the current one.
    ImportMemory {
        #[arg(long)]
        from: PathBuf,
    },
}
