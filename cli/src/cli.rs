//! # CLI Interface
//!
//! Defines the command-line argument structure for `strata` using `clap`
//! derive. Every subcommand works on one chain directory, chosen with
//! `--data-dir` or `STRATA_DATA_DIR`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Tamper-evident, hash-chained block store.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Tamper-evident hash-chained block store", version)]
pub struct StrataCli {
    /// Chain directory. Created on first use.
    #[arg(long, short = 'd', env = "STRATA_DATA_DIR", default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, env = "STRATA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Log level for the strata crates, or a full filter directive string.
    /// Ignored when `RUST_LOG` is set.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the chain directory and its genesis block.
    Init,
    /// Append a JSON value as a new block.
    Append(AppendArgs),
    /// Print the most recent blocks, newest first.
    Show(ShowArgs),
    /// Walk the chain and check every link.
    Validate(ValidateArgs),
    /// Append four sample sensor readings and validate.
    Demo,
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct AppendArgs {
    /// Block payload, as JSON (e.g. '{"value": 13.5, "unit": "m/s"}').
    pub json: String,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Maximum number of blocks to print.
    #[arg(long, short = 'n', default_value_t = 10)]
    pub limit: usize,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Check only this many of the most recent blocks.
    #[arg(long)]
    pub last: Option<usize>,

    /// Start the walk at this block hash instead of the tail.
    #[arg(long)]
    pub from: Option<String>,
}
