// Copyright (c) 2026 Strata Contributors. MIT License.
// See LICENSE for details.

//! # Strata CLI
//!
//! Entry point for the `strata` binary. Parses CLI arguments, initializes
//! logging, opens the chain directory and runs one subcommand:
//!
//! - `init`: create the directory and genesis block
//! - `append`: add a JSON value as a block
//! - `show`: list recent blocks
//! - `validate`: check the hash links, fully or for the last N blocks
//! - `demo`: append four sample readings and validate
//! - `version`: print build version information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use strata_ledger::config::PRIMARY_HASH_FUNCTION;
use strata_ledger::storage::{ValidateOptions, ValidationOutcome, ValidationReport};
use strata_ledger::ChainStore;

use cli::{Commands, StrataCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = StrataCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(&cli.log_level, cli.log_format)?;

    let chain = ChainStore::open(&cli.data_dir)
        .await
        .with_context(|| format!("failed to open chain at {}", cli.data_dir.display()))?;
    tracing::info!(
        data_dir = %cli.data_dir.display(),
        next_id = chain.next_id(),
        "data directory ready"
    );

    match cli.command {
        Commands::Init => {
            println!("Chain ready.");
            println!("  Directory : {}", chain.dir().display());
            println!("  Tail      : {}", chain.tail_hash());
            println!("  Blocks    : {}", chain.next_id());
            Ok(())
        }
        Commands::Append(args) => append(&chain, &args.json).await,
        Commands::Show(args) => show(&chain, args.limit).await,
        Commands::Validate(args) => {
            let mut opts = ValidateOptions {
                last: args.last,
                from: None,
            };
            if let Some(from) = args.from {
                opts = opts.from(from);
            }
            let report = chain.verify(opts).await?;
            print_report("Chain", &report);
            if !report.is_valid() {
                bail!("chain validation failed");
            }
            Ok(())
        }
        Commands::Demo => demo(&chain).await,
        Commands::Version => Ok(()),
    }
}

async fn append(chain: &ChainStore, raw: &str) -> Result<()> {
    let data: Value = serde_json::from_str(raw).context("block payload is not valid JSON")?;
    let block = chain.add_block(&data).await?;
    println!("{} {}", block.id, block.hash);
    Ok(())
}

/// Prints one JSON line per block so the output can be piped into `jq`.
async fn show(chain: &ChainStore, limit: usize) -> Result<()> {
    for entry in chain.history(None, Some(limit)).await? {
        let line = json!({
            "hash": entry.hash,
            "id": entry.block.id,
            "prev": entry.block.prev,
            "timestamp": entry.block.timestamp,
            "data": entry.block.data,
        });
        println!("{line}");
    }
    Ok(())
}

async fn demo(chain: &ChainStore) -> Result<()> {
    let before = chain.verify(ValidateOptions::default()).await?;
    print_report("Chain before demo", &before);

    for (value, precision) in [(13.5, 0.1), (13.6, 0.01), (13.2, 0.001), (13.4, 0.1)] {
        let block = chain
            .add_block(&json!({ "value": value, "unit": "m/s", "precision": precision }))
            .await?;
        tracing::debug!(id = block.id, hash = %block.hash, "reading appended");
    }

    let after = chain.verify(ValidateOptions::default()).await?;
    print_report("Chain after demo", &after);
    Ok(())
}

fn print_report(label: &str, report: &ValidationReport) {
    match &report.outcome {
        ValidationOutcome::Valid => {
            println!("{label}: valid ({} blocks checked)", report.checked)
        }
        ValidationOutcome::Broken { at, reason } => {
            println!(
                "{label}: INVALID at {at}: {reason} ({} blocks checked)",
                report.checked
            )
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("strata {}", env!("CARGO_PKG_VERSION"));
    println!("hash   {}", PRIMARY_HASH_FUNCTION);
}
