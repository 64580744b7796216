use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(test)]
mod testutil;

mod backup;
mod cmd;
mod comment;
mod diff;
mod document;
mod engine;
mod error;
mod filespec;
mod format;
mod guard;
mod identity;
mod internal;
mod request;
mod validate;
mod writer;

#[derive(Debug, Parser)]
/// Utilities for safely mutating Ledger journals.
struct Command {
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Debug, Subcommand)]
enum SubCommand {
    /// Appends a transaction to the ledger, assigning it a stable id.
    Insert(cmd::InsertCmd),
    /// Removes the transaction carrying the given stable id.
    Remove(cmd::RemoveCmd),
    /// Validates the ledger as-is and prints diagnostics.
    Check(cmd::CheckCmd),
    /// Applies the backup retention policy.
    Prune(cmd::PruneCmd),
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgermut=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cmd = Command::parse();
    use SubCommand::*;
    match cmd.subcmd {
        Insert(cmd) => cmd.run(),
        Remove(cmd) => cmd.run(),
        Check(cmd) => cmd.run(),
        Prune(cmd) => cmd.run(),
    }
}
