//! The command-line surface over the mutation engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;

use crate::backup::BackupPolicy;
use crate::engine::{EngineOptions, MutationEngine};
use crate::filespec::FileSpec;
use crate::guard::LockOptions;
use crate::request::{InsertRequest, RemoveRequest};

#[derive(Debug, Args)]
pub struct EngineArgs {
    /// The ledger journal to operate on.
    #[arg(short = 'f', long = "file")]
    ledger: PathBuf,
    /// Directory for pre-write snapshots. Defaults to a `.backups` directory
    /// next to the ledger.
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// Number of backups to retain when pruning.
    #[arg(long, default_value_t = 10)]
    backup_retention: usize,
    /// Seconds to wait for the ledger lock before giving up.
    #[arg(long, default_value_t = 10.0)]
    lock_timeout: f64,
}

impl EngineArgs {
    fn engine(&self) -> MutationEngine {
        let options = EngineOptions {
            lock: LockOptions {
                timeout: Duration::from_secs_f64(self.lock_timeout),
                ..Default::default()
            },
            backup_policy: BackupPolicy {
                max_count: Some(self.backup_retention),
                max_age: None,
            },
            backup_dir: self.backup_dir.clone(),
        };
        MutationEngine::new(self.ledger.clone(), options)
    }
}

#[derive(Debug, Args)]
pub struct InsertCmd {
    #[command(flatten)]
    engine: EngineArgs,
    /// JSON insert request to execute. "-" reads stdin.
    #[arg(long, default_value = "-")]
    request: FileSpec,
    /// Report the would-be change without writing it.
    #[arg(long)]
    dry_run: bool,
}

impl InsertCmd {
    pub fn run(&self) -> Result<()> {
        let mut request: InsertRequest = serde_json::from_str(&self.request.read_to_string()?)?;
        request.dry_run |= self.dry_run;
        let outcome = self.engine.engine().insert(&request)?;
        print_json(&outcome)
    }
}

#[derive(Debug, Args)]
pub struct RemoveCmd {
    #[command(flatten)]
    engine: EngineArgs,
    /// Stable id of the transaction to remove.
    txn_id: String,
    /// Only match a transaction on this date.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Only match a transaction with this payee.
    #[arg(long)]
    payee: Option<String>,
    /// Report the would-be change without writing it.
    #[arg(long)]
    dry_run: bool,
}

impl RemoveCmd {
    pub fn run(&self) -> Result<()> {
        let request = RemoveRequest {
            txn_id: self.txn_id.clone(),
            date: self.date,
            payee: self.payee.clone(),
            dry_run: self.dry_run,
        };
        let outcome = self.engine.engine().remove(&request)?;
        print_json(&outcome)
    }
}

#[derive(Debug, Args)]
pub struct CheckCmd {
    #[command(flatten)]
    engine: EngineArgs,
}

impl CheckCmd {
    pub fn run(&self) -> Result<()> {
        let diagnostics = self.engine.engine().check()?;
        print_json(&diagnostics)?;
        if diagnostics.has_errors() {
            bail!("ledger has {} validation errors", diagnostics.error_count());
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PruneCmd {
    #[command(flatten)]
    engine: EngineArgs,
}

impl PruneCmd {
    pub fn run(&self) -> Result<()> {
        let deleted = self.engine.engine().prune_backups()?;
        print_json(&deleted)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
