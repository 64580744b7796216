//! Timestamped snapshots of the ledger file, with retention pruning.
//!
//! A snapshot is taken immediately before every write attempt and is never
//! mutated afterwards. Names are `<file>.<YYYYmmdd-HHMMSS>-<seq>.bak`; the
//! sequence number disambiguates snapshots within one timestamp second, and
//! lexicographic name order equals chronological order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::MutationError;
use crate::writer;

const BACKUP_SUFFIX: &str = ".bak";

/// Retention policy applied by `prune`. The most recent backup is always
/// retained, whatever the policy says.
#[derive(Clone, Debug)]
pub struct BackupPolicy {
    /// Keep at most this many backups.
    pub max_count: Option<usize>,
    /// Delete backups older than this.
    pub max_age: Option<Duration>,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_count: Some(10),
            max_age: None,
        }
    }
}

/// Handle onto one immutable snapshot.
#[derive(Clone, Debug)]
pub struct BackupHandle {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The default backups directory for a ledger: a `.backups` sibling.
    pub fn for_ledger(ledger: &Path) -> Self {
        let parent = ledger.parent().unwrap_or_else(|| Path::new("."));
        Self::new(parent.join(".backups"))
    }

    /// Copies the current bytes of `ledger` to a fresh snapshot.
    pub fn snapshot(&self, ledger: &Path) -> Result<BackupHandle, MutationError> {
        self.snapshot_inner(ledger)
            .map_err(|source| MutationError::BackupFailed { source })
    }

    fn snapshot_inner(&self, ledger: &Path) -> io::Result<BackupHandle> {
        fs::create_dir_all(&self.dir)?;
        let file_name = ledger_file_name(ledger)?;
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");

        let mut path = None;
        for seq in 0..u32::MAX {
            let candidate = self
                .dir
                .join(format!(
                    "{}.{}-{:03}{}",
                    file_name, timestamp, seq, BACKUP_SUFFIX
                ));
            if !candidate.exists() {
                path = Some(candidate);
                break;
            }
        }
        let path = path.ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "backup sequence exhausted")
        })?;

        fs::copy(ledger, &path)?;
        debug!(backup = %path.display(), "snapshotted ledger");
        Ok(BackupHandle { path })
    }

    /// Copies the snapshot back over the working ledger path. Used for
    /// rollback; the copy itself is atomic.
    pub fn restore(&self, handle: &BackupHandle, ledger: &Path) -> io::Result<()> {
        let content = fs::read_to_string(&handle.path)?;
        writer::write_atomic(ledger, &content)?;
        info!(backup = %handle.path.display(), "restored ledger from snapshot");
        Ok(())
    }

    /// Lists this ledger's backups, oldest first.
    pub fn list(&self, ledger: &Path) -> io::Result<Vec<PathBuf>> {
        let file_name = ledger_file_name(ledger)?;
        let prefix = format!("{}.", file_name);
        let mut backups = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(BACKUP_SUFFIX) {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Deletes backups beyond the policy, oldest first. The most recent
    /// backup survives regardless. Returns the deleted paths.
    pub fn prune(&self, ledger: &Path, policy: &BackupPolicy) -> io::Result<Vec<PathBuf>> {
        let backups = self.list(ledger)?;
        if backups.len() <= 1 {
            return Ok(Vec::new());
        }

        let mut delete = vec![false; backups.len()];
        if let Some(max_count) = policy.max_count {
            let excess = backups.len().saturating_sub(max_count.max(1));
            for flag in delete.iter_mut().take(excess) {
                *flag = true;
            }
        }
        if let Some(max_age) = policy.max_age {
            let cutoff = SystemTime::now() - max_age;
            for (i, path) in backups.iter().enumerate().take(backups.len() - 1) {
                let modified = fs::metadata(path)?.modified()?;
                if modified < cutoff {
                    delete[i] = true;
                }
            }
        }
        // The newest backup is never deleted.
        delete[backups.len() - 1] = false;

        let mut deleted = Vec::new();
        for (path, flag) in backups.into_iter().zip(delete) {
            if flag {
                fs::remove_file(&path)?;
                debug!(backup = %path.display(), "pruned backup");
                deleted.push(path);
            }
        }
        Ok(deleted)
    }
}

fn ledger_file_name(ledger: &Path) -> io::Result<String> {
    ledger
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "ledger path has no file name")
        })
}
