//! Error taxonomy for mutation attempts.
//!
//! Every variant is terminal for the attempt that raised it; the engine never
//! retries on its own. Variants carry enough structure for a caller to decide
//! remediation without opening the ledger file.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::validate::Diagnostics;

#[derive(Debug, Error)]
pub enum MutationError {
    /// The cross-process lock on the ledger root could not be acquired within
    /// the configured wait.
    #[error("timed out after {waited_ms}ms waiting for lock {path:?}{}", holder_suffix(.holder))]
    LockTimeout {
        path: PathBuf,
        waited_ms: u64,
        /// Contents of the lock file (normally the holder's pid), if readable.
        holder: Option<String>,
    },

    /// The lock file could not be opened or locked at all, as opposed to the
    /// lock being held by someone else.
    #[error("cannot acquire lock {path:?}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The current ledger could not be read or parsed into a document.
    #[error("failed to load ledger {path:?}: {detail}")]
    LoadFailed { path: PathBuf, detail: String },

    /// The pre-write snapshot could not be taken.
    #[error("failed to back up ledger before writing")]
    BackupFailed {
        #[source]
        source: io::Error,
    },

    /// The requested or generated txn_id is already carried by another
    /// transaction in the document.
    #[error("transaction id {txn_id:?} is already present in the ledger")]
    DuplicateIdentity { txn_id: String },

    /// The record contains content that cannot round-trip through the
    /// journal's textual grammar.
    #[error("cannot represent {field} in journal syntax: {detail}")]
    UnrepresentableContent { field: String, detail: String },

    /// No transaction matches the requested txn_id (and filters).
    #[error("no transaction with id {txn_id:?} matches the request")]
    NotFound { txn_id: String },

    /// More than one transaction matched; nothing was written.
    #[error("{count} transactions match id {txn_id:?}; refusing to remove any")]
    AmbiguousMatch { txn_id: String, count: usize },

    /// The candidate content could not be persisted. The pre-write snapshot
    /// has been restored.
    #[error("failed to write ledger")]
    WriteFailed {
        #[source]
        source: io::Error,
    },

    /// Re-parsing the written ledger reported errors. The pre-write snapshot
    /// has been restored.
    #[error("ledger failed validation after edit ({} errors)", .diagnostics.error_count())]
    ValidationFailed { diagnostics: Diagnostics },

    /// The external validator could not be invoked at all, as opposed to it
    /// reporting diagnostics within a successful invocation.
    #[error("ledger validator could not run: {detail}")]
    CollaboratorUnavailable { detail: String },
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(info) => format!(" (held by {})", info.trim()),
        None => String::new(),
    }
}
