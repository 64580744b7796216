//! Assignment and validation of stable transaction identities.

use tracing::debug;
use uuid_b64::UuidB64;

use crate::document::LedgerDocument;
use crate::error::MutationError;

/// Metadata key under which a transaction's stable id is persisted.
pub const TXN_ID_KEY: &str = "txn_id";

/// Returns the txn_id to record on a transaction about to be inserted.
///
/// A caller-supplied id is returned unchanged after checking it round-trips
/// through a metadata line and does not already identify a transaction in
/// the document. An absent id is generated from UUIDv4 (base64-rendered);
/// the presence check is still performed as a defensive invariant.
pub fn assign(requested: Option<&str>, doc: &LedgerDocument) -> Result<String, MutationError> {
    if let Some(txn_id) = requested {
        let txn_id = txn_id.trim();
        if !txn_id.is_empty() {
            // The id is persisted as a single `txn_id: <id>` comment line; a
            // control character would split it into separate lines on write.
            if txn_id.contains('\n') || txn_id.contains('\r') || txn_id.contains('\t') {
                return Err(MutationError::UnrepresentableContent {
                    field: "txn_id".to_string(),
                    detail: "control characters cannot appear in journal text".to_string(),
                });
            }
            if doc.contains_txn_id(txn_id) {
                return Err(MutationError::DuplicateIdentity {
                    txn_id: txn_id.to_string(),
                });
            }
            return Ok(txn_id.to_string());
        }
    }

    let txn_id = UuidB64::new().to_istring().to_string();
    if doc.contains_txn_id(&txn_id) {
        return Err(MutationError::DuplicateIdentity { txn_id });
    }
    debug!(%txn_id, "generated transaction id");
    Ok(txn_id)
}
