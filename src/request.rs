//! Mutation intents and outcomes at the tool boundary.
//!
//! Requests arrive as JSON with strict shapes: unknown fields are rejected
//! before anything reaches the engine. An intent is executed exactly once
//! and never retried automatically.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use ledger_parser::Transaction;
use serde_derive::{Deserialize, Serialize};

use crate::internal::TransactionInternal;
use crate::validate::Diagnostics;

/// A fully specified transaction to append to the ledger.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertRequest {
    pub date: NaiveDate,
    /// `*` (cleared, the default) or `!` (pending).
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub narration: Option<String>,
    pub postings: Vec<PostingInput>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Stable id to record; generated when absent.
    #[serde(default)]
    pub txn_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostingInput {
    pub account: String,
    /// Decimal amount as a string, e.g. `"-5.00"`. At most one posting may
    /// elide its amount to auto-balance the transaction.
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub cost_amount: Option<String>,
    #[serde(default)]
    pub cost_currency: Option<String>,
    #[serde(default)]
    pub price_amount: Option<String>,
    #[serde(default)]
    pub price_currency: Option<String>,
}

/// Identifies a transaction to remove, with optional disambiguating filters.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveRequest {
    pub txn_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct InsertOutcome {
    pub txn_id: String,
    pub dry_run: bool,
    pub diagnostics: Diagnostics,
    /// Unified diff of the proposed change; only produced in dry-run mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Snapshot taken before the committed write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RemoveOutcome {
    pub txn_id: String,
    pub dry_run: bool,
    pub removed: TransactionView,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

/// Read-only rendering of a transaction for reporting to callers.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    pub narration: String,
    pub meta: BTreeMap<String, String>,
    pub postings: Vec<PostingView>,
}

#[derive(Debug, Serialize)]
pub struct PostingView {
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl TransactionView {
    pub fn from_transaction(raw: Transaction) -> Self {
        let internal: TransactionInternal = raw.into();
        let date = internal.raw.date;
        let payee = internal.payee().map(str::to_string);
        let narration = internal.narration().to_string();
        let postings = internal
            .raw
            .postings
            .iter()
            .map(|post| {
                let amount = post.amount.as_ref().map(|pa| &pa.amount);
                PostingView {
                    account: post.account.clone(),
                    amount: amount.map(|a| a.quantity.to_string()),
                    currency: amount.map(|a| a.commodity.name.clone()),
                }
            })
            .collect();
        Self {
            date,
            payee,
            narration,
            meta: internal.comment.tags,
            postings,
        }
    }
}
