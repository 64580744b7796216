//! Re-parsing and semantic validation of a written ledger.
//!
//! The journal grammar is handled by the external `ledger-parser`
//! collaborator; this module bridges its results into structured diagnostics
//! and layers the semantic checks a parse alone does not give us: posting
//! balance per commodity and txn_id uniqueness. Account names are accepted
//! as-is: anything the parse collaborator reads back is representable, and
//! pre-existing accounts must never block a mutation elsewhere in the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ledger_parser::{Ledger, Posting, Price, Transaction};
use rust_decimal::Decimal;
use serde_derive::Serialize;

use crate::document;
use crate::error::MutationError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks commit.
    Error,
    /// Reported to the caller, does not block commit.
    Warning,
}

#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push_error(&mut self, message: String, location: Option<String>) {
        self.items.push(Diagnostic {
            severity: Severity::Error,
            message,
            location,
        });
    }

    pub fn push_warning(&mut self, message: String, location: Option<String>) {
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            message,
            location,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}

/// The validation collaborator, behind a trait so tests (and alternative
/// validators) can be swapped in.
pub trait Validator {
    /// Parses and checks the ledger at `path`. `Err` means the validator
    /// could not run at all; parse problems within a successful run are
    /// reported as error diagnostics.
    fn validate(&self, path: &Path) -> Result<Diagnostics, MutationError>;
}

/// Production validator: re-parse through `ledger-parser` plus semantic
/// checks.
#[derive(Clone, Debug)]
pub struct JournalValidator {
    /// Per-commodity imbalance at or below this magnitude is accepted.
    pub tolerance: Decimal,
}

impl Default for JournalValidator {
    fn default() -> Self {
        Self {
            tolerance: Decimal::ZERO,
        }
    }
}

impl Validator for JournalValidator {
    fn validate(&self, path: &Path) -> Result<Diagnostics, MutationError> {
        let content =
            fs::read_to_string(path).map_err(|e| MutationError::CollaboratorUnavailable {
                detail: format!("cannot read {:?}: {}", path, e),
            })?;

        let mut diagnostics = Diagnostics::default();
        let ledger = match ledger_parser::parse(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                diagnostics.push_error(e.to_string(), Some(path.display().to_string()));
                return Ok(diagnostics);
            }
        };

        self.check_transactions(&ledger, &mut diagnostics);
        check_txn_id_uniqueness(&ledger, &mut diagnostics);
        Ok(diagnostics)
    }
}

impl JournalValidator {
    fn check_transactions(&self, ledger: &Ledger, diagnostics: &mut Diagnostics) {
        for trn in transactions(ledger) {
            let location = Some(location_of(trn));

            let elided = trn.postings.iter().filter(|p| p.amount.is_none()).count();
            if elided > 1 {
                diagnostics.push_error(
                    "more than one posting without an amount".to_string(),
                    location.clone(),
                );
                continue;
            }
            if elided == 1 {
                // A single elided posting absorbs the residual of every
                // commodity, so the transaction balances by construction.
                continue;
            }
            if trn.postings.len() == 1 {
                diagnostics.push_warning(
                    "transaction has a single posting".to_string(),
                    location.clone(),
                );
            }

            let mut sums: BTreeMap<String, Decimal> = BTreeMap::new();
            for post in &trn.postings {
                if let Some((commodity, value)) = balancing_value(post) {
                    *sums.entry(commodity).or_insert_with(|| Decimal::ZERO) += value;
                }
            }
            for (commodity, sum) in sums {
                if sum.abs() > self.tolerance {
                    diagnostics.push_error(
                        format!(
                            "transaction does not balance: {} off by {}",
                            commodity, sum
                        ),
                        location.clone(),
                    );
                }
            }
        }
    }
}

/// The value a posting contributes to its transaction's balance: the cost
/// (lot price) when present, otherwise the price annotation, otherwise the
/// raw amount.
fn balancing_value(post: &Posting) -> Option<(String, Decimal)> {
    let posting_amount = post.amount.as_ref()?;
    let quantity = posting_amount.amount.quantity;
    let annotation = posting_amount
        .lot_price
        .as_ref()
        .or(posting_amount.price.as_ref());
    match annotation {
        Some(Price::Unit(unit)) => Some((unit.commodity.name.clone(), quantity * unit.quantity)),
        Some(Price::Total(total)) => {
            let magnitude = total.quantity;
            let signed = if quantity.is_sign_negative() {
                -magnitude
            } else {
                magnitude
            };
            Some((total.commodity.name.clone(), signed))
        }
        None => Some((posting_amount.amount.commodity.name.clone(), quantity)),
    }
}

fn check_txn_id_uniqueness(ledger: &Ledger, diagnostics: &mut Diagnostics) {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for trn in transactions(ledger) {
        if let Some(txn_id) = document::txn_id_of(trn) {
            *seen.entry(txn_id).or_insert(0) += 1;
        }
    }
    for (txn_id, count) in seen {
        if count > 1 {
            diagnostics.push_error(
                format!("{} transactions share txn_id {:?}", count, txn_id),
                None,
            );
        }
    }
}

fn transactions(ledger: &Ledger) -> impl Iterator<Item = &Transaction> {
    ledger.items.iter().filter_map(|item| match item {
        ledger_parser::LedgerItem::Transaction(trn) => Some(trn),
        _ => None,
    })
}

fn location_of(trn: &Transaction) -> String {
    format!("{} {}", trn.date.format("%Y/%m/%d"), trn.description)
}
