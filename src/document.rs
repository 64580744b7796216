//! The in-memory ledger document: raw text plus parsed journal items.
//!
//! The mutation engine owns a `LedgerDocument` exclusively for the duration
//! of one mutation. Mutations edit the parsed items and re-render the whole
//! journal through `ledger-parser`'s `Display`, so a mutated file is always
//! in canonical form.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use ledger_parser::{Ledger, LedgerItem, Transaction};

use crate::comment::Comment;
use crate::error::MutationError;
use crate::identity;
use crate::internal::PAYEE_SEPARATOR;

#[derive(Debug)]
pub struct LedgerDocument {
    text: String,
    ledger: Ledger,
}

impl LedgerDocument {
    /// Reads and parses the ledger at `path`.
    pub fn load(path: &Path) -> Result<Self, MutationError> {
        let text = fs::read_to_string(path).map_err(|e| MutationError::LoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_text(text).map_err(|detail| MutationError::LoadFailed {
            path: path.to_path_buf(),
            detail,
        })
    }

    /// Parses already-loaded ledger text into a document.
    pub fn from_text(text: String) -> Result<Self, String> {
        let ledger = ledger_parser::parse(&text).map_err(|e| e.to_string())?;
        Ok(Self { text, ledger })
    }

    /// The ledger text exactly as persisted at load time.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn transactions(&self) -> impl Iterator<Item = (usize, &Transaction)> {
        self.ledger
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                LedgerItem::Transaction(trn) => Some((index, trn)),
                _ => None,
            })
    }

    pub fn contains_txn_id(&self, txn_id: &str) -> bool {
        self.transactions()
            .any(|(_, trn)| txn_id_of(trn).as_deref() == Some(txn_id))
    }

    /// Item indices of transactions carrying `txn_id`, intersected with the
    /// optional disambiguating filters.
    pub fn find_matches(
        &self,
        txn_id: &str,
        date: Option<NaiveDate>,
        payee: Option<&str>,
    ) -> Vec<usize> {
        self.transactions()
            .filter(|(_, trn)| txn_id_of(trn).as_deref() == Some(txn_id))
            .filter(|(_, trn)| date.map_or(true, |d| trn.date == d))
            .filter(|(_, trn)| payee.map_or(true, |p| payee_of(trn) == Some(p)))
            .map(|(index, _)| index)
            .collect()
    }

    /// Appends a transaction at the end of the document, separated from any
    /// preceding content by a blank line.
    pub fn append_transaction(&mut self, trn: Transaction) {
        let items = &mut self.ledger.items;
        if !items.is_empty() && !matches!(items.last(), Some(LedgerItem::EmptyLine)) {
            items.push(LedgerItem::EmptyLine);
        }
        items.push(LedgerItem::Transaction(trn));
    }

    /// Removes the transaction at item `index`, collapsing any doubled blank
    /// line the removal leaves behind. Returns `None` if the index does not
    /// refer to a transaction.
    pub fn remove_transaction(&mut self, index: usize) -> Option<Transaction> {
        let items = &mut self.ledger.items;
        if !matches!(items.get(index), Some(LedgerItem::Transaction(_))) {
            return None;
        }
        let trn = match items.remove(index) {
            LedgerItem::Transaction(trn) => trn,
            _ => return None,
        };

        let doubled_blank = index > 0
            && index < items.len()
            && matches!(items[index - 1], LedgerItem::EmptyLine)
            && matches!(items[index], LedgerItem::EmptyLine);
        if doubled_blank {
            items.remove(index);
        } else if index == items.len() && matches!(items.last(), Some(LedgerItem::EmptyLine)) {
            items.pop();
        } else if index == 0 && matches!(items.first(), Some(LedgerItem::EmptyLine)) {
            items.remove(0);
        }

        Some(trn)
    }

    /// Renders the document in canonical journal form.
    pub fn render(&self) -> String {
        format!("{}", self.ledger)
    }
}

/// The stable id recorded in the transaction's comment metadata, if any.
pub fn txn_id_of(trn: &Transaction) -> Option<String> {
    Comment::from_opt_string(&trn.comment)
        .tags
        .remove(identity::TXN_ID_KEY)
}

// A description without the separator is narration-only and has no payee.
fn payee_of(trn: &Transaction) -> Option<&str> {
    trn.description
        .split_once(PAYEE_SEPARATOR)
        .map(|(payee, _)| payee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{parse_document, FIXTURE};

    #[test]
    fn finds_transaction_by_txn_id() {
        let doc = parse_document(FIXTURE);
        assert!(doc.contains_txn_id("fixture-rent"));
        assert!(!doc.contains_txn_id("missing"));
        assert_eq!(1, doc.find_matches("fixture-rent", None, None).len());
    }

    #[test]
    fn filters_intersect_with_txn_id() {
        let doc = parse_document(FIXTURE);
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(1, doc.find_matches("fixture-rent", Some(date), None).len());
        let wrong_date = NaiveDate::from_ymd_opt(2020, 2, 2).unwrap();
        assert!(doc
            .find_matches("fixture-rent", Some(wrong_date), None)
            .is_empty());
        assert!(doc
            .find_matches("fixture-rent", None, Some("Someone Else"))
            .is_empty());
        assert_eq!(
            1,
            doc.find_matches("fixture-rent", None, Some("Landlord")).len()
        );
    }

    #[test]
    fn payee_filter_does_not_match_narration_only_description() {
        let doc = parse_document(
            r#"
            2024/01/05 Latte
                ; txn_id: solo
                Expenses:Food  5.00 USD
                Assets:Cash  -5.00 USD
            "#,
        );
        assert_eq!(1, doc.find_matches("solo", None, None).len());
        assert!(doc.find_matches("solo", None, Some("Latte")).is_empty());
    }

    #[test]
    fn append_then_remove_restores_rendered_form() {
        let mut doc = parse_document(FIXTURE);
        let before = doc.render();
        let trn = crate::testutil::parse_transaction(
            r#"
            2020/01/20 Book Store | Books
                ; txn_id: book-1
                Expenses:Books  20.00 USD
                Assets:Bank:Checking  -20.00 USD
            "#,
        );
        doc.append_transaction(trn);
        let matches = doc.find_matches("book-1", None, None);
        assert_eq!(1, matches.len());
        let removed = doc.remove_transaction(matches[0]).expect("a transaction");
        assert_eq!(Some("book-1".to_string()), txn_id_of(&removed));
        assert_eq!(before, doc.render());
    }

    #[test]
    fn remove_of_non_transaction_index_is_none() {
        let mut doc = parse_document(FIXTURE);
        assert!(doc.remove_transaction(9999).is_none());
    }

    #[test]
    fn rendering_is_deterministic() {
        let doc = parse_document(FIXTURE);
        assert_eq!(doc.render(), doc.render());
    }
}
