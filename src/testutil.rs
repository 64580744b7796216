//! Shared helpers for in-module tests.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use ledger_parser::{LedgerItem, Transaction};
use tempfile::TempDir;

use crate::document::LedgerDocument;
use crate::guard::LockOptions;
use crate::request::{InsertRequest, PostingInput};

/// A small balanced journal with a mix of identified and unidentified
/// transactions.
pub const FIXTURE: &str = r#"
2020/01/01 * Opening Balance
    ; txn_id: fixture-opening
    Assets:Bank:Checking  1000.00 USD
    Equity:Opening-Balances  -1000.00 USD

2020/01/02 * Landlord | January rent
    ; txn_id: fixture-rent
    Expenses:Rent  650.00 USD
    Assets:Bank:Checking  -650.00 USD

2020/01/03 Grocery Store
    Expenses:Food  45.25 USD
    Assets:Bank:Checking  -45.25 USD
"#;

pub fn parse_document(text: &str) -> LedgerDocument {
    LedgerDocument::from_text(textwrap::dedent(text)).expect("test ledger should parse")
}

pub fn parse_transaction(text: &str) -> Transaction {
    let mut ledger =
        ledger_parser::parse(textwrap::dedent(text).as_ref()).expect("test input should parse");
    let index = ledger
        .items
        .iter()
        .position(|item| matches!(item, LedgerItem::Transaction(_)))
        .expect("test input should hold a transaction");
    match ledger.items.remove(index) {
        LedgerItem::Transaction(trn) => trn,
        other => panic!("got {:?}, want transaction", other),
    }
}

/// Writes (dedented) ledger text into a fresh temp dir and returns it with
/// the ledger path.
pub fn write_temp_ledger(text: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("main.journal");
    fs::write(&path, textwrap::dedent(text)).expect("write test ledger");
    (dir, path)
}

/// Lock options that fail fast in tests.
pub fn fast_lock_options() -> LockOptions {
    LockOptions {
        timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(5),
    }
}

/// The balanced two-posting coffee purchase used across tests.
pub fn coffee_request() -> InsertRequest {
    InsertRequest {
        date: chrono::NaiveDate::from_ymd_opt(2024, 1, 5).expect("valid date"),
        flag: None,
        payee: Some("Coffee Shop".to_string()),
        narration: Some("Latte".to_string()),
        postings: vec![
            PostingInput {
                account: "Expenses:Food".to_string(),
                amount: Some("-5.00".to_string()),
                currency: Some("USD".to_string()),
                cost_amount: None,
                cost_currency: None,
                price_amount: None,
                price_currency: None,
            },
            PostingInput {
                account: "Assets:Cash".to_string(),
                amount: Some("5.00".to_string()),
                currency: Some("USD".to_string()),
                cost_amount: None,
                cost_currency: None,
                price_amount: None,
                price_currency: None,
            },
        ],
        meta: Default::default(),
        txn_id: None,
        dry_run: false,
    }
}
