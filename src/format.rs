//! Building and rendering transactions in canonical journal syntax.
//!
//! Rendering goes through `ledger-parser`'s `Display`, which is
//! deterministic: identical input yields byte-identical output. This module
//! is the gatekeeper for content the grammar cannot represent.

use std::str::FromStr;

use lazy_static::lazy_static;
use ledger_parser::{
    Amount, Commodity, CommodityPosition, Posting, PostingAmount, Price, Reality, Transaction,
    TransactionStatus,
};
use regex::Regex;
use rust_decimal::Decimal;

use crate::comment::Comment;
use crate::error::MutationError;
use crate::identity;
use crate::internal::PAYEE_SEPARATOR;
use crate::request::{InsertRequest, PostingInput};

lazy_static! {
    /// Account names: colon-separated segments, single internal spaces
    /// allowed (two consecutive spaces terminate the account in journal
    /// syntax).
    static ref ACCOUNT_RX: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9:_.-]*(?: [A-Za-z0-9:_.-]+)*$").unwrap();
    /// Commodity codes written to the right of the quantity, e.g. `USD`.
    static ref COMMODITY_RX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
    /// Metadata keys, matching what the comment parser will read back.
    static ref META_KEY_RX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
}

/// Builds the transaction to append for `req`, carrying `txn_id` in its
/// metadata. Fails with `UnrepresentableContent` for anything that would not
/// survive a parse round trip.
pub fn build_transaction(req: &InsertRequest, txn_id: &str) -> Result<Transaction, MutationError> {
    let status = match req.flag.as_deref() {
        None | Some("*") => TransactionStatus::Cleared,
        Some("!") => TransactionStatus::Pending,
        Some(other) => {
            return Err(unrepresentable(
                "flag",
                format!("unknown flag {:?}, expected \"*\" or \"!\"", other),
            ))
        }
    };

    let description = description(req.payee.as_deref(), req.narration.as_deref())?;

    let mut comment = Comment::new();
    for (key, value) in &req.meta {
        if key == identity::TXN_ID_KEY {
            return Err(unrepresentable(
                "meta",
                format!("metadata key {:?} is reserved", identity::TXN_ID_KEY),
            ));
        }
        if !META_KEY_RX.is_match(key) {
            return Err(unrepresentable("meta", format!("invalid key {:?}", key)));
        }
        let value = value.trim();
        if value.is_empty() || value.contains('\n') || value.contains('\r') {
            return Err(unrepresentable(
                "meta",
                format!("invalid value for key {:?}", key),
            ));
        }
        comment.tags.insert(key.clone(), value.to_string());
    }
    comment
        .tags
        .insert(identity::TXN_ID_KEY.to_string(), txn_id.to_string());

    let postings = req
        .postings
        .iter()
        .map(build_posting)
        .collect::<Result<Vec<Posting>, MutationError>>()?;
    if postings.is_empty() {
        return Err(unrepresentable(
            "postings",
            "transaction requires at least one posting".to_string(),
        ));
    }

    Ok(Transaction {
        comment: comment.into_opt_comment(),
        date: req.date,
        effective_date: None,
        status: Some(status),
        code: None,
        description,
        postings,
    })
}

/// Whether `account` is a well-formed account name that survives a parse
/// round trip.
pub fn is_valid_account(account: &str) -> bool {
    ACCOUNT_RX.is_match(account)
}

fn build_posting(input: &PostingInput) -> Result<Posting, MutationError> {
    if !is_valid_account(&input.account) {
        return Err(unrepresentable(
            "account",
            format!("invalid account name {:?}", input.account),
        ));
    }

    let amount = match (&input.amount, &input.currency) {
        (None, None) => None,
        (Some(amount), Some(currency)) => Some(PostingAmount {
            amount: parse_amount(amount, currency)?,
            lot_price: pair_price("cost", &input.cost_amount, &input.cost_currency)?,
            price: pair_price("price", &input.price_amount, &input.price_currency)?,
        }),
        _ => {
            return Err(unrepresentable(
                "amount",
                format!(
                    "posting on {:?} must supply both amount and currency, or neither",
                    input.account
                ),
            ))
        }
    };
    if amount.is_none() && (input.cost_amount.is_some() || input.price_amount.is_some()) {
        return Err(unrepresentable(
            "amount",
            "cost/price annotations require an explicit amount".to_string(),
        ));
    }

    Ok(Posting {
        account: input.account.clone(),
        reality: Reality::Real,
        amount,
        balance: None,
        status: None,
        comment: None,
    })
}

fn pair_price(
    field: &str,
    amount: &Option<String>,
    currency: &Option<String>,
) -> Result<Option<Price>, MutationError> {
    match (amount, currency) {
        (None, None) => Ok(None),
        (Some(amount), Some(currency)) => Ok(Some(Price::Unit(parse_amount(amount, currency)?))),
        _ => Err(unrepresentable(
            field,
            "amount and currency must be supplied together".to_string(),
        )),
    }
}

fn parse_amount(quantity: &str, currency: &str) -> Result<Amount, MutationError> {
    if !COMMODITY_RX.is_match(currency) {
        return Err(unrepresentable(
            "currency",
            format!("invalid commodity {:?}", currency),
        ));
    }
    let quantity = Decimal::from_str(quantity.trim())
        .map_err(|e| unrepresentable("amount", format!("bad decimal {:?}: {}", quantity, e)))?;
    Ok(Amount {
        quantity,
        commodity: Commodity {
            name: currency.to_string(),
            position: CommodityPosition::Right,
        },
    })
}

/// Combines payee and narration into the single journal description field.
fn description(
    payee: Option<&str>,
    narration: Option<&str>,
) -> Result<String, MutationError> {
    let payee = normalize_field("payee", payee)?;
    let narration = normalize_field("narration", narration)?;
    match (payee, narration) {
        (Some(payee), Some(narration)) => {
            Ok(format!("{}{}{}", payee, PAYEE_SEPARATOR, narration))
        }
        (Some(payee), None) => Ok(payee),
        (None, Some(narration)) => Ok(narration),
        (None, None) => Err(unrepresentable(
            "description",
            "transaction requires a payee or narration".to_string(),
        )),
    }
}

fn normalize_field(
    field: &str,
    value: Option<&str>,
) -> Result<Option<String>, MutationError> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };
    if value.contains('\n') || value.contains('\r') || value.contains('\t') {
        return Err(unrepresentable(
            field,
            "control characters cannot appear in journal text".to_string(),
        ));
    }
    if value.contains(';') {
        return Err(unrepresentable(
            field,
            "\";\" starts a journal comment".to_string(),
        ));
    }
    if value.contains('|') {
        return Err(unrepresentable(
            field,
            "\"|\" separates payee from narration".to_string(),
        ));
    }
    Ok(Some(value.to_string()))
}

fn unrepresentable(field: &str, detail: String) -> MutationError {
    MutationError::UnrepresentableContent {
        field: field.to_string(),
        detail,
    }
}
