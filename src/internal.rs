//! Internal wrapper for `Transaction` with structured metadata.

use ledger_parser::Transaction;

use crate::comment::Comment;
use crate::identity;

/// Separator between payee and narration in a journal description field.
pub const PAYEE_SEPARATOR: &str = " | ";

/// A `Transaction` with the comment string (if any) moved out as a `Comment`.
#[derive(Clone, Debug)]
pub struct TransactionInternal {
    pub raw: Transaction,
    pub comment: Comment,
}

impl TransactionInternal {
    /// Returns the stable transaction id, if one is recorded in the metadata.
    pub fn txn_id(&self) -> Option<&str> {
        self.comment
            .tags
            .get(identity::TXN_ID_KEY)
            .map(String::as_str)
    }

    /// The payee half of the description, when the description carries one.
    pub fn payee(&self) -> Option<&str> {
        self.raw
            .description
            .split_once(PAYEE_SEPARATOR)
            .map(|(payee, _)| payee)
    }

    /// The narration: either the part after the payee separator, or the
    /// whole description when no payee is present.
    pub fn narration(&self) -> &str {
        match self.raw.description.split_once(PAYEE_SEPARATOR) {
            Some((_, narration)) => narration,
            None => &self.raw.description,
        }
    }
}

impl From<Transaction> for TransactionInternal {
    fn from(mut raw: Transaction) -> Self {
        let comment = Comment::from_opt_string(&raw.comment);
        raw.comment = None;
        Self { raw, comment }
    }
}

#[allow(clippy::from_over_into)] // Can't implement `From for Transaction` from other crate.
impl Into<Transaction> for TransactionInternal {
    fn into(mut self) -> Transaction {
        self.raw.comment = self.comment.into_opt_comment();
        self.raw
    }
}
