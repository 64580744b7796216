//! Parsing and rendering of transaction comments.
//!
//! Metadata (including the transaction's stable id) is persisted as
//! `key: value` lines within the comment attached to a transaction.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Parsed contents of a journal comment, suitable for manipulation before
/// being (re)output.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Comment {
    /// Plain text lines in the comment.
    pub lines: Vec<String>,
    /// `key: value` metadata lines. Ordered by key so that rendering is
    /// deterministic.
    pub tags: BTreeMap<String, String>,
}

impl Comment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_opt_string(comment: &Option<String>) -> Self {
        Self::from_opt_comment(comment.as_deref())
    }

    /// Parses the given comment string into lines and metadata tags.
    pub fn from_opt_comment(comment: Option<&str>) -> Self {
        lazy_static! {
            static ref VALUE_TAG_RX: Regex =
                Regex::new(r"^[ ]*([A-Za-z][A-Za-z0-9_-]*):[ ]+(.+)$").unwrap();
        }

        let mut result = Comment::new();
        let comment: &str = match comment {
            Some(s) => s,
            None => return result,
        };

        for line in comment.split('\n') {
            // Metadata tags comprise an entire comment line.
            if let Some(kv_parts) = VALUE_TAG_RX.captures(line) {
                let key = kv_parts
                    .get(1)
                    .expect("should always have group 1")
                    .as_str();
                let value = kv_parts
                    .get(2)
                    .expect("should always have group 2")
                    .as_str();
                result
                    .tags
                    .insert(key.to_string(), value.trim().to_string());
            } else {
                let text = line.trim();
                if !text.is_empty() {
                    result.lines.push(text.to_string());
                }
            }
        }
        result
    }

    /// Formats this `Comment` back into the form stored on a transaction.
    /// Plain lines come first, then metadata tags sorted by key.
    pub fn into_opt_comment(self) -> Option<String> {
        let mut out_lines: Vec<String> = self.lines;
        for (k, v) in self.tags.into_iter() {
            out_lines.push(format!("{}: {}", k, v));
        }

        if out_lines.is_empty() {
            None
        } else {
            Some(out_lines.join("\n"))
        }
    }
}
