//! Line diffs of ledger content, for dry-run reporting.

use text_diff::{diff, Difference};

/// Renders a line-oriented diff of `before` → `after` with `-`/`+`/space
/// prefixes.
pub fn render(before: &str, after: &str) -> String {
    let (_, changes) = diff(before, after, "\n");
    let mut out = Vec::new();
    for change in changes {
        let (prefix, chunk) = match &change {
            Difference::Same(chunk) => (' ', chunk),
            Difference::Add(chunk) => ('+', chunk),
            Difference::Rem(chunk) => ('-', chunk),
        };
        for line in chunk.split('\n') {
            out.push(format!("{}{}", prefix, line));
        }
    }
    out.join("\n")
}
