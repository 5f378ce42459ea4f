//! Best-effort column resolution.
//!
//! Real-world exports spell the same logical field many ways ("Sorgu",
//! "sorgu", "Kullanici Sorgusu"). Resolution applies an ordered list of
//! pure string transforms to both the header row and the alias set and
//! stops at the first pass that produces a match.

use crate::error::{RefineError, Result};
use crate::normalization::{fold_key, normalize_header};

type Pass = fn(&str) -> String;

const PASSES: [Pass; 3] = [
    |s| normalize_header(s),
    |s| normalize_header(s).to_lowercase(),
    |s| fold_key(s),
];

/// Resolves one logical field against the header row, returning the column
/// index of the first alias that matches under the earliest pass.
pub fn resolve_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    for pass in PASSES {
        let keyed: Vec<String> = headers.iter().map(|h| pass(h)).collect();
        for alias in aliases {
            let wanted = pass(alias);
            if let Some(idx) = keyed.iter().position(|k| *k == wanted) {
                return Some(idx);
            }
        }
    }
    None
}

/// Like [`resolve_column`] but fails fast with a `Schema` error naming the
/// logical field when no alias resolves.
pub fn require_column(
    headers: &[String],
    aliases: &[&str],
    field: &'static str,
) -> Result<usize> {
    resolve_column(headers, aliases).ok_or(RefineError::Schema { field })
}
