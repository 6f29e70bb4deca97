//! Identifier validation and legacy value escaping.
//!
//! Identifiers (table and column names) are spliced into SQL text and cannot
//! be bound as parameters, so they are checked against a denylist and
//! rejected on a hit. Values are escaped only for literal-mode SQL; the
//! parameterized builders hand values to the driver untouched.
//!
//! # Value escaping
//! [`check_value`] reproduces an existing escape routine byte-for-byte so
//! rows written through it stay comparable with data already stored. The
//! routine is not lossless for every input:
//!
//! - `O'Brien` becomes `O\'Brien`, which the server stores as `O'Brien`.
//! - `a_b.c` becomes `a\_b\.c`; the server keeps `\_` verbatim and drops the
//!   backslash before `.`, storing `a\_b.c`.
//! - `\'` becomes `\\'`: the collapse step merges the backslashes and the
//!   quote then terminates the literal.
//!
//! Prefer the parameterized paths for untrusted values.

use crate::config::SanitizationPolicy;
use crate::error::BatchSqlError;
use crate::models::{RowMap, SqlValue};

/// Characters rejected in identifiers.
pub const IDENTIFIER_DENYLIST: &[char] = &[
    ' ', '+', '=', '!', '\'', '%', '#', '(', ')', '{', '}', '[', ']', '\\', '/', '<', '>', '?',
    '*', '|', '&', '@', '^', '~', ',', '$', ';',
];

/// Substring rejected in identifiers (SQL line comment).
pub const IDENTIFIER_COMMENT: &str = "--";

/// Characters escaped with a backslash in literal values, in escape order.
pub const VALUE_DENYLIST: &[char] = &[
    '\'', '\\', '%', '_', '=', '(', ')', '{', '}', '[', ']', '/', ';', ',', '.', '+', '-', '<',
    '>', '|', '"',
];

/// Rejects an identifier containing a denylisted character or `--`.
///
/// The error names the identifier and the first denylist entry found.
///
/// # Example
/// ```rust
/// use batchsql_core::sanitize::check_identifier;
///
/// assert!(check_identifier("order_items").is_ok());
/// assert!(check_identifier("items; DROP TABLE x").is_err());
/// assert!(check_identifier("a--b").is_err());
/// ```
pub fn check_identifier(name: &str) -> crate::Result<()> {
    if let Some(offending) = IDENTIFIER_DENYLIST.iter().find(|c| name.contains(**c)) {
        return Err(BatchSqlError::Injection {
            name: name.to_string(),
            offending: offending.to_string(),
        });
    }
    if name.contains(IDENTIFIER_COMMENT) {
        return Err(BatchSqlError::Injection {
            name: name.to_string(),
            offending: IDENTIFIER_COMMENT.to_string(),
        });
    }
    Ok(())
}

/// Applies [`check_identifier`] to each name, stopping at the first failure.
pub fn check_identifiers<S: AsRef<str>>(names: &[S]) -> crate::Result<()> {
    names.iter().try_for_each(|n| check_identifier(n.as_ref()))
}

/// Escapes denylisted characters in place and returns the number of
/// distinct character types that were escaped.
///
/// Each distinct character found has every occurrence prefixed with a
/// backslash, in [`VALUE_DENYLIST`] order. When more than one type was
/// escaped, runs of exactly `hits` backslashes are then collapsed to one.
/// See the module docs for inputs where this is lossy.
pub fn check_value(value: &mut String) -> usize {
    let mut hits: usize = 0;
    for ch in VALUE_DENYLIST {
        if value.contains(*ch) {
            *value = value.replace(*ch, &format!("\\{}", ch));
            hits = hits.saturating_add(1);
        }
    }
    if hits > 1 {
        let run = "\\".repeat(hits);
        *value = value.replace(&run, "\\");
    }
    hits
}

/// Applies the policy to a single-row map before it is built into SQL.
///
/// With identifier checks on, every key is validated. Otherwise, with value
/// checks on, every text value is escaped. The two are exclusive in this
/// pass; table names are checked separately by the caller.
pub fn check_map(data: &mut RowMap, policy: SanitizationPolicy) -> crate::Result<()> {
    if policy.check_identifiers {
        for key in data.keys() {
            check_identifier(key)?;
        }
    } else if policy.check_values {
        for value in data.values_mut() {
            if let SqlValue::Text(text) = value {
                check_value(text);
            }
        }
    }
    Ok(())
}

/// Escapes text cells of literal-mode rows when value checks are enabled.
pub(crate) fn escape_rows(rows: &mut [Vec<SqlValue>], policy: SanitizationPolicy) {
    if !policy.check_values {
        return;
    }
    for cell in rows.iter_mut().flatten() {
        if let SqlValue::Text(text) = cell {
            check_value(text);
        }
    }
}

#[cfg(test)]
mod tests;
