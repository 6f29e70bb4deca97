//! CSV payload decoding.
//!
//! Records are parsed with the `csv` crate, so quoted fields may contain
//! commas, quotes and line breaks. Every cell comes back as text; the server
//! converts it to the column type on insert.

use std::path::Path;

use ::csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::BatchSqlError;
use crate::models::SqlValue;

const UTF8_BOM: char = '\u{feff}';

/// Character encoding of a CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvEncoding {
    /// Strict UTF-8; invalid sequences are an input error
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD
    Utf8Lossy,
    /// ISO-8859-1, one byte per character
    Latin1,
}

impl std::str::FromStr for CsvEncoding {
    type Err = BatchSqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "utf8-lossy" | "utf-8-lossy" | "lossy" => Ok(Self::Utf8Lossy),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(BatchSqlError::input(format!(
                "unsupported CSV encoding '{}'",
                other
            ))),
        }
    }
}

/// Decodes raw file bytes and drops a leading byte-order mark.
pub fn decode(bytes: &[u8], encoding: CsvEncoding) -> crate::Result<String> {
    let text = match encoding {
        CsvEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| BatchSqlError::input(format!("CSV file is not valid UTF-8: {}", e)))?,
        CsvEncoding::Utf8Lossy => String::from_utf8_lossy(bytes).into_owned(),
        CsvEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
    };

    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Reads and decodes a CSV file.
///
/// # Errors
/// Returns [`BatchSqlError::FileNotFound`] if `path` does not exist.
pub async fn read_file(path: &Path, encoding: CsvEncoding) -> crate::Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BatchSqlError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            BatchSqlError::io(format!("reading {}", path.display()), e)
        }
    })?;
    decode(&bytes, encoding)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty()) && record.len() <= 1
}

/// Parses a CSV payload into rows of `column_count` text cells.
///
/// With `skip_header` the first record is discarded. Blank and
/// whitespace-only lines produce no row.
///
/// # Errors
/// - [`BatchSqlError::EmptyInput`] if the payload is blank or holds no data rows
/// - [`BatchSqlError::Input`] if a record has the wrong number of fields
/// - [`BatchSqlError::Csv`] if the payload is malformed
pub fn parse_rows(
    text: &str,
    column_count: usize,
    skip_header: bool,
) -> crate::Result<Vec<Vec<SqlValue>>> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    if text.trim().is_empty() {
        return Err(BatchSqlError::empty_input("CSV text"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(skip_header)
        .flexible(true)
        .trim(Trim::None)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line());
            BatchSqlError::Csv {
                context: format!("line {}", line),
                source: e,
            }
        })?;

        if is_blank(&record) {
            continue;
        }
        if record.len() != column_count {
            let line = record.position().map_or(0, |p| p.line());
            return Err(BatchSqlError::input(format!(
                "CSV line {} has {} fields, expected {}",
                line,
                record.len(),
                column_count
            )));
        }
        rows.push(record.iter().map(SqlValue::from).collect());
    }

    if rows.is_empty() {
        return Err(BatchSqlError::empty_input("CSV data rows"));
    }
    Ok(rows)
}
