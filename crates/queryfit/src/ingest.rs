//! Schema-tolerant CSV loading.
//!
//! Input files arrive from whatever tool the analyst last touched, so the
//! loader tries an ordered list of encodings and only fails when none of
//! them produces a parseable table.

use std::fs;
use std::path::Path;

use queryfit_core::{RefineError, Result};

use crate::logging;

/// Parsed table with raw header cells preserved for alias resolution.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn cell<'a>(&'a self, row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}

enum Encoding {
    Utf8,
    Utf8Bom,
    Latin1,
}

impl Encoding {
    // BOM detection must run before plain UTF-8: a BOM decodes as valid
    // UTF-8 and would otherwise leak U+FEFF into the first header cell.
    const ORDER: [Encoding; 3] = [Encoding::Utf8Bom, Encoding::Utf8, Encoding::Latin1];

    fn label(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Bom => "utf-8-bom",
            Encoding::Latin1 => "latin-1",
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Encoding::Utf8Bom => {
                let stripped = bytes.strip_prefix(b"\xef\xbb\xbf")?;
                std::str::from_utf8(stripped).ok().map(str::to_string)
            }
            // Latin-1 maps every byte to the code point of the same value,
            // so this decoding is total; it sits last as the catch-all.
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Loads a delimited table, trying each supported encoding in order and
/// succeeding on the first that both decodes and parses.
pub fn load_table(path: &Path) -> Result<Table> {
    let bytes = fs::read(path).map_err(|err| RefineError::Ingestion {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let mut last_reason = String::from("empty file");
    for encoding in Encoding::ORDER {
        let Some(decoded) = encoding.decode(&bytes) else {
            continue;
        };
        match parse_csv(&decoded) {
            Ok(table) => {
                logging::verbose(format!(
                    "loaded {} ({} rows, encoding {})",
                    path.display(),
                    table.rows.len(),
                    encoding.label()
                ));
                return Ok(table);
            }
            Err(err) => last_reason = err.to_string(),
        }
    }
    Err(RefineError::Ingestion {
        path: path.to_path_buf(),
        reason: format!("no supported encoding parsed the file: {last_reason}"),
    })
}

fn parse_csv(decoded: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new().from_reader(decoded.as_bytes());
    let headers = reader
        .headers()?
        .iter()
        .map(|cell| cell.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(Table { headers, rows })
}
