//! Bibliography export decoding.
//!
//! Reads an export file and decodes its text into [`RawRecord`]s according
//! to the format the caller names. CSL-JSON input may be a standard JSON
//! array or JSONL (one JSON object per line).

use std::fs;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::bibtex::{parse_bibtex, BibtexError};
use crate::entry::{BibFormat, RawRecord};

/// Errors that can occur when decoding an export.
#[derive(Error, Debug)]
pub enum RefsError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid JSONL at line {line}: {message}")]
    JsonlError { line: usize, message: String },

    #[error("References must be a JSON array")]
    NotAnArray,

    #[error("Reference #{index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error(transparent)]
    Bibtex(#[from] BibtexError),
}

/// Reads the raw text of an export file.
pub fn read_export(path: &Path) -> Result<String, RefsError> {
    Ok(fs::read_to_string(path)?)
}

/// Decodes export text into raw records using the given format.
///
/// # Errors
///
/// Returns an error if the text is not valid for `format`. Decoding never
/// falls back to another format.
pub fn decode(raw_data: &str, format: BibFormat) -> Result<Vec<RawRecord>, RefsError> {
    match format {
        BibFormat::BibLatex => Ok(parse_bibtex(raw_data)?),
        BibFormat::CslJson => {
            let items = normalize_refs(raw_data)?;
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(RefsError::NotAnObject { index }),
                })
                .collect()
        }
    }
}

/// Normalizes CSL-JSON content (array or JSONL) to a list of JSON values.
fn normalize_refs(content: &str) -> Result<Vec<Value>, RefsError> {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return match serde_json::from_str(trimmed)? {
            Value::Array(items) => Ok(items),
            _ => Err(RefsError::NotAnArray),
        };
    }

    let mut refs = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => refs.push(value),
            Err(e) => {
                return Err(RefsError::JsonlError {
                    line: line_num + 1,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(refs)
}
