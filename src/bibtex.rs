//! BibLaTeX / BibTeX decoding using nom.
//!
//! Turns the text of a `.bib` export into [`RawRecord`]s. Supported syntax:
//! - entries delimited by braces or parentheses: `@article{key, ...}`,
//!   `@article(key, ...)`, and field-less entries such as `@misc{key}`
//! - `@string` definitions and references to them
//! - `@preamble` and `@comment` (skipped)
//! - braced and quoted field values, bare numbers
//! - concatenation with `#`
//! - nested braces inside values
//!
//! Text between entries is ignored, including `%` comment lines and stray
//! `@` signs that do not open a block.
//!
//! Field names are lower-cased. Each record additionally carries the
//! citekey under [`KEY_FIELD`] and the entry type under [`ENTRY_TYPE_FIELD`].

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    IResult,
};
use serde_json::Value;
use thiserror::Error;

use crate::entry::RawRecord;

/// Raw field holding the citekey.
pub const KEY_FIELD: &str = "key";
/// Raw field holding the `@type` of the entry.
pub const ENTRY_TYPE_FIELD: &str = "entrytype";

/// A syntax error in a BibLaTeX export.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid BibLaTeX at line {line}: {message}")]
pub struct BibtexError {
    pub line: usize,
    pub message: String,
}

enum AtBlock {
    Entry(RawRecord),
    String(String, String),
    Ignored,
}

/// Decodes every entry of a BibLaTeX document.
///
/// Decoding is all-or-nothing: the first block that opens with `@type{` or
/// `@type(` but is malformed aborts with the line it starts on.
pub fn parse_bibtex(input: &str) -> Result<Vec<RawRecord>, BibtexError> {
    let mut records = Vec::new();
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut remaining = input;

    while let Some(pos) = next_block_start(remaining) {
        let block = &remaining[pos..];
        let Ok((body, (block_type, close))) = block_opener(block) else {
            // An `@` in free text, e.g. an e-mail address.
            remaining = &block[1..];
            continue;
        };

        match parse_block_body(body, block_type, close, &strings) {
            Ok((rest, parsed)) => {
                match parsed {
                    AtBlock::Entry(record) => records.push(record),
                    AtBlock::String(key, value) => {
                        strings.insert(key.to_lowercase(), value);
                    }
                    AtBlock::Ignored => {}
                }
                remaining = rest;
            }
            Err(_) => {
                let snippet: String = block
                    .lines()
                    .next()
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                return Err(BibtexError {
                    line: line_of(input, block),
                    message: format!("failed to parse entry starting with '{}'", snippet),
                });
            }
        }
    }

    Ok(records)
}

/// 1-based line number of `rest` within `input`.
fn line_of(input: &str, rest: &str) -> usize {
    let consumed = input.len() - rest.len();
    input[..consumed].matches('\n').count() + 1
}

/// Offset of the next `@` in the text between blocks.
///
/// `gap` always starts right after the previous block, so a `%` here is a
/// real comment and the rest of its line is skipped.
fn next_block_start(gap: &str) -> Option<usize> {
    let mut offset = 0;
    let mut rest = gap;
    loop {
        let pos = rest.find(['@', '%'])?;
        if rest.as_bytes()[pos] == b'@' {
            return Some(offset + pos);
        }
        let skip = rest[pos..].find('\n').map_or(rest.len(), |nl| pos + nl + 1);
        offset += skip;
        rest = &rest[skip..];
    }
}

/// `@type{` or `@type(`; yields the block type and its closing delimiter.
fn block_opener(input: &str) -> IResult<&str, (&str, char)> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, block_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, open) = alt((char('{'), char('(')))(rest)?;
    let close = if open == '{' { '}' } else { ')' };
    Ok((rest, (block_type, close)))
}

fn parse_block_body<'a>(
    input: &'a str,
    block_type: &str,
    close: char,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, AtBlock> {
    match block_type.to_lowercase().as_str() {
        "string" => {
            let (rest, (key, value)) = parse_single_field(input, strings)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, AtBlock::String(key, value)))
        }
        "preamble" | "comment" => {
            let rest = skip_to_close(input, close)?;
            Ok((rest, AtBlock::Ignored))
        }
        _ => {
            let (rest, record) = parse_entry_body(input, block_type, close, strings)?;
            Ok((rest, AtBlock::Entry(record)))
        }
    }
}

/// Skips to just past `close` at brace depth zero.
fn skip_to_close(input: &str, close: char) -> Result<&str, nom::Err<nom::error::Error<&str>>> {
    let bytes = input.as_bytes();
    let close = close as u8;
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b if b == close && depth == 0 => return Ok(&input[pos + 1..]),
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'\\' => pos += 1,
            _ => {}
        }
        pos += 1;
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn parse_entry_body<'a>(
    input: &'a str,
    entry_type: &str,
    close: char,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, RawRecord> {
    let (rest, _) = multispace0(input)?;
    let (rest, citekey) = take_while1(move |c: char| {
        !c.is_whitespace() && c != ',' && c != '}' && c != close
    })(rest)?;
    let (rest, _) = multispace0(rest)?;

    // `@misc{key}` has no fields and no comma.
    let (rest, fields) = if rest.starts_with(close) {
        (rest, Vec::new())
    } else {
        let (rest, _) = char(',')(rest)?;
        parse_fields(rest, close, strings)?
    };
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(close)(rest)?;

    let mut record = RawRecord::new();
    record.insert(KEY_FIELD.to_string(), Value::String(citekey.to_string()));
    record.insert(
        ENTRY_TYPE_FIELD.to_string(),
        Value::String(entry_type.to_lowercase()),
    );
    for (key, value) in fields {
        record.insert(key, Value::String(value));
    }

    Ok((rest, record))
}

fn parse_fields<'a>(
    input: &'a str,
    close: char,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        if rest.starts_with(close) {
            return Ok((rest, fields));
        }

        let (rest, field) = parse_single_field(rest, strings)?;
        fields.push(field);

        let (rest, _) = multispace0(rest)?;
        remaining = rest.strip_prefix(',').unwrap_or(rest);
    }
}

fn parse_single_field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, key) = take_while1(|c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+' || c == '.'
    })(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, value) = parse_field_value(rest, strings)?;

    Ok((rest, (key.to_lowercase(), value)))
}

/// Parses a value made of braced, quoted, numeric or macro parts joined by `#`.
fn parse_field_value<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, String> {
    let mut result = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, part) = alt((
            parse_braced_value,
            parse_quoted_value,
            map(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
                s.to_string()
            }),
            map(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
                |s: &str| {
                    strings
                        .get(&s.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| s.to_string())
                },
            ),
        ))(rest)?;

        result.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(stripped) => remaining = stripped,
            None => return Ok((rest, result)),
        }
    }
}

fn parse_braced_value(input: &str) -> IResult<&str, String> {
    let (rest, content) = parse_braced_content(input)?;
    Ok((rest, content[1..content.len() - 1].to_string()))
}

/// Matches `{...}` including nested braces; returns the text with its outer braces.
fn parse_braced_content(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }

    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            b'\\' => pos += 1,
            _ => {}
        }
        pos += 1;
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn parse_quoted_value(input: &str) -> IResult<&str, String> {
    if !input.starts_with('"') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }

    let mut depth = 0usize;
    for (pos, c) in input.char_indices().skip(1) {
        match c {
            '"' if depth == 0 => return Ok((&input[pos + 1..], input[1..pos].to_string())),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Removes BibTeX protective braces: `{DNA} repair` becomes `DNA repair`.
pub fn strip_braces(value: &str) -> String {
    value.chars().filter(|c| *c != '{' && *c != '}').collect()
}
