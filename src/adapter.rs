//! Normalization of raw records into [`Entry`] values.
//!
//! The adapter is picked by the [`BibFormat`] the caller supplies. Fields
//! that map onto the normalized shape are consumed; every other input
//! field is carried through verbatim in [`Entry::passthrough`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::bibtex::{strip_braces, ENTRY_TYPE_FIELD, KEY_FIELD};
use crate::entry::{Author, BibFormat, Entry, EntryType, RawRecord};

/// Reasons a single record cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdaptError {
    #[error("missing citekey field '{field}'")]
    MissingCitekey { field: &'static str },

    #[error("unparsable date in field '{field}': {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("field '{field}' has an unexpected shape")]
    InvalidField { field: &'static str },
}

/// Normalizes one raw record.
pub fn normalize(record: &RawRecord, format: BibFormat) -> Result<Entry, AdaptError> {
    match format {
        BibFormat::BibLatex => normalize_biblatex(record),
        BibFormat::CslJson => normalize_csl_json(record),
    }
}

/// The citekey a record would get, if any. Used for diagnostics.
pub fn raw_citekey(record: &RawRecord, format: BibFormat) -> Option<&str> {
    let field = match format {
        BibFormat::BibLatex => KEY_FIELD,
        BibFormat::CslJson => "id",
    };
    record.get(field).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// BibLaTeX
// ---------------------------------------------------------------------------

const BIBLATEX_CONTAINER_FIELDS: &[&str] = &["journaltitle", "journal", "booktitle"];

fn normalize_biblatex(record: &RawRecord) -> Result<Entry, AdaptError> {
    let citekey = non_empty_str(record, KEY_FIELD).ok_or(AdaptError::MissingCitekey {
        field: KEY_FIELD,
    })?;
    let entry_type = record
        .get(ENTRY_TYPE_FIELD)
        .and_then(Value::as_str)
        .map(EntryType::from_biblatex)
        .unwrap_or(EntryType::Misc);

    let mut entry = Entry::new(citekey, entry_type);
    let mut consumed: Vec<&str> = vec![KEY_FIELD, ENTRY_TYPE_FIELD];

    if let Some(title) = record.get("title").and_then(Value::as_str) {
        entry.title = strip_braces(title).trim().to_string();
        consumed.push("title");
    }

    if let Some(authors) = record.get("author").and_then(Value::as_str) {
        entry.authors = split_biblatex_names(authors);
        consumed.push("author");
    }

    // `date` wins over the legacy `year` field.
    for field in ["date", "year"] {
        if let Some(value) = record.get(field).and_then(Value::as_str) {
            entry.year = Some(leading_year(value).ok_or_else(|| AdaptError::InvalidDate {
                field,
                value: value.to_string(),
            })?);
            consumed.push(field);
            break;
        }
    }

    if let Some((field, value)) = BIBLATEX_CONTAINER_FIELDS
        .iter()
        .find_map(|f| record.get(*f).and_then(Value::as_str).map(|v| (*f, v)))
    {
        entry.container_title = Some(strip_braces(value).trim().to_string());
        consumed.push(field);
    }

    entry.passthrough = passthrough(record, &consumed);
    Ok(entry)
}

/// Splits `Doe, Jane and John Smith and {Acme Corp}` into structured names.
fn split_biblatex_names(value: &str) -> Vec<Author> {
    static AND: OnceLock<Regex> = OnceLock::new();
    let and = AND.get_or_init(|| Regex::new(r"\s+and\s+").unwrap());

    and.split(value.trim())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(parse_biblatex_name)
        .collect()
}

fn parse_biblatex_name(name: &str) -> Author {
    // A fully braced name is an institution and must not be split.
    if name.starts_with('{') && name.ends_with('}') {
        return Author::new(strip_braces(name).trim(), None);
    }

    let name = strip_braces(name);
    if let Some((family, given)) = name.split_once(',') {
        let given = given.trim();
        return Author::new(
            family.trim(),
            (!given.is_empty()).then(|| given.to_string()),
        );
    }

    match name.trim().rsplit_once(char::is_whitespace) {
        Some((given, family)) => Author::new(family.trim(), Some(given.trim().to_string())),
        None => Author::new(name.trim(), None),
    }
}

/// The leading numeric token of a date string: `2020-05-01` gives 2020.
fn leading_year(value: &str) -> Option<i32> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let year = YEAR.get_or_init(|| Regex::new(r"^\s*\{*\s*(-?\d+)").unwrap());

    year.captures(value)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ---------------------------------------------------------------------------
// CSL-JSON
// ---------------------------------------------------------------------------

fn normalize_csl_json(record: &RawRecord) -> Result<Entry, AdaptError> {
    let citekey = match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(AdaptError::MissingCitekey { field: "id" }),
    };
    let entry_type = record
        .get("type")
        .and_then(Value::as_str)
        .map(EntryType::from_csl)
        .unwrap_or(EntryType::Misc);

    let mut entry = Entry::new(citekey, entry_type);
    let mut consumed: Vec<&str> = vec!["id", "type"];

    if let Some(title) = record.get("title").and_then(Value::as_str) {
        entry.title = title.trim().to_string();
        consumed.push("title");
    }

    if let Some(authors) = record.get("author") {
        entry.authors = csl_names(authors)?;
        consumed.push("author");
    }

    if let Some(issued) = record.get("issued") {
        entry.year = csl_year(issued)?;
        consumed.push("issued");
    }

    if let Some(container) = record.get("container-title").and_then(Value::as_str) {
        entry.container_title = Some(container.trim().to_string());
        consumed.push("container-title");
    }

    entry.passthrough = passthrough(record, &consumed);
    Ok(entry)
}

fn csl_names(value: &Value) -> Result<Vec<Author>, AdaptError> {
    let names = value
        .as_array()
        .ok_or(AdaptError::InvalidField { field: "author" })?;

    names
        .iter()
        .map(|name| {
            let family = name.get("family").and_then(Value::as_str);
            let given = name.get("given").and_then(Value::as_str);
            let literal = name.get("literal").and_then(Value::as_str);
            match (family, literal) {
                (Some(family), _) => Ok(Author::new(family, given.map(str::to_string))),
                (None, Some(literal)) => Ok(Author::new(literal, None)),
                (None, None) => match given {
                    Some(given) => Ok(Author::new(given, None)),
                    None => Err(AdaptError::InvalidField { field: "author" }),
                },
            }
        })
        .collect()
}

/// First numeric component of `issued.date-parts`, falling back to `raw`.
///
/// Empty date parts (`[]` or `[[]]`) mean the item is undated.
fn csl_year(issued: &Value) -> Result<Option<i32>, AdaptError> {
    if let Some(parts) = issued.get("date-parts") {
        let first_part = match parts.as_array() {
            Some(parts) => parts.first(),
            None => return Err(invalid_issued(issued)),
        };
        let first = match first_part {
            None => return Ok(None),
            Some(Value::Array(part)) if part.is_empty() => return Ok(None),
            Some(part) => part.get(0),
        };
        return match first {
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|y| i32::try_from(y).ok())
                .map(Some)
                .ok_or_else(|| invalid_issued(issued)),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid_issued(issued)),
            _ => Err(invalid_issued(issued)),
        };
    }

    match issued.get("raw").and_then(Value::as_str) {
        Some(raw) => leading_year(raw).map(Some).ok_or_else(|| invalid_issued(issued)),
        None => Ok(None),
    }
}

fn invalid_issued(issued: &Value) -> AdaptError {
    AdaptError::InvalidDate {
        field: "issued",
        value: issued.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn non_empty_str<'a>(record: &'a RawRecord, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn passthrough(
    record: &RawRecord,
    consumed: &[&str],
) -> std::collections::BTreeMap<String, Value> {
    record
        .iter()
        .filter(|(key, _)| !consumed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    // ===========================================
    // BibLaTeX
    // ===========================================

    #[test]
    fn test_biblatex_full_record() {
        // Given: a decoded BibLaTeX article
        let raw = record(json!({
            "key": "smith2020",
            "entrytype": "article",
            "author": "Smith, John and Jane Doe and {World Health Organization}",
            "title": "A {DNA} Study",
            "date": "2020-05-01",
            "journaltitle": "Nature",
            "doi": "10.1000/xyz",
        }));

        // When: we normalize it
        let entry = normalize(&raw, BibFormat::BibLatex).unwrap();

        // Then: every normalized field is populated
        assert_eq!(entry.citekey(), "smith2020");
        assert_eq!(entry.entry_type, EntryType::Article);
        assert_eq!(entry.title, "A DNA Study");
        assert_eq!(entry.year, Some(2020));
        assert_eq!(entry.container_title.as_deref(), Some("Nature"));
        assert_eq!(
            entry.authors,
            vec![
                Author::new("Smith", Some("John".to_string())),
                Author::new("Doe", Some("Jane".to_string())),
                Author::new("World Health Organization", None),
            ]
        );
        // And: unmapped fields pass through verbatim
        assert_eq!(entry.passthrough.len(), 1);
        assert_eq!(entry.passthrough["doi"], json!("10.1000/xyz"));
    }

    #[test]
    fn test_biblatex_year_field_and_range_date() {
        let from_year = record(json!({"key": "a", "year": "1999"}));
        let from_range = record(json!({"key": "b", "date": "2015/2016"}));

        assert_eq!(normalize(&from_year, BibFormat::BibLatex).unwrap().year, Some(1999));
        assert_eq!(normalize(&from_range, BibFormat::BibLatex).unwrap().year, Some(2015));
    }

    #[test]
    fn test_biblatex_and_inside_names_is_not_a_separator() {
        let raw = record(json!({"key": "a", "author": "Anderson, Alexandra and Sandy Brand"}));

        let entry = normalize(&raw, BibFormat::BibLatex).unwrap();

        assert_eq!(entry.authors.len(), 2);
        assert_eq!(entry.authors[0].family, "Anderson");
        assert_eq!(entry.authors[1].family, "Brand");
    }

    #[test]
    fn test_biblatex_missing_citekey() {
        let raw = record(json!({"key": "  ", "title": "Untitled"}));

        let err = normalize(&raw, BibFormat::BibLatex).unwrap_err();

        assert_eq!(err, AdaptError::MissingCitekey { field: "key" });
    }

    #[test]
    fn test_biblatex_unparsable_date() {
        let raw = record(json!({"key": "a", "date": "forthcoming"}));

        let err = normalize(&raw, BibFormat::BibLatex).unwrap_err();

        assert!(matches!(err, AdaptError::InvalidDate { field: "date", .. }));
    }

    #[test]
    fn test_biblatex_secondary_container_passes_through() {
        let raw = record(json!({"key": "a", "journal": "J", "booktitle": "B"}));

        let entry = normalize(&raw, BibFormat::BibLatex).unwrap();

        assert_eq!(entry.container_title.as_deref(), Some("J"));
        assert_eq!(entry.passthrough["booktitle"], json!("B"));
    }

    // ===========================================
    // CSL-JSON
    // ===========================================

    #[test]
    fn test_csl_json_full_record() {
        let raw = record(json!({
            "id": "doe2021",
            "type": "article-journal",
            "author": [{"family": "Doe", "given": "John"}, {"literal": "ACME Lab"}],
            "title": "Test Article",
            "issued": {"date-parts": [[2021, 3]]},
            "container-title": "Journal of Tests",
            "DOI": "10.1/abc",
            "page": "1-10",
        }));

        let entry = normalize(&raw, BibFormat::CslJson).unwrap();

        assert_eq!(entry.citekey(), "doe2021");
        assert_eq!(entry.entry_type, EntryType::Article);
        assert_eq!(entry.title, "Test Article");
        assert_eq!(entry.year, Some(2021));
        assert_eq!(entry.container_title.as_deref(), Some("Journal of Tests"));
        assert_eq!(entry.author_string(), "John Doe, ACME Lab");
        assert_eq!(entry.passthrough.len(), 2);
        assert_eq!(entry.passthrough["DOI"], json!("10.1/abc"));
    }

    #[test]
    fn test_csl_json_string_date_part_and_raw_date() {
        let string_part = record(json!({"id": "a", "issued": {"date-parts": [["2004"]]}}));
        let raw_date = record(json!({"id": "b", "issued": {"raw": "2010-01-02"}}));
        let literal_only = record(json!({"id": "c", "issued": {"literal": "n.d."}}));

        assert_eq!(normalize(&string_part, BibFormat::CslJson).unwrap().year, Some(2004));
        assert_eq!(normalize(&raw_date, BibFormat::CslJson).unwrap().year, Some(2010));
        assert_eq!(normalize(&literal_only, BibFormat::CslJson).unwrap().year, None);
    }

    #[test]
    fn test_csl_json_empty_date_parts_are_undated() {
        let empty_part = record(json!({"id": "a", "issued": {"date-parts": [[]]}}));
        let no_parts = record(json!({"id": "b", "issued": {"date-parts": []}}));

        assert_eq!(normalize(&empty_part, BibFormat::CslJson).unwrap().year, None);
        assert_eq!(normalize(&no_parts, BibFormat::CslJson).unwrap().year, None);
    }

    #[test]
    fn test_csl_json_invalid_date_parts() {
        let raw = record(json!({"id": "a", "issued": {"date-parts": [["soon"]]}}));

        let err = normalize(&raw, BibFormat::CslJson).unwrap_err();

        assert!(matches!(err, AdaptError::InvalidDate { field: "issued", .. }));
    }

    #[test]
    fn test_csl_json_missing_id() {
        let raw = record(json!({"title": "No id"}));
        assert_eq!(
            normalize(&raw, BibFormat::CslJson).unwrap_err(),
            AdaptError::MissingCitekey { field: "id" }
        );
    }

    #[test]
    fn test_format_tag_selects_adapter() {
        // Given: a CSL-JSON shaped record
        let raw = record(json!({"id": "x", "title": "T"}));

        // Then: the BibLaTeX adapter does not look at `id`
        assert!(normalize(&raw, BibFormat::BibLatex).is_err());
        assert!(normalize(&raw, BibFormat::CslJson).is_ok());
        assert_eq!(raw_citekey(&raw, BibFormat::CslJson), Some("x"));
        assert_eq!(raw_citekey(&raw, BibFormat::BibLatex), None);
    }
}
