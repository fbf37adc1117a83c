//! Citation reference scanning.
//!
//! Finds references of the form `[[@citekey]]`, `[@citekey]`, and
//! `[[@citekey#locator]]` / `[[@citekey^locator]]` in free text, line by
//! line, and resolves them against a [`Library`].

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::entry::Entry;
use crate::library::Library;

/// Grammar for a single reference.
///
/// Group 1: citekey (no `]`, `#` or `^`)
/// Group 2: locator text after the `#`/`^` marker (optional)
const REFERENCE_PATTERN: &str = r"\[\[?@([^\]#^]+)(?:[#^]+([^\]]*))?\]\]?";

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REFERENCE_PATTERN).unwrap())
}

/// A reference as written in the text, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationReference {
    pub citekey: String,
    pub locator: Option<String>,
    /// 1-based line number.
    pub line_number: usize,
    /// Start and end byte positions within the line.
    pub span: (usize, usize),
}

/// A reference found in text together with the entry it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationOccurrence {
    pub citekey: String,
    pub locator: Option<String>,
    /// `None` when the citekey is not in the library.
    pub entry: Option<Arc<Entry>>,
    /// The whole line the reference was found on.
    pub source_line: String,
    pub line_number: usize,
    pub span: (usize, usize),
}

/// Outcome of scanning text against the current library.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// No library has been loaded yet; nothing was resolved.
    NoLibrary,
    /// The occurrences found, possibly none.
    Found(Vec<CitationOccurrence>),
}

impl Extraction {
    /// The occurrences, treating a missing library as "nothing found".
    pub fn into_occurrences(self) -> Vec<CitationOccurrence> {
        match self {
            Extraction::NoLibrary => Vec::new(),
            Extraction::Found(occurrences) => occurrences,
        }
    }
}

/// Finds every citation reference in `text`.
///
/// # Examples
///
/// ```
/// use cite_index::markdown::scan_references;
///
/// let refs = scan_references("See [[@smith2020#p. 4]] and [@doe2021].");
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].citekey, "smith2020");
/// assert_eq!(refs[0].locator.as_deref(), Some("p. 4"));
/// ```
pub fn scan_references(text: &str) -> Vec<CitationReference> {
    text.lines()
        .enumerate()
        .flat_map(|(index, line)| scan_line(line, index + 1))
        .collect()
}

pub(crate) fn scan_line(
    line: &str,
    line_number: usize,
) -> impl Iterator<Item = CitationReference> + '_ {
    reference_regex().captures_iter(line).filter_map(move |cap| {
        let full_match = cap.get(0)?;
        let citekey = cap.get(1)?.as_str().trim();
        if citekey.is_empty() {
            return None;
        }
        let locator = cap
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        Some(CitationReference {
            citekey: citekey.to_string(),
            locator,
            line_number,
            span: (full_match.start(), full_match.end()),
        })
    })
}

/// Extracts and resolves every citation in `text`.
///
/// Unknown citekeys still produce an occurrence, with `entry` set to
/// `None`. A missing library yields [`Extraction::NoLibrary`], which is
/// distinct from a loaded library with no matches.
pub fn extract_citations(text: &str, library: Option<&Library>) -> Extraction {
    let Some(library) = library else {
        return Extraction::NoLibrary;
    };

    let occurrences = text
        .lines()
        .enumerate()
        .flat_map(|(index, line)| {
            scan_line(line, index + 1).map(move |reference| CitationOccurrence {
                entry: library.lookup(&reference.citekey).cloned(),
                citekey: reference.citekey,
                locator: reference.locator,
                source_line: line.to_string(),
                line_number: reference.line_number,
                span: reference.span,
            })
        })
        .collect();

    Extraction::Found(occurrences)
}
