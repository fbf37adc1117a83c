//! Inline citation formatting.
//!
//! Formatting itself is delegated to a [`CitationEngine`]. CSL engines
//! signal "this reference cannot be printed in the active style" by
//! returning a sentinel string instead of failing; that sentinel is
//! detected here and reported as [`Unavailable::NoPrintedForm`] so it never
//! reaches a note.

use thiserror::Error;
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::library::Library;

/// Output produced by CSL engines for a reference with no printed form.
pub const NO_PRINTED_FORM: &str = "[CSL STYLE ERROR: reference with no printed form.]";

/// Errors that can occur during formatting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("CSL processing error: {0}")]
    CslError(String),
}

/// A bibliography formatting engine.
pub trait CitationEngine: Send + Sync {
    /// Formats one entry, as an in-text citation when `inline` is set and
    /// as a full bibliography entry otherwise.
    fn format(&self, entry: &Entry, inline: bool) -> Result<String, ProcessorError>;
}

/// Why no formatted citation could be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    NoLibrary,
    UnknownCitekey,
    NoPrintedForm,
}

/// Result of formatting a citekey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineCitation {
    Formatted(String),
    Unavailable(Unavailable),
}

impl InlineCitation {
    pub fn formatted(&self) -> Option<&str> {
        match self {
            InlineCitation::Formatted(text) => Some(text),
            InlineCitation::Unavailable(_) => None,
        }
    }
}

/// Formats `citekey` from `library` with `engine`.
///
/// # Errors
///
/// Only engine failures are errors; a missing library, an unknown citekey
/// and the engine's no-output sentinel are all [`InlineCitation::Unavailable`].
pub fn format_citation(
    engine: &dyn CitationEngine,
    library: Option<&Library>,
    citekey: &str,
    inline: bool,
) -> Result<InlineCitation, ProcessorError> {
    let Some(library) = library else {
        return Ok(InlineCitation::Unavailable(Unavailable::NoLibrary));
    };
    let Some(entry) = library.lookup(citekey) else {
        debug!(citekey, "citekey not in library");
        return Ok(InlineCitation::Unavailable(Unavailable::UnknownCitekey));
    };

    let formatted = engine.format(entry, inline)?;
    if formatted.contains(NO_PRINTED_FORM) {
        warn!(citekey, "citation engine produced no printed form");
        return Ok(InlineCitation::Unavailable(Unavailable::NoPrintedForm));
    }

    Ok(InlineCitation::Formatted(formatted.trim().to_string()))
}

/// Built-in author-date engine.
///
/// Inline: `(Doe & Smith, 2021)`, `(Doe et al., 2021)`.
/// Full: `Doe, J., & Smith, A. (2021). Title. Container.`
/// Entries with neither authors nor a title have no printed form.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorDateEngine;

impl CitationEngine for AuthorDateEngine {
    fn format(&self, entry: &Entry, inline: bool) -> Result<String, ProcessorError> {
        if entry.authors.is_empty() && entry.title.is_empty() {
            return Ok(NO_PRINTED_FORM.to_string());
        }

        let year = entry
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".to_string());

        if inline {
            let who = match entry.authors.as_slice() {
                [] => entry.title.clone(),
                [one] => one.family.clone(),
                [first, second] => format!("{} & {}", first.family, second.family),
                [first, ..] => format!("{} et al.", first.family),
            };
            return Ok(format!("({}, {})", who, year));
        }

        let names: Vec<String> = entry
            .authors
            .iter()
            .map(|author| match &author.given {
                Some(given) => format!("{}, {}", author.family, initials(given)),
                None => author.family.clone(),
            })
            .collect();

        let mut out = match names.as_slice() {
            [] => String::new(),
            [one] => format!("{} ", one),
            [init @ .., last] => format!("{}, & {} ", init.join(", "), last),
        };
        out.push_str(&format!("({}).", year));
        if !entry.title.is_empty() {
            out.push_str(&format!(" {}.", entry.title.trim_end_matches('.')));
        }
        if let Some(container) = &entry.container_title {
            out.push_str(&format!(" {}.", container.trim_end_matches('.')));
        }
        Ok(out)
    }
}

/// `John Paul` becomes `J. P.`
fn initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|part| part.chars().next())
        .map(|c| format!("{}.", c))
        .collect::<Vec<_>>()
        .join(" ")
}
