//! Preview post-processing.
//!
//! Replaces citation references in rendered note text with their formatted
//! inline citations. References that cannot be resolved or formatted are
//! left exactly as written.

use crate::library::Library;
use crate::markdown::scan_line;
use crate::processor::{format_citation, CitationEngine, InlineCitation, ProcessorError};

/// A span of text and what should replace it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCitation {
    /// Start and end byte positions of the reference
    pub original_span: (usize, usize),
    /// The formatted citation text (e.g., "(Doe, 2021)")
    pub formatted: String,
}

/// Replaces spans in `text` with formatted citations.
///
/// Replacements are applied from the end of the text towards the start so
/// that earlier spans stay valid.
pub fn replace_citations(text: &str, processed: &[ProcessedCitation]) -> String {
    if processed.is_empty() {
        return text.to_string();
    }

    let mut sorted: Vec<_> = processed.iter().collect();
    sorted.sort_by(|a, b| b.original_span.0.cmp(&a.original_span.0));

    let mut result = text.to_string();
    for citation in sorted {
        let (start, end) = citation.original_span;
        result.replace_range(start..end, &citation.formatted);
    }

    result
}

/// Replaces every resolvable reference in `text` with its inline citation.
///
/// Without a library the text is returned unchanged.
pub fn annotate_citations(
    text: &str,
    library: Option<&Library>,
    engine: &dyn CitationEngine,
) -> Result<String, ProcessorError> {
    let Some(library) = library else {
        return Ok(text.to_string());
    };

    let mut output = String::with_capacity(text.len());
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let mut processed = Vec::new();
        for reference in scan_line(line, index + 1) {
            let citation = format_citation(engine, Some(library), &reference.citekey, true)?;
            if let InlineCitation::Formatted(formatted) = citation {
                processed.push(ProcessedCitation {
                    original_span: reference.span,
                    formatted,
                });
            }
        }
        output.push_str(&replace_citations(line, &processed));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Author, Entry, EntryType};
    use crate::processor::AuthorDateEngine;

    fn library() -> Library {
        let mut doe = Entry::new("doe2021", EntryType::Article);
        doe.authors = vec![Author::new("Doe", Some("Jane".to_string()))];
        doe.year = Some(2021);
        let empty = Entry::new("blank", EntryType::Misc);
        Library::from_entries(vec![doe, empty]).unwrap()
    }

    // ===========================================
    // replace_citations
    // ===========================================

    #[test]
    fn test_replace_citations_multiple() {
        // Given: a line with two references
        let text = "First [[@a]] and second [[@b]] here.";
        let processed = vec![
            ProcessedCitation {
                original_span: (6, 12),
                formatted: "(A, 2020)".to_string(),
            },
            ProcessedCitation {
                original_span: (24, 30),
                formatted: "(B, 2021)".to_string(),
            },
        ];

        // When: we replace them
        let result = replace_citations(text, &processed);

        // Then: both markers are replaced
        assert_eq!(result, "First (A, 2020) and second (B, 2021) here.");
    }

    #[test]
    fn test_replace_citations_empty_list() {
        assert_eq!(replace_citations("Unchanged.", &[]), "Unchanged.");
    }

    #[test]
    fn test_replace_citations_shorter_replacement() {
        let text = "Text [[@very-long-citation-key]] more.";
        let processed = vec![ProcessedCitation {
            original_span: (5, 32),
            formatted: "[1]".to_string(),
        }];

        assert_eq!(replace_citations(text, &processed), "Text [1] more.");
    }

    // ===========================================
    // annotate_citations
    // ===========================================

    #[test]
    fn test_annotate_resolved_reference() {
        let lib = library();

        let out = annotate_citations("As shown [[@doe2021]].", Some(&lib), &AuthorDateEngine).unwrap();

        assert_eq!(out, "As shown (Doe, 2021).");
    }

    #[test]
    fn test_annotate_keeps_unresolved_and_unprintable() {
        // Given: one unknown citekey and one entry with no printed form
        let lib = library();
        let text = "[[@ghost]] and [[@blank]] and [[@doe2021]]";

        // When: we annotate
        let out = annotate_citations(text, Some(&lib), &AuthorDateEngine).unwrap();

        // Then: only the printable one is replaced
        assert_eq!(out, "[[@ghost]] and [[@blank]] and (Doe, 2021)");
    }

    #[test]
    fn test_annotate_preserves_line_structure() {
        let lib = library();
        let text = "# Notes\r\n\nSee [[@doe2021#p. 3]]\nend\n";

        let out = annotate_citations(text, Some(&lib), &AuthorDateEngine).unwrap();

        assert_eq!(out, "# Notes\r\n\nSee (Doe, 2021)\nend\n");
    }

    #[test]
    fn test_annotate_without_library_is_a_no_op() {
        let text = "See [[@doe2021]]";
        assert_eq!(annotate_citations(text, None, &AuthorDateEngine).unwrap(), text);
    }
}
