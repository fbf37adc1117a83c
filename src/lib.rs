//! cite-index: a bibliography index for Markdown note taking.
//!
//! This library provides functionality to:
//! - Decode BibLaTeX and CSL-JSON exports and normalize them into one entry shape
//! - Keep an immutable, atomically replaced library of entries, reloaded in the background
//! - Extract citation references such as `[[@citekey]]` from note text
//! - Render note and citation templates from entry variables
//! - Format inline citations through a pluggable citation engine

pub mod adapter;
pub mod bibtex;
pub mod channel;
pub mod entry;
pub mod index;
pub mod library;
pub mod markdown;
pub mod output;
pub mod processor;
pub mod refs;
pub mod settings;
pub mod template;

pub use adapter::{normalize, AdaptError};
pub use channel::{ChannelError, ParseChannel, ParseError, ParseRequest, PendingParse};
pub use entry::{Author, BibFormat, Entry, EntryType, RawRecord};
pub use index::{CitationIndex, LoadError, PendingReload};
pub use library::{Library, LibraryError, LibraryHandle, TemplateVariables};
pub use markdown::{extract_citations, scan_references, CitationOccurrence, Extraction};
pub use output::annotate_citations;
pub use processor::{
    format_citation, AuthorDateEngine, CitationEngine, InlineCitation, ProcessorError,
    Unavailable, NO_PRINTED_FORM,
};
pub use refs::{decode, read_export};
pub use settings::Settings;
pub use template::{Template, TemplateError, TemplateKind};
