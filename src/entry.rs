//! Normalized bibliography entries.
//!
//! Both supported export formats are reduced to the same [`Entry`] shape by
//! the adapters in [`crate::adapter`]. Entries are immutable once built.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw, format-agnostic record as produced by the decoders in [`crate::refs`].
///
/// For BibLaTeX exports this holds the lower-cased field names plus the
/// `key` and `entrytype` pseudo-fields; for CSL-JSON it is the object itself.
pub type RawRecord = serde_json::Map<String, Value>;

/// The bibliography export formats understood by the index.
///
/// The format is always supplied by the caller; it is never guessed from
/// the content of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BibFormat {
    /// Plain-text BibLaTeX / BibTeX export.
    #[value(name = "biblatex")]
    BibLatex,
    /// CSL-JSON export (array or one object per line).
    #[value(name = "csl-json")]
    CslJson,
}

impl BibFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BibFormat::BibLatex => "biblatex",
            BibFormat::CslJson => "csl-json",
        }
    }
}

impl fmt::Display for BibFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured personal or institutional name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub family: String,
    pub given: Option<String>,
}

impl Author {
    pub fn new(family: impl Into<String>, given: Option<String>) -> Self {
        Self {
            family: family.into(),
            given,
        }
    }

    /// Display form, "Given Family" or just "Family" for institutions.
    pub fn display_name(&self) -> String {
        match &self.given {
            Some(given) => format!("{} {}", given, self.family),
            None => self.family.clone(),
        }
    }
}

/// The kind of work an entry describes, shared across export formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Article,
    Book,
    Chapter,
    ConferencePaper,
    Thesis,
    Report,
    Webpage,
    Dataset,
    Software,
    Manuscript,
    Misc,
    /// Any type name that has no shared counterpart.
    Other(String),
}

impl EntryType {
    /// Maps a BibLaTeX entry type (case-insensitive).
    pub fn from_biblatex(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "article" => Self::Article,
            "book" | "mvbook" | "booklet" | "collection" | "mvcollection" | "proceedings" => {
                Self::Book
            }
            "inbook" | "incollection" | "bookinbook" | "suppbook" => Self::Chapter,
            "inproceedings" | "conference" => Self::ConferencePaper,
            "thesis" | "phdthesis" | "mastersthesis" => Self::Thesis,
            "report" | "techreport" => Self::Report,
            "online" | "electronic" | "www" => Self::Webpage,
            "dataset" => Self::Dataset,
            "software" => Self::Software,
            "unpublished" => Self::Manuscript,
            "misc" => Self::Misc,
            other => Self::Other(other.to_string()),
        }
    }

    /// Maps a CSL item type.
    pub fn from_csl(name: &str) -> Self {
        match name {
            "article" | "article-journal" | "article-magazine" | "article-newspaper" => {
                Self::Article
            }
            "book" => Self::Book,
            "chapter" | "entry-dictionary" | "entry-encyclopedia" => Self::Chapter,
            "paper-conference" => Self::ConferencePaper,
            "thesis" => Self::Thesis,
            "report" => Self::Report,
            "webpage" | "post" | "post-weblog" => Self::Webpage,
            "dataset" => Self::Dataset,
            "software" => Self::Software,
            "manuscript" => Self::Manuscript,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Article => "article",
            Self::Book => "book",
            Self::Chapter => "chapter",
            Self::ConferencePaper => "paper-conference",
            Self::Thesis => "thesis",
            Self::Report => "report",
            Self::Webpage => "webpage",
            Self::Dataset => "dataset",
            Self::Software => "software",
            Self::Manuscript => "manuscript",
            Self::Misc => "misc",
            Self::Other(name) => name,
        }
    }
}

/// A normalized bibliography record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    citekey: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub year: Option<i32>,
    pub container_title: Option<String>,
    pub entry_type: EntryType,
    /// Source fields with no normalized counterpart, carried verbatim.
    pub passthrough: BTreeMap<String, Value>,
}

impl Entry {
    /// Creates an entry with only its citekey set.
    ///
    /// Callers are expected to have rejected empty citekeys already; the
    /// adapters do so before constructing an entry.
    pub fn new(citekey: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            citekey: citekey.into(),
            title: String::new(),
            authors: Vec::new(),
            year: None,
            container_title: None,
            entry_type,
            passthrough: BTreeMap::new(),
        }
    }

    pub fn citekey(&self) -> &str {
        &self.citekey
    }

    /// Authors joined for display: "Jane Doe, John Smith".
    pub fn author_string(&self) -> String {
        self.authors
            .iter()
            .map(Author::display_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Zotero deep link selecting this item by citekey.
    pub fn zotero_select_uri(&self) -> String {
        format!("zotero://select/items/@{}", self.citekey)
    }
}
