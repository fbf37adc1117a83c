//! User settings.
//!
//! Settings are read from a TOML file with kebab-case keys. Every key is
//! optional; missing keys take the defaults below.
//!
//! ```toml
//! citation-export-path = "library.bib"
//! citation-export-format = "biblatex"
//! literature-note-folder = "Reading notes"
//! title-template = "@{{citekey}}"
//! markdown-citation-template = "[@{{citekey}}]"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::entry::BibFormat;
use crate::template::TemplateKind;

/// Errors that can occur when loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub const DEFAULT_TITLE_TEMPLATE: &str = "@{{citekey}}";
pub const DEFAULT_CONTENT_TEMPLATE: &str =
    "---\ntitle: {{title}}\nauthors: {{authorString}}\nyear: {{year}}\n---\n\n";
pub const DEFAULT_CITATION_TEMPLATE: &str = "[@{{citekey}}]";
pub const DEFAULT_ALTERNATIVE_CITATION_TEMPLATE: &str = "@{{citekey}}";
pub const DEFAULT_NOTE_FOLDER: &str = "Reading notes";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Path of the bibliography export to index.
    pub citation_export_path: Option<PathBuf>,
    pub citation_export_format: BibFormat,
    pub literature_note_folder: PathBuf,
    pub title_template: String,
    pub content_template: String,
    pub markdown_citation_template: String,
    pub alternative_markdown_citation_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            citation_export_path: None,
            citation_export_format: BibFormat::CslJson,
            literature_note_folder: PathBuf::from(DEFAULT_NOTE_FOLDER),
            title_template: DEFAULT_TITLE_TEMPLATE.to_string(),
            content_template: DEFAULT_CONTENT_TEMPLATE.to_string(),
            markdown_citation_template: DEFAULT_CITATION_TEMPLATE.to_string(),
            alternative_markdown_citation_template: DEFAULT_ALTERNATIVE_CITATION_TEMPLATE
                .to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// The configured source for one of the four templates.
    pub fn template(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::Title => &self.title_template,
            TemplateKind::Content => &self.content_template,
            TemplateKind::Citation => &self.markdown_citation_template,
            TemplateKind::AlternativeCitation => &self.alternative_markdown_citation_template,
        }
    }
}
