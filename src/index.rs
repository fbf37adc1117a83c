//! The citation index: the operations collaborators call.
//!
//! A [`CitationIndex`] owns the parse channel, the current-library handle,
//! the settings and the formatting engine. Reloads go through the
//! single-flight channel and finish by installing a brand-new [`Library`];
//! every read operation works on whatever snapshot is current when it
//! starts and treats "nothing loaded yet" as an empty result.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::adapter::{normalize, raw_citekey, AdaptError};
use crate::channel::{ChannelError, ParseChannel, ParseError, ParseRequest, PendingParse};
use crate::entry::{BibFormat, Entry, RawRecord};
use crate::library::{Library, LibraryError, LibraryHandle, TemplateVariables};
use crate::markdown::{extract_citations, Extraction};
use crate::output::annotate_citations;
use crate::processor::{
    format_citation, AuthorDateEngine, CitationEngine, InlineCitation, ProcessorError,
};
use crate::refs::{read_export, RefsError};
use crate::settings::Settings;
use crate::template::{Template, TemplateError, TemplateKind};

/// Errors raised by a reload.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Another reload is in flight and stays authoritative.
    #[error("a reload is already in progress (generation {in_flight})")]
    Blocked { in_flight: u64 },

    #[error("no bibliography export is configured")]
    NoExportConfigured,

    #[error("Failed to read bibliography: {0}")]
    Read(#[from] RefsError),

    #[error("Failed to parse bibliography: {0}")]
    Parse(#[from] ParseError),

    /// A record failed normalization; the whole reload is abandoned.
    #[error("record #{index} ({}): {source}", .citekey.as_deref().unwrap_or("no citekey"))]
    Record {
        index: usize,
        citekey: Option<String>,
        source: AdaptError,
    },

    #[error(transparent)]
    Library(#[from] LibraryError),

    /// A newer library was installed first; this one was discarded.
    #[error("reload generation {generation} was superseded by a newer library")]
    Superseded { generation: u64 },
}

impl From<ChannelError> for LoadError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Blocked { in_flight } => LoadError::Blocked { in_flight },
        }
    }
}

impl LoadError {
    /// Blocked reloads are expected under bursts of change events and can be ignored.
    pub fn is_blocked(&self) -> bool {
        matches!(self, LoadError::Blocked { .. })
    }
}

/// Normalizes a batch, aborting on the first bad record.
pub fn normalize_all(records: &[RawRecord], format: BibFormat) -> Result<Vec<Entry>, LoadError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            normalize(record, format).map_err(|source| {
                let citekey = raw_citekey(record, format).map(str::to_string);
                warn!(index, citekey = ?citekey, error = %source, "record rejected");
                LoadError::Record {
                    index,
                    citekey,
                    source,
                }
            })
        })
        .collect()
}

/// A dispatched reload.
///
/// Dropping it does not cancel the parse, but the resulting library is
/// then never installed.
#[derive(Debug)]
pub struct PendingReload {
    pending: PendingParse,
    format: BibFormat,
    handle: Arc<LibraryHandle>,
}

impl PendingReload {
    pub fn generation(&self) -> u64 {
        self.pending.generation()
    }

    /// Waits for the parse, builds the new library and installs it.
    ///
    /// On error the current library is left untouched. On success the
    /// returned library is the one built by this reload and it has been
    /// installed; a library that lost to a newer generation is reported as
    /// [`LoadError::Superseded`].
    pub async fn complete(self) -> Result<Arc<Library>, LoadError> {
        let generation = self.pending.generation();
        let records = self.pending.await.inspect_err(|e| {
            warn!(generation, error = %e, "bibliography parse failed");
        })?;

        let entries = normalize_all(&records, self.format)?;
        let library = Arc::new(Library::from_entries(entries)?);
        if !self.handle.install(generation, Arc::clone(&library)) {
            return Err(LoadError::Superseded { generation });
        }
        Ok(library)
    }
}

/// Entry point for every citation operation.
pub struct CitationIndex {
    channel: ParseChannel,
    handle: Arc<LibraryHandle>,
    settings: RwLock<Settings>,
    engine: Box<dyn CitationEngine>,
}

impl CitationIndex {
    pub fn new(settings: Settings) -> Self {
        Self {
            channel: ParseChannel::new(),
            handle: Arc::new(LibraryHandle::new()),
            settings: RwLock::new(settings),
            engine: Box::new(AuthorDateEngine),
        }
    }

    /// Replaces the formatting engine.
    pub fn with_engine(mut self, engine: impl CitationEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    /// Replaces the parse channel.
    pub fn with_channel(mut self, channel: ParseChannel) -> Self {
        self.channel = channel;
        self
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// New settings apply to the next operation; templates are never cached.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    // -----------------------------------------------------------------------
    // Reload
    // -----------------------------------------------------------------------

    /// Starts a reload from raw export text.
    ///
    /// Must be called inside a tokio runtime. Fails immediately with
    /// [`LoadError::Blocked`] if a reload is already in flight.
    pub fn reload(
        &self,
        raw_data: impl Into<String>,
        format: BibFormat,
    ) -> Result<PendingReload, LoadError> {
        let pending = self.channel.post(ParseRequest::new(raw_data, format))?;
        info!(generation = pending.generation(), %format, "reload started");
        Ok(PendingReload {
            pending,
            format,
            handle: Arc::clone(&self.handle),
        })
    }

    /// Reads an export file and starts a reload from it.
    pub fn reload_file(&self, path: &Path, format: BibFormat) -> Result<PendingReload, LoadError> {
        // Skip reading the file when the post would be refused anyway.
        if let Some(in_flight) = self.channel.in_flight() {
            return Err(LoadError::Blocked { in_flight });
        }
        let raw_data = read_export(path)?;
        self.reload(raw_data, format)
    }

    /// Reloads the export named in the settings.
    pub fn reload_configured(&self) -> Result<PendingReload, LoadError> {
        let settings = self.settings();
        let path = settings
            .citation_export_path
            .ok_or(LoadError::NoExportConfigured)?;
        self.reload_file(&path, settings.citation_export_format)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The current library snapshot, if one was ever loaded.
    pub fn library(&self) -> Option<Arc<Library>> {
        self.handle.current()
    }

    pub fn lookup(&self, citekey: &str) -> Option<Arc<Entry>> {
        self.library()?.lookup(citekey).cloned()
    }

    pub fn template_variables(&self, citekey: &str) -> Option<TemplateVariables> {
        self.library()?.template_variables(citekey)
    }

    pub fn extract(&self, text: &str) -> Extraction {
        extract_citations(text, self.library().as_deref())
    }

    /// Renders one of the configured templates for `citekey`.
    ///
    /// The template is compiled from the current settings on every call.
    /// Returns `Ok(None)` when no library is loaded or the citekey is unknown.
    pub fn render(&self, kind: TemplateKind, citekey: &str) -> Result<Option<String>, TemplateError> {
        let Some(variables) = self.template_variables(citekey) else {
            return Ok(None);
        };
        let template = Template::compile(self.settings().template(kind))?;
        Ok(Some(template.render(&variables)))
    }

    /// The Markdown citation to insert for `citekey`.
    pub fn markdown_citation(
        &self,
        citekey: &str,
        alternative: bool,
    ) -> Result<Option<String>, TemplateError> {
        let kind = if alternative {
            TemplateKind::AlternativeCitation
        } else {
            TemplateKind::Citation
        };
        self.render(kind, citekey)
    }

    /// Literature note title, safe to use as a file name.
    pub fn note_title(&self, citekey: &str) -> Result<Option<String>, TemplateError> {
        Ok(self
            .render(TemplateKind::Title, citekey)?
            .map(|title| sanitize_file_name(&title)))
    }

    /// Path of the literature note for `citekey` under the note folder.
    pub fn note_path(&self, citekey: &str) -> Result<Option<PathBuf>, TemplateError> {
        let folder = self.settings().literature_note_folder;
        Ok(self
            .note_title(citekey)?
            .map(|title| folder.join(format!("{}.md", title))))
    }

    pub fn format_inline(
        &self,
        citekey: &str,
        inline: bool,
    ) -> Result<InlineCitation, ProcessorError> {
        format_citation(self.engine.as_ref(), self.library().as_deref(), citekey, inline)
    }

    /// Replaces resolvable references in rendered text with inline citations.
    pub fn annotate(&self, text: &str) -> Result<String, ProcessorError> {
        annotate_citations(text, self.library().as_deref(), self.engine.as_ref())
    }
}

/// Drops characters that are not allowed in file names on common platforms.
fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '*' | '"' | '\\' | '/' | '<' | '>' | ':' | '|' | '?'))
        .collect::<String>()
        .trim()
        .to_string()
}
