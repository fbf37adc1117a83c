//! The entry store.
//!
//! A [`Library`] is an immutable snapshot built once per successful reload.
//! The process-wide "current library" lives in a [`LibraryHandle`]: readers
//! clone an `Arc` out of it, and the reload path is the only writer. A reader
//! that took a snapshot keeps seeing it unchanged after a newer one is
//! installed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::entry::Entry;

/// Flat string variables handed to templates.
pub type TemplateVariables = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("duplicate citekey '{0}'")]
    DuplicateCitekey(String),

    #[error("entry #{0} has an empty citekey")]
    EmptyCitekey(usize),
}

/// Immutable index from citekey to entry.
#[derive(Debug, Default)]
pub struct Library {
    entries: HashMap<String, Arc<Entry>>,
}

impl Library {
    /// Builds a library, rejecting empty and colliding citekeys.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self, LibraryError> {
        let mut map = HashMap::new();
        for (index, entry) in entries.into_iter().enumerate() {
            if entry.citekey().trim().is_empty() {
                return Err(LibraryError::EmptyCitekey(index));
            }
            let citekey = entry.citekey().to_string();
            if map.contains_key(&citekey) {
                return Err(LibraryError::DuplicateCitekey(citekey));
            }
            map.insert(citekey, Arc::new(entry));
        }
        Ok(Self { entries: map })
    }

    pub fn lookup(&self, citekey: &str) -> Option<&Arc<Entry>> {
        self.entries.get(citekey)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All citekeys in sorted order.
    pub fn citekeys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Flattens an entry into template variables.
    ///
    /// Passthrough fields are added first so the normalized variables
    /// (`citekey`, `title`, `authorString`, `year`, `containerTitle`,
    /// `entryType`, `zoteroSelectURI`) always win on a name clash.
    /// Returns `None` for an unknown citekey.
    pub fn template_variables(&self, citekey: &str) -> Option<TemplateVariables> {
        let entry = self.lookup(citekey)?;
        let mut vars: TemplateVariables = entry
            .passthrough
            .iter()
            .map(|(key, value)| (key.clone(), flatten_value(value)))
            .collect();

        vars.insert("citekey".into(), entry.citekey().to_string());
        vars.insert("title".into(), entry.title.clone());
        vars.insert("authorString".into(), entry.author_string());
        vars.insert(
            "year".into(),
            entry.year.map(|y| y.to_string()).unwrap_or_default(),
        );
        vars.insert(
            "containerTitle".into(),
            entry.container_title.clone().unwrap_or_default(),
        );
        vars.insert("entryType".into(), entry.entry_type.as_str().to_string());
        vars.insert("zoteroSelectURI".into(), entry.zotero_select_uri());

        Some(vars)
    }
}

/// Strings are used as-is, anything else as compact JSON.
fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Shared, atomically replaceable pointer to the current library.
///
/// Each installed library is tagged with the generation of the parse that
/// produced it; an older generation can never replace a newer one.
#[derive(Debug, Default)]
pub struct LibraryHandle {
    current: RwLock<Option<(u64, Arc<Library>)>>,
}

impl LibraryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, or `None` if nothing was ever loaded.
    pub fn current(&self) -> Option<Arc<Library>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, library)| Arc::clone(library))
    }

    /// Installs `library` if `generation` is newer than the installed one.
    ///
    /// Returns whether the library was installed.
    pub fn install(&self, generation: u64, library: Arc<Library>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((installed, _)) = current.as_ref() {
            if *installed >= generation {
                debug!(generation, installed, "discarding stale library");
                return false;
            }
        }
        info!(generation, size = library.size(), "library installed");
        *current = Some((generation, library));
        true
    }
}
