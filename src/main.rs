//! CLI for cite-index - query a bibliography export from Markdown notes.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cite_index::{
    BibFormat, CitationIndex, Extraction, InlineCitation, LoadError, Settings, TemplateKind,
    Unavailable,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Query a bibliography export: template variables, citations and note text
#[derive(Parser)]
#[command(name = "cite-index")]
#[command(version)]
#[command(after_help = "\
Examples:
  cite-index --bib library.json lookup doe2021
  cite-index --bib library.bib --format biblatex render title doe2021
  cite-index --config settings.toml extract notes/paper.md
  echo 'See [[@doe2021]]' | cite-index --bib library.json annotate -")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bibliography export, overrides the settings file
    #[arg(short, long, global = true)]
    bib: Option<PathBuf>,

    /// Export format, overrides the settings file
    #[arg(short, long, global = true, value_enum)]
    format: Option<BibFormat>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every citekey in the bibliography
    Keys,

    /// Print the template variables of an entry as JSON
    Lookup { citekey: String },

    /// Render one of the configured templates for an entry
    Render {
        #[arg(value_enum)]
        kind: TemplateKind,
        citekey: String,
    },

    /// Format a citation with the built-in author-date engine
    Cite {
        citekey: String,

        /// Full bibliography form instead of the in-text form
        #[arg(long)]
        full: bool,
    },

    /// List the citation references found in a Markdown file as JSON
    Extract {
        /// Input Markdown file (use '-' for stdin)
        input: PathBuf,
    },

    /// Replace resolvable citation references with formatted citations
    Annotate {
        /// Input Markdown file (use '-' for stdin)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// AppError: semantic exit codes
// ---------------------------------------------------------------------------

enum AppError {
    /// Exit 10: input file not found / unreadable
    InputFile(String),
    /// Exit 11: bibliography missing, unreadable or invalid
    BibFile(String),
    /// Exit 12: settings file unreadable or invalid
    Settings(String),
    /// Exit 13: citation key not found in bibliography
    ReferenceNotFound(String),
    /// Exit 14: citation engine error
    Engine(String),
    /// Exit 15: cannot write output
    OutputFile(String),
    /// Exit 16: malformed template
    Template(String),
    /// Exit 17: the entry has no printed form
    Unavailable(String),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::InputFile(_) => 10,
            AppError::BibFile(_) => 11,
            AppError::Settings(_) => 12,
            AppError::ReferenceNotFound(_) => 13,
            AppError::Engine(_) => 14,
            AppError::OutputFile(_) => 15,
            AppError::Template(_) => 16,
            AppError::Unavailable(_) => 17,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputFile(msg) => {
                write!(f, "{}\n  hint: verify the file path is correct", msg)
            }
            AppError::BibFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: pass --bib and --format (biblatex or csl-json), or set citation-export-path in the settings file",
                    msg
                )
            }
            AppError::Settings(msg) => {
                write!(f, "{}\n  hint: settings keys are kebab-case, e.g. title-template", msg)
            }
            AppError::ReferenceNotFound(msg) => {
                write!(
                    f,
                    "{}\n  hint: run 'cite-index keys' to list the citekeys in your bibliography",
                    msg
                )
            }
            AppError::Engine(msg) => write!(f, "{}", msg),
            AppError::OutputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that the output directory exists and is writable",
                    msg
                )
            }
            AppError::Template(msg) => {
                write!(f, "{}\n  hint: templates use {{{{variable}}}} and {{{{#if variable}}}}...{{{{/if}}}}", msg)
            }
            AppError::Unavailable(msg) => write!(f, "{}", msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "cite_index=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let settings = load_settings(cli.config.as_deref(), cli.bib, cli.format)?;
    let index = CitationIndex::new(settings);
    load_library(&index).await?;

    match cli.command {
        Commands::Keys => keys_command(&index),
        Commands::Lookup { citekey } => lookup_command(&index, &citekey),
        Commands::Render { kind, citekey } => render_command(&index, kind, &citekey),
        Commands::Cite { citekey, full } => cite_command(&index, &citekey, !full),
        Commands::Extract { input } => extract_command(&index, &input),
        Commands::Annotate { input, output } => {
            annotate_command(&index, &input, output.as_deref())
        }
    }
}

/// Settings file (or defaults) with CLI overrides applied.
fn load_settings(
    config: Option<&Path>,
    bib: Option<PathBuf>,
    format: Option<BibFormat>,
) -> Result<Settings, AppError> {
    let mut settings = match config {
        Some(path) => Settings::load(path)
            .map_err(|e| AppError::Settings(format!("'{}': {}", path.display(), e)))?,
        None => Settings::default(),
    };

    if let Some(bib) = bib {
        settings.citation_export_path = Some(bib);
    }
    if let Some(format) = format {
        settings.citation_export_format = format;
    }

    Ok(settings)
}

async fn load_library(index: &CitationIndex) -> Result<(), AppError> {
    let settings = index.settings();
    let describe = |e: LoadError| match &settings.citation_export_path {
        Some(path) => AppError::BibFile(format!("'{}': {}", path.display(), e)),
        None => AppError::BibFile(e.to_string()),
    };

    let pending = index.reload_configured().map_err(describe)?;
    let library = pending.complete().await.map_err(describe)?;
    tracing::debug!(size = library.size(), "bibliography loaded");
    Ok(())
}

fn read_input(input: &Path) -> Result<String, AppError> {
    if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AppError::InputFile(format!("failed to read from stdin: {}", e)))?;
        Ok(buf)
    } else {
        fs::read_to_string(input)
            .map_err(|e| AppError::InputFile(format!("'{}': {}", input.display(), e)))
    }
}

fn write_stdout(text: &str) -> Result<(), AppError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))
}

fn not_found(citekey: &str) -> AppError {
    AppError::ReferenceNotFound(format!("citation key not found: {}", citekey))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn keys_command(index: &CitationIndex) -> Result<(), AppError> {
    let Some(library) = index.library() else {
        return Ok(());
    };
    write_stdout(&library.citekeys().join("\n"))
}

fn lookup_command(index: &CitationIndex, citekey: &str) -> Result<(), AppError> {
    let variables = index
        .template_variables(citekey)
        .ok_or_else(|| not_found(citekey))?;
    let json = serde_json::to_string_pretty(&variables)
        .map_err(|e| AppError::OutputFile(e.to_string()))?;
    write_stdout(&json)
}

fn render_command(index: &CitationIndex, kind: TemplateKind, citekey: &str) -> Result<(), AppError> {
    let rendered = index
        .render(kind, citekey)
        .map_err(|e| AppError::Template(format!("{} template: {}", kind, e)))?
        .ok_or_else(|| not_found(citekey))?;
    write_stdout(&rendered)
}

fn cite_command(index: &CitationIndex, citekey: &str, inline: bool) -> Result<(), AppError> {
    let citation = index
        .format_inline(citekey, inline)
        .map_err(|e| AppError::Engine(e.to_string()))?;

    match citation {
        InlineCitation::Formatted(text) => write_stdout(&text),
        InlineCitation::Unavailable(Unavailable::UnknownCitekey | Unavailable::NoLibrary) => {
            Err(not_found(citekey))
        }
        InlineCitation::Unavailable(Unavailable::NoPrintedForm) => Err(AppError::Unavailable(
            format!("'{}' has no printed form in this citation style", citekey),
        )),
    }
}

fn extract_command(index: &CitationIndex, input: &Path) -> Result<(), AppError> {
    let text = read_input(input)?;

    let occurrences = match index.extract(&text) {
        Extraction::Found(occurrences) => occurrences,
        Extraction::NoLibrary => Vec::new(),
    };

    let json: Vec<serde_json::Value> = occurrences
        .iter()
        .map(|o| {
            serde_json::json!({
                "citekey": o.citekey,
                "locator": o.locator,
                "line": o.line_number,
                "resolved": o.entry.is_some(),
                "title": o.entry.as_ref().map(|e| e.title.clone()),
                "sourceLine": o.source_line,
            })
        })
        .collect();

    let out = serde_json::to_string_pretty(&json)
        .map_err(|e| AppError::OutputFile(e.to_string()))?;
    write_stdout(&out)
}

fn annotate_command(
    index: &CitationIndex,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), AppError> {
    let text = read_input(input)?;
    let annotated = index
        .annotate(&text)
        .map_err(|e| AppError::Engine(e.to_string()))?;

    if let Some(output_path) = output {
        fs::write(output_path, &annotated).map_err(|e| {
            AppError::OutputFile(format!("'{}': {}", output_path.display(), e))
        })?;
        eprintln!("wrote {}", output_path.display());
        Ok(())
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{}", annotated).map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))
    }
}
