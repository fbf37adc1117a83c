//! CLI integration tests.
//!
//! Tests the command-line interface by running the binary as a subprocess.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

/// Path to the compiled binary
fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cite-index"))
}

/// Helper to create a temporary file with content
fn create_temp_file(content: &str, extension: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn run(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

const TEST_REFS: &str = r#"[
  {"id": "doe2021", "type": "book", "author": [{"family": "Doe", "given": "John"}], "title": "Test Book", "issued": {"date-parts": [[2021]]}, "publisher": "Acme"},
  {"id": "blank", "type": "document"}
]"#;

const TEST_BIB: &str = r#"@book{roe2019,
  author = {Roe, Richard and Poe, Edgar Allan},
  title = {Collected {Essays}},
  year = {2019},
}"#;

// ============================================
// Tests for CLI argument parsing
// ============================================

#[test]
fn test_cli_help() {
    // Given: The CLI binary
    let output = run(&["--help"]);

    // Then: Help lists the subcommands
    let stdout = stdout(&output);
    assert!(output.status.success(), "Help should exit with success");
    for command in ["lookup", "extract", "render", "cite", "annotate", "keys"] {
        assert!(stdout.contains(command), "Help should list '{}': {}", command, stdout);
    }
}

#[test]
fn test_cli_missing_subcommand() {
    let output = run(&[]);

    assert!(!output.status.success());
    let stderr = stderr(&output);
    assert!(
        stderr.contains("Usage") || stderr.contains("subcommand"),
        "Should print usage: {}",
        stderr
    );
}

// ============================================
// Tests for query commands
// ============================================

#[test]
fn test_keys_lists_sorted_citekeys() {
    let refs = create_temp_file(TEST_REFS, ".json");

    let output = run(&["--bib", refs.path().to_str().unwrap(), "keys"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "blank\ndoe2021");
}

#[test]
fn test_lookup_prints_template_variables() {
    // Given: a CSL-JSON export
    let refs = create_temp_file(TEST_REFS, ".json");

    // When: we look up an entry
    let output = run(&["--bib", refs.path().to_str().unwrap(), "lookup", "doe2021"]);

    // Then: its variables are printed as JSON, passthrough included
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let vars: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(vars["citekey"], "doe2021");
    assert_eq!(vars["authorString"], "John Doe");
    assert_eq!(vars["year"], "2021");
    assert_eq!(vars["publisher"], "Acme");
    assert_eq!(vars["zoteroSelectURI"], "zotero://select/items/@doe2021");
}

#[test]
fn test_lookup_biblatex_export() {
    let bib = create_temp_file(TEST_BIB, ".bib");

    let output = run(&[
        "--bib",
        bib.path().to_str().unwrap(),
        "--format",
        "biblatex",
        "lookup",
        "roe2019",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let vars: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(vars["title"], "Collected Essays");
    assert_eq!(vars["authorString"], "Richard Roe, Edgar Allan Poe");
}

#[test]
fn test_render_uses_settings_file_templates() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let config = create_temp_file(
        &format!(
            "citation-export-path = {:?}\ntitle-template = \"{{{{authorString}}}} - {{{{title}}}}\"\n",
            refs.path().to_str().unwrap()
        ),
        ".toml",
    );

    let output = run(&[
        "--config",
        config.path().to_str().unwrap(),
        "render",
        "title",
        "doe2021",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "John Doe - Test Book");
}

#[test]
fn test_render_default_citation_template() {
    let refs = create_temp_file(TEST_REFS, ".json");

    let output = run(&[
        "--bib",
        refs.path().to_str().unwrap(),
        "render",
        "citation",
        "doe2021",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "[@doe2021]");
}

#[test]
fn test_cite_inline_and_full() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let bib = refs.path().to_str().unwrap();

    let inline = run(&["--bib", bib, "cite", "doe2021"]);
    let full = run(&["--bib", bib, "cite", "doe2021", "--full"]);

    assert!(inline.status.success(), "stderr: {}", stderr(&inline));
    assert_eq!(stdout(&inline).trim(), "(Doe, 2021)");
    assert!(full.status.success(), "stderr: {}", stderr(&full));
    assert_eq!(stdout(&full).trim(), "Doe, J. (2021). Test Book.");
}

#[test]
fn test_extract_reports_resolution() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let md = create_temp_file("See [[@doe2021#p. 3]].\nAnd [@missing].\n", ".md");

    let output = run(&[
        "--bib",
        refs.path().to_str().unwrap(),
        "extract",
        md.path().to_str().unwrap(),
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let found: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["citekey"], "doe2021");
    assert_eq!(found[0]["locator"], "p. 3");
    assert_eq!(found[0]["resolved"], true);
    assert_eq!(found[0]["sourceLine"], "See [[@doe2021#p. 3]].");
    assert_eq!(found[1]["citekey"], "missing");
    assert_eq!(found[1]["line"], 2);
    assert_eq!(found[1]["resolved"], false);
}

#[test]
fn test_annotate_from_stdin() {
    // Given: Markdown on stdin
    let refs = create_temp_file(TEST_REFS, ".json");
    let mut child = Command::new(binary_path())
        .args(["--bib", refs.path().to_str().unwrap(), "annotate", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");

    {
        let stdin = child.stdin.as_mut().unwrap();
        stdin
            .write_all(b"Shown in [[@doe2021]], not in [[@nobody]].\n")
            .unwrap();
    }

    // When: the process finishes
    let output = child.wait_with_output().unwrap();

    // Then: resolved references are replaced, others kept
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "Shown in (Doe, 2021), not in [[@nobody]].\n"
    );
}

#[test]
fn test_annotate_output_file() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let md = create_temp_file("[@doe2021]", ".md");
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.md");

    let output = run(&[
        "--bib",
        refs.path().to_str().unwrap(),
        "annotate",
        md.path().to_str().unwrap(),
        "-o",
        out_path.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty(), "stdout should stay clean");
    assert!(stderr(&output).contains("wrote"));
    assert_eq!(fs::read_to_string(&out_path).unwrap(), "(Doe, 2021)");
}

// ============================================
// Tests for exit codes
// ============================================

#[test]
fn test_exit_code_10_input_file_not_found() {
    let refs = create_temp_file(TEST_REFS, ".json");

    let output = run(&[
        "--bib",
        refs.path().to_str().unwrap(),
        "extract",
        "/nonexistent/notes.md",
    ]);

    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("hint:"));
}

#[test]
fn test_exit_code_11_bib_file_not_found() {
    let output = run(&["--bib", "/nonexistent/library.json", "keys"]);

    assert_eq!(output.status.code(), Some(11));
    assert!(stderr(&output).contains("/nonexistent/library.json"));
}

#[test]
fn test_exit_code_11_no_bib_configured() {
    let output = run(&["keys"]);

    assert_eq!(output.status.code(), Some(11));
    assert!(stderr(&output).contains("--bib"));
}

#[test]
fn test_exit_code_11_wrong_format() {
    // A BibLaTeX file read as CSL-JSON is rejected, never sniffed.
    let bib = create_temp_file(TEST_BIB, ".bib");

    let output = run(&["--bib", bib.path().to_str().unwrap(), "keys"]);

    assert_eq!(output.status.code(), Some(11));
}

#[test]
fn test_exit_code_12_invalid_settings() {
    let config = create_temp_file("citation-export-format = \"ris\"\n", ".toml");

    let output = run(&["--config", config.path().to_str().unwrap(), "keys"]);

    assert_eq!(output.status.code(), Some(12));
}

#[test]
fn test_exit_code_13_reference_not_found() {
    let refs = create_temp_file(TEST_REFS, ".json");

    let output = run(&["--bib", refs.path().to_str().unwrap(), "lookup", "nobody"]);

    assert_eq!(output.status.code(), Some(13));
    let stderr = stderr(&output);
    assert!(stderr.contains("nobody"));
    assert!(stderr.contains("cite-index keys"));
}

#[test]
fn test_exit_code_15_output_dir_not_writable() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let md = create_temp_file("text", ".md");

    let output = run(&[
        "--bib",
        refs.path().to_str().unwrap(),
        "annotate",
        md.path().to_str().unwrap(),
        "-o",
        "/nonexistent/dir/out.md",
    ]);

    assert_eq!(output.status.code(), Some(15));
}

#[test]
fn test_exit_code_16_malformed_template() {
    let refs = create_temp_file(TEST_REFS, ".json");
    let config = create_temp_file(
        &format!(
            "citation-export-path = {:?}\ncontent-template = \"{{{{#if title}}}}unclosed\"\n",
            refs.path().to_str().unwrap()
        ),
        ".toml",
    );

    let output = run(&[
        "--config",
        config.path().to_str().unwrap(),
        "render",
        "content",
        "doe2021",
    ]);

    assert_eq!(output.status.code(), Some(16));
}

#[test]
fn test_exit_code_17_no_printed_form() {
    let refs = create_temp_file(TEST_REFS, ".json");

    let output = run(&["--bib", refs.path().to_str().unwrap(), "cite", "blank"]);

    assert_eq!(output.status.code(), Some(17));
    assert!(
        !stdout(&output).contains("CSL STYLE ERROR"),
        "the sentinel must never reach stdout"
    );
}
