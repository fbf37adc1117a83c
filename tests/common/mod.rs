//! Shared test constants and helpers for integration tests.

#![allow(dead_code)]

/// A small BibLaTeX export: three entries, one string macro, one comment.
pub const BIBLATEX_SAMPLE: &str = r#"
% Exported by Better BibTeX
@string{nat = "Nature"}

@article{doe2021,
  author = {Doe, Jane and Smith, Alan},
  title = {{A Study} of Things},
  journaltitle = nat,
  date = {2021-03-04},
  doi = {10.1000/xyz},
}

@book{roe2019,
  author = {Richard Roe},
  title = {Collected Essays},
  year = {2019},
}

@online{who2020,
  author = {{World Health Organization}},
  title = {Report},
  year = 2020,
}
"#;

/// Build a JSON array of test references from a list of IDs.
///
/// Each reference gets an auto-generated author (`AuthorX` where X is the last
/// char of the ID) and a title (`Title {id}`), all dated 2020.
pub fn build_refs(ids: &[&str]) -> String {
    let refs: Vec<String> = ids
        .iter()
        .map(|id| {
            format!(
                r#"{{"id": "{}", "type": "article-journal", "author": [{{"family": "Author{}", "given": "A."}}], "title": "Title {}", "issued": {{"date-parts": [[2020]]}}}}"#,
                id,
                id.chars().last().unwrap_or('X'),
                id
            )
        })
        .collect();
    format!("[{}]", refs.join(", "))
}
