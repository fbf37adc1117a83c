//! Note templates.
//!
//! A small Handlebars-compatible subset used for note titles, note bodies
//! and inserted citations:
//!
//! - Variable interpolation: `{{title}}` or `{{{title}}}`
//! - Conditionals: `{{#if year}}...{{else}}...{{/if}}`, `{{#unless ...}}`
//! - Comments: `{{! note }}` and `{{!-- note --}}`
//!
//! Output is never escaped. Rendered text ends up inside Markdown, so
//! characters like `&`, `*` or `[` must come through untouched.
//! Unknown variables render as the empty string.

use std::fmt;

use thiserror::Error;

use crate::library::TemplateVariables;

/// Errors raised for malformed template strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Parse error at offset {offset}: {message}")]
    ParseError { offset: usize, message: String },

    #[error("Unsupported block helper '{name}' at offset {offset}")]
    UnsupportedHelper { name: String, offset: usize },
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// The four configurable templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TemplateKind {
    /// Literature note title.
    Title,
    /// Literature note body.
    Content,
    /// Primary Markdown citation.
    Citation,
    /// Alternative Markdown citation.
    AlternativeCitation,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::Title => "title",
            TemplateKind::Content => "content",
            TemplateKind::Citation => "citation",
            TemplateKind::AlternativeCitation => "alternative-citation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Variable(String),
    Conditional {
        variable: String,
        negated: bool,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Compiles a template string.
    pub fn compile(source: &str) -> TemplateResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let (nodes, _) = parser.parse_block(None)?;
        Ok(Self { nodes })
    }

    /// Renders the template with the given variables.
    pub fn render(&self, variables: &TemplateVariables) -> String {
        let mut output = String::new();
        render_nodes(&self.nodes, variables, &mut output);
        output
    }
}

fn render_nodes(nodes: &[Node], variables: &TemplateVariables, output: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Variable(name) => {
                if let Some(value) = variables.get(name) {
                    output.push_str(value);
                }
            }
            Node::Conditional {
                variable,
                negated,
                then_branch,
                else_branch,
            } => {
                let truthy = variables.get(variable).is_some_and(|v| !v.is_empty());
                let branch = if truthy != *negated {
                    then_branch
                } else {
                    else_branch
                };
                render_nodes(branch, variables, output);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Tag { body: &'a str, offset: usize, raw: bool },
}

fn tokenize(source: &str) -> TemplateResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            tokens.push(Token::Text(&rest[..start]));
        }
        let offset = source.len() - rest.len() + start;
        let tag = &rest[start..];

        let (open, close) = if tag.starts_with("{{{") {
            ("{{{", "}}}")
        } else if tag.starts_with("{{!--") {
            ("{{!--", "--}}")
        } else {
            ("{{", "}}")
        };

        let body_start = start + open.len();
        let Some(len) = rest[body_start..].find(close) else {
            return Err(TemplateError::ParseError {
                offset,
                message: format!("unclosed tag, expected '{}'", close),
            });
        };
        let body = &rest[body_start..body_start + len];
        rest = &rest[body_start + len + close.len()..];

        let is_comment = open == "{{!--" || (open == "{{" && body.starts_with('!'));
        if !is_comment {
            tokens.push(Token::Tag {
                body,
                offset,
                raw: open == "{{{",
            });
        }
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct OpenBlock<'a> {
    helper: &'a str,
    offset: usize,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Parses nodes until the end of input or the close of `open`.
    ///
    /// Returns the main branch and, for blocks, the `{{else}}` branch.
    fn parse_block(
        &mut self,
        open: Option<OpenBlock<'a>>,
    ) -> TemplateResult<(Vec<Node>, Vec<Node>)> {
        let mut then_branch = Vec::new();
        let mut else_branch = Vec::new();
        let mut in_else = false;

        while self.pos < self.tokens.len() {
            let (body, offset, raw) = match self.tokens[self.pos] {
                Token::Text(text) => {
                    self.pos += 1;
                    let target = if in_else { &mut else_branch } else { &mut then_branch };
                    target.push(Node::Text(text.to_string()));
                    continue;
                }
                Token::Tag { body, offset, raw } => (body.trim(), offset, raw),
            };
            self.pos += 1;

            let node = if raw {
                Node::Variable(variable_name(body, offset)?)
            } else if let Some(block) = body.strip_prefix('#') {
                self.parse_conditional(block, offset)?
            } else if body == "else" {
                if open.is_none() || in_else {
                    return Err(TemplateError::ParseError {
                        offset,
                        message: "unexpected {{else}}".to_string(),
                    });
                }
                in_else = true;
                continue;
            } else if let Some(closing) = body.strip_prefix('/') {
                let closing = closing.trim();
                return match &open {
                    Some(block) if block.helper == closing => Ok((then_branch, else_branch)),
                    Some(block) => Err(TemplateError::ParseError {
                        offset,
                        message: format!(
                            "expected {{{{/{}}}}} but found {{{{/{}}}}}",
                            block.helper, closing
                        ),
                    }),
                    None => Err(TemplateError::ParseError {
                        offset,
                        message: format!("unexpected {{{{/{}}}}}", closing),
                    }),
                };
            } else {
                Node::Variable(variable_name(body, offset)?)
            };

            let target = if in_else { &mut else_branch } else { &mut then_branch };
            target.push(node);
        }

        match open {
            Some(block) => Err(TemplateError::ParseError {
                offset: block.offset,
                message: format!("unclosed {{{{#{}}}}} block", block.helper),
            }),
            None => Ok((then_branch, else_branch)),
        }
    }

    fn parse_conditional(&mut self, block: &'a str, offset: usize) -> TemplateResult<Node> {
        let mut words = block.split_whitespace();
        let helper = words.next().unwrap_or_default();
        let negated = match helper {
            "if" => false,
            "unless" => true,
            _ => {
                return Err(TemplateError::UnsupportedHelper {
                    name: helper.to_string(),
                    offset,
                })
            }
        };

        let variable = match (words.next(), words.next()) {
            (Some(name), None) => variable_name(name, offset)?,
            _ => {
                return Err(TemplateError::ParseError {
                    offset,
                    message: format!("{{{{#{}}}}} takes exactly one variable", helper),
                })
            }
        };

        let (then_branch, else_branch) = self.parse_block(Some(OpenBlock { helper, offset }))?;
        Ok(Node::Conditional {
            variable,
            negated,
            then_branch,
            else_branch,
        })
    }
}

fn variable_name(body: &str, offset: usize) -> TemplateResult<String> {
    let name = body.trim();
    let valid = !name.is_empty()
        && !name.starts_with(['>', '&', '^', '#', '/'])
        && !name.contains(|c: char| c.is_whitespace() || c == '{' || c == '}');
    if valid {
        Ok(name.to_string())
    } else {
        Err(TemplateError::ParseError {
            offset,
            message: format!("invalid variable name '{}'", name),
        })
    }
}
