//! Tokenizer for the Rexx dialect
//!
//! Splits raw script text into logical `Line` tokens and delimiter-bound
//! `Heredoc` tokens, preserving 1-based source line numbers. Comment
//! stripping happens here; heredoc bodies are taken from the raw lines
//! verbatim, untouched by comment handling.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// A logical token produced by the tokenizer. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// One comment-stripped, trimmed source line.
    Line { content: String, source_line: usize },

    /// The body of a heredoc (`<<NAME` ... `NAME`), lines joined by `\n`.
    /// Always emitted immediately after the `Line` token whose content
    /// introduced the delimiter.
    Heredoc {
        content: String,
        delimiter: String,
        source_line: usize,
    },
}

impl Token {
    pub fn source_line(&self) -> usize {
        match self {
            Self::Line { source_line, .. } | Self::Heredoc { source_line, .. } => *source_line,
        }
    }

    /// Line content, or empty for heredoc tokens.
    pub fn content(&self) -> &str {
        match self {
            Self::Line { content, .. } => content,
            Self::Heredoc { .. } => "",
        }
    }
}

static HEREDOC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Tokenize a complete script. CRLF is normalized to LF first; the tokenizer
/// is a pure function of its input and keeps no state across calls.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let normalized = source.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let source_line = i + 1;
        let trimmed = lines[i].trim();
        i += 1;

        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        let stripped = strip_block_comments(trimmed);
        let stripped = stripped.trim();
        if stripped.is_empty() {
            continue;
        }
        // A line that opens a block comment without closing it is skipped
        // whole; comment state is not tracked across lines.
        if stripped.starts_with("/*") {
            continue;
        }

        if let Some(caps) = HEREDOC_MARKER.captures(stripped) {
            let marker = caps.get(0).expect("match");
            let delimiter = caps[1].to_string();
            let before = &stripped[..marker.start()];
            let after = &stripped[marker.end()..];

            // The statement text keeps the marker so the statement parser
            // can see which delimiter it introduces.
            tokens.push(Token::Line {
                content: format!("{}{}", before, marker.as_str()).trim().to_string(),
                source_line,
            });

            // Scan raw lines verbatim until one trim-equals the delimiter.
            let mut body: Vec<&str> = Vec::new();
            let mut closed = false;
            while i < lines.len() {
                let candidate = lines[i];
                i += 1;
                if candidate.trim() == delimiter {
                    closed = true;
                    break;
                }
                body.push(candidate);
            }
            if !closed {
                return Err(Error::UnterminatedHeredoc {
                    delimiter,
                    line: source_line,
                });
            }
            tokens.push(Token::Heredoc {
                content: body.join("\n"),
                delimiter,
                source_line,
            });

            // Content after the marker on the starting line becomes a
            // follow-on line token.
            let tail = after.trim();
            if !tail.is_empty() {
                tokens.push(Token::Line {
                    content: tail.to_string(),
                    source_line,
                });
            }
            continue;
        }

        tokens.push(Token::Line {
            content: stripped.to_string(),
            source_line,
        });
    }

    Ok(tokens)
}

/// Remove `/* ... */` spans that open and close on the same line.
fn strip_block_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        match rest.find("/*") {
            Some(open) => match rest[open..].find("*/") {
                Some(close_rel) => {
                    out.push_str(&rest[..open]);
                    rest = &rest[open + close_rel + 2..];
                }
                None => {
                    out.push_str(rest);
                    break;
                }
            },
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.content().to_string()).collect()
    }

    #[test]
    fn test_basic_lines_with_numbers() {
        let tokens = tokenize("SAY \"a\"\n\nSAY \"b\"").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].source_line(), 1);
        assert_eq!(tokens[1].source_line(), 3);
    }

    #[test]
    fn test_crlf_normalized() {
        let tokens = tokenize("SAY \"a\"\r\nSAY \"b\"\r\n").unwrap();
        assert_eq!(contents(&tokens), vec!["SAY \"a\"", "SAY \"b\""]);
    }

    #[test]
    fn test_line_comments_skipped() {
        let tokens = tokenize("-- header\nSAY \"x\"\n   -- trailing full line").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].content(), "SAY \"x\"");
    }

    #[test]
    fn test_block_comment_stripped_in_place() {
        let tokens = tokenize("SAY /* note */ \"x\"").unwrap();
        assert_eq!(tokens[0].content(), "SAY  \"x\"");
    }

    #[test]
    fn test_line_that_is_only_a_block_comment() {
        let tokens = tokenize("/* all comment */\nSAY \"x\"").unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_standalone_block_comment_opener_skipped() {
        let tokens = tokenize("/* opens here\nSAY \"x\"").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].content(), "SAY \"x\"");
    }

    #[test]
    fn test_heredoc_tokens() {
        let tokens = tokenize("LET x = <<EOF\nline one\nline two\nEOF\nSAY x").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].content(), "LET x = <<EOF");
        match &tokens[1] {
            Token::Heredoc {
                content,
                delimiter,
                source_line,
            } => {
                assert_eq!(content, "line one\nline two");
                assert_eq!(delimiter, "EOF");
                assert_eq!(*source_line, 1);
            }
            other => panic!("expected heredoc token, got {other:?}"),
        }
        assert_eq!(tokens[2].content(), "SAY x");
    }

    #[test]
    fn test_heredoc_body_is_verbatim() {
        // Comment markers inside a heredoc body must survive untouched.
        let tokens = tokenize("LET x = <<END\n-- not a comment\n/* kept */\nEND").unwrap();
        match &tokens[1] {
            Token::Heredoc { content, .. } => {
                assert_eq!(content, "-- not a comment\n/* kept */");
            }
            other => panic!("expected heredoc token, got {other:?}"),
        }
    }

    #[test]
    fn test_heredoc_trailing_content_becomes_follow_on_line() {
        let tokens = tokenize("LET x = <<EOF SAY \"after\"\nbody\nEOF").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].content(), "LET x = <<EOF");
        assert!(matches!(tokens[1], Token::Heredoc { .. }));
        assert_eq!(tokens[2].content(), "SAY \"after\"");
    }

    #[test]
    fn test_unterminated_heredoc_is_fatal() {
        let err = tokenize("LET x = <<EOF\nno close").unwrap_err();
        assert_eq!(
            err,
            Error::UnterminatedHeredoc {
                delimiter: "EOF".to_string(),
                line: 1
            }
        );
    }

    #[test]
    fn test_heredoc_delimiter_match_is_trimmed() {
        let tokens = tokenize("LET x = <<EOF\nbody\n   EOF   ").unwrap();
        assert_eq!(tokens.len(), 2);
    }
}
