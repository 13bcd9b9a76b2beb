//! Error types for Rexxkit
//!
//! Parsing has exactly one failure mode: a structural error that aborts the
//! whole parse with no partial command list. Everything else is either a
//! silent skip (lenient mode) or an expression fallback handled internally,
//! so the variants here are the complete set of errors a caller can see.
//! Every variant carries the 1-based source line of the offending statement.

use thiserror::Error;

/// Result type alias using Rexxkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural parse errors.
///
/// All messages are safe for display to end users; the parser never logs or
/// prints on its own, it only raises.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A heredoc delimiter was never found before end of input.
    #[error("unterminated heredoc {delimiter:?} starting at line {line}")]
    UnterminatedHeredoc { delimiter: String, line: usize },

    /// A `Heredoc` token did not immediately follow the line that introduced
    /// its delimiter.
    #[error("heredoc content at line {line} is not attached to any statement")]
    StrayHeredoc { line: usize },

    /// A heredoc marker appeared but no heredoc content token followed it.
    #[error("expected heredoc content after marker at line {line}")]
    MissingHeredoc { line: usize },

    /// A `DO` block reached end of input without a matching `END`.
    #[error("missing END for DO block starting at line {line}")]
    UnmatchedDo { line: usize },

    /// An `IF` block reached end of input without its terminator
    /// (`END` for the `THEN DO` shape, `ENDIF` for the plain `THEN` shape).
    #[error("missing {terminator} for IF block starting at line {line}")]
    UnmatchedIf { terminator: String, line: usize },

    /// A `SELECT` block reached end of input without a matching `END`.
    #[error("missing END for SELECT block starting at line {line}")]
    UnmatchedSelect { line: usize },

    /// A `RETRY_ON_STALE` block reached end of input without `END_RETRY`.
    #[error("missing END_RETRY for RETRY_ON_STALE block starting at line {line}")]
    UnmatchedRetry { line: usize },

    /// A line inside a `SELECT` body was neither `WHEN`, `OTHERWISE` nor `END`.
    #[error("unexpected line in SELECT at line {line}: {content}")]
    UnexpectedInSelect { content: String, line: usize },

    /// Unbalanced parentheses inside an expression or argument list.
    #[error("mismatched parentheses in expression at line {line}")]
    MismatchedParens { line: usize },

    /// `LET` without a variable name or without an assignment operator.
    #[error("malformed LET at line {line}: {message}")]
    MalformedLet { message: String, line: usize },

    /// Strict mode only: a line matched no statement shape.
    #[error("unrecognized statement at line {line}: {content}")]
    UnrecognizedStatement { content: String, line: usize },

    /// Block or expression nesting exceeded the configured maximum.
    #[error("nesting depth limit ({max}) exceeded at line {line}")]
    NestingTooDeep { max: usize, line: usize },
}

impl Error {
    /// The 1-based source line this error points at.
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedHeredoc { line, .. }
            | Self::StrayHeredoc { line }
            | Self::MissingHeredoc { line }
            | Self::UnmatchedDo { line }
            | Self::UnmatchedIf { line, .. }
            | Self::UnmatchedSelect { line }
            | Self::UnmatchedRetry { line }
            | Self::UnexpectedInSelect { line, .. }
            | Self::MismatchedParens { line }
            | Self::MalformedLet { line, .. }
            | Self::UnrecognizedStatement { line, .. }
            | Self::NestingTooDeep { line, .. } => *line,
        }
    }
}
