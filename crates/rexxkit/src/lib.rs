//! Rexxkit: a source-to-AST front end for a Rexx-dialect scripting language.
//!
//! The pipeline is two stages. The tokenizer turns raw script text into
//! logical line tokens plus heredoc body tokens, handling comment stripping
//! and CRLF normalization. The parser then recognizes one statement per
//! line token against a fixed-priority set of shapes, recursing into block
//! bodies for IF, DO, SELECT and RETRY_ON_STALE. The resulting tree
//! serializes to JSON via serde.
//!
//! The grammar is deliberately forgiving: text that fails expression
//! parsing degrades to a raw-string literal for the executor to resolve,
//! and unrecognized lines are dropped unless strict mode is on. Structural
//! problems (unterminated heredocs, unmatched block terminators, malformed
//! assignments, mismatched parentheses, nesting overflow) are errors.
//!
//! # Example
//!
//! ```
//! use rexxkit::{parse, Command};
//!
//! let program = parse("LET greeting = \"hello\"\nSAY greeting").unwrap();
//! assert_eq!(program.commands.len(), 2);
//! assert!(matches!(program.commands[0], Command::Assignment { .. }));
//! ```

mod error;
mod parser;

pub use error::{Error, Result};
pub use parser::ast::{
    AssignedValue, CallArgument, CallTarget, Command, Condition, Expression, LoopSpec, ParseSource,
    Program, WhenClause,
};
pub use parser::{Parser, ParserConfig, Token, tokenize};

/// Parse a script with the default configuration.
pub fn parse(source: &str) -> Result<Program> {
    Parser::new().parse(source)
}
