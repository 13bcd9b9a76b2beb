//! Parser module for Rexxkit
//!
//! Implements the statement dispatcher and the block parsers. A statement is
//! recognized by trying shape matchers in a fixed priority order inherited
//! from the legacy grammar; the ordering is load-bearing and must not be
//! rearranged. Block statements (IF, DO, SELECT, RETRY_ON_STALE) recurse
//! through the same dispatcher for their bodies, so inner terminators are
//! always consumed before an outer scan can see them.

pub mod ast;

mod args;
mod condition;
mod expr;
mod tokenizer;

pub use tokenizer::{Token, tokenize};

use crate::error::{Error, Result};
use ast::{
    AssignedValue, CallTarget, Command, Expression, LoopSpec, ParseSource, Program, WhenClause,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Parser configuration.
///
/// `strict` turns the legacy silent-drop of unrecognized lines into an
/// error; `max_depth` bounds block and expression nesting so hostile input
/// raises a structural error instead of exhausting the call stack.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub strict: bool,
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: 100,
        }
    }
}

impl ParserConfig {
    /// Create a new configuration with defaults (lenient, depth 100).
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an error on unrecognized statement lines instead of dropping
    /// them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the maximum block/expression nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Parser for Rexx-dialect scripts.
///
/// Holds only configuration: a parse call keeps no state across invocations
/// and is safe to run concurrently on independent inputs.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

// ── statement-shape matchers (fixed priority order, see dispatcher) ─────

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):$").unwrap());
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)ADDRESS\b(.*)$").unwrap());
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)NUMERIC\s+(DIGITS|FUZZ|FORM)\b(.*)$").unwrap());
static ARG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)ARG\s+(.+)$").unwrap());
static PARSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)PARSE\s+(.+)$").unwrap());
static PARSE_ARG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)ARG\s+(.+)$").unwrap());
static PARSE_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)VALUE\s+(.+?)\s+WITH\s+(.+)$").unwrap());
static PARSE_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)VAR\s+([A-Za-z_][A-Za-z0-9_.]*)\s+WITH\s+(.+)$").unwrap());
static PUSH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)PUSH\s+(.+)$").unwrap());
static PULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)PULL\s+([A-Za-z_][A-Za-z0-9_.]*)$").unwrap());
static QUEUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)QUEUE\s+(.+)$").unwrap());
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)CALL\s+(.+)$").unwrap());
static CALL_VAR_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([A-Za-z_][A-Za-z0-9_.]*)\)$").unwrap());
static CALL_NAME_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap());
static RETURN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)RETURN\b(.*)$").unwrap());
static TRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)TRACE\s+(\S+)$").unwrap());
static RETRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)RETRY_ON_STALE\b(.*)$").unwrap());
static END_RETRY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)END_RETRY$").unwrap());
static SIGNAL_ON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)SIGNAL\s+ON\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+NAME\s+([A-Za-z_][A-Za-z0-9_]*))?$")
        .unwrap()
});
static SIGNAL_OFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)SIGNAL\s+OFF\s+([A-Za-z_][A-Za-z0-9_]*)$").unwrap());
static SIGNAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)SIGNAL\s+([A-Za-z_][A-Za-z0-9_]*)$").unwrap());
static LET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)LET\b(.*)$").unwrap());
static ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)\s*=\s*(.*)$").unwrap());
static IF_THEN_DO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)IF\s+(.+)\s+THEN\s+DO$").unwrap());
static IF_THEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)IF\s+(.+)\s+THEN$").unwrap());
static ELSE_DO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)ELSE\s+DO$").unwrap());
static DO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)DO\b(.*)$").unwrap());
static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)SELECT$").unwrap());
static WHEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)WHEN\s+(.+)\s+THEN$").unwrap());
static INTERPRET_ISOLATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i)INTERPRET\s+(.+?)\s+WITH\s+ISOLATED(?:\s+IMPORT\s*\(([^)]*)\))?(?:\s+EXPORT\s*\(([^)]*)\))?$",
    )
    .unwrap()
});
static INTERPRET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)INTERPRET\s+(.+)$").unwrap());
static NO_INTERPRET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)NO[-_]INTERPRET$").unwrap());
static EXIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)EXIT\b(.*)$").unwrap());
static SAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)SAY\b(.*)$").unwrap());
static HEREDOC_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<<([A-Za-z_][A-Za-z0-9_]*)$").unwrap());
static BARE_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)(\(.*\))$").unwrap());

/// Loop-specification shapes.
static FOREVER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)FOREVER$").unwrap());
static WHILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)WHILE\s+(.+)$").unwrap());
static RANGE_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s+TO\s+(.+?)\s+BY\s+(.+)$").unwrap()
});
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s+TO\s+(.+)$").unwrap()
});
static OVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)([A-Za-z_][A-Za-z0-9_]*)\s+OVER\s+(.+)$").unwrap());

impl Parser {
    /// Create a parser with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with the given configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a complete script into its command tree.
    pub fn parse(&self, source: &str) -> Result<Program> {
        let tokens = tokenize(source)?;
        debug!(tokens = tokens.len(), "tokenized script");

        let mut commands = Vec::new();
        let mut idx = 0;
        while idx < tokens.len() {
            let (command, next) = self.parse_statement(&tokens, idx, 0)?;
            debug_assert!(next > idx, "statement parse must consume tokens");
            if let Some(command) = command {
                commands.push(command);
            }
            idx = next;
        }
        Ok(Program { commands })
    }

    /// Parse one statement starting at `idx`. Returns the command (or `None`
    /// for a silently dropped line) and the index of the next unconsumed
    /// token, which is always greater than `idx`.
    fn parse_statement(
        &self,
        tokens: &[Token],
        idx: usize,
        depth: usize,
    ) -> Result<(Option<Command>, usize)> {
        let (content, line) = match &tokens[idx] {
            Token::Line {
                content,
                source_line,
            } => (content.as_str(), *source_line),
            Token::Heredoc { source_line, .. } => {
                return Err(Error::StrayHeredoc { line: *source_line });
            }
        };
        if depth > self.config.max_depth {
            return Err(Error::NestingTooDeep {
                max: self.config.max_depth,
                line,
            });
        }

        let one = |command: Command| Ok((Some(command), idx + 1));

        if let Some(caps) = LABEL_RE.captures(content) {
            return one(Command::Label {
                name: caps[1].to_string(),
                source_line: line,
            });
        }

        if let Some(caps) = ADDRESS_RE.captures(content) {
            if let Some(command) = self.match_address(caps[1].trim(), line) {
                return one(command);
            }
        }

        if let Some(caps) = NUMERIC_RE.captures(content) {
            let setting = caps[1].to_ascii_uppercase();
            let rest = caps[2].trim();
            let value = if rest.is_empty() {
                None
            } else {
                Some(self.value_expression(rest, line)?)
            };
            return one(Command::Numeric {
                setting,
                value,
                source_line: line,
            });
        }

        if let Some(caps) = ARG_RE.captures(content) {
            return one(Command::Parse {
                source: ParseSource::Arg,
                variables: split_variable_list(&caps[1]),
                source_line: line,
            });
        }

        if let Some(caps) = PARSE_RE.captures(content) {
            if let Some(command) = self.match_parse(caps[1].trim(), line)? {
                return one(command);
            }
        }

        if let Some(caps) = PUSH_RE.captures(content) {
            return one(Command::Push {
                value: self.value_expression(&caps[1], line)?,
                source_line: line,
            });
        }

        if let Some(caps) = PULL_RE.captures(content) {
            return one(Command::Pull {
                variable: caps[1].to_string(),
                source_line: line,
            });
        }

        if let Some(caps) = QUEUE_RE.captures(content) {
            return one(Command::Queue {
                value: self.value_expression(&caps[1], line)?,
                source_line: line,
            });
        }

        if let Some(caps) = CALL_RE.captures(content) {
            if let Some(command) = self.match_call(caps[1].trim(), line)? {
                return one(command);
            }
        }

        if let Some(caps) = RETURN_RE.captures(content) {
            let rest = caps[1].trim();
            let value = if rest.is_empty() {
                None
            } else {
                Some(self.value_expression(rest, line)?)
            };
            return one(Command::Return {
                value,
                source_line: line,
            });
        }

        if let Some(caps) = TRACE_RE.captures(content) {
            return one(Command::Trace {
                setting: caps[1].to_ascii_uppercase(),
                source_line: line,
            });
        }

        if let Some(caps) = RETRY_RE.captures(content) {
            return self.parse_retry_block(tokens, idx, depth, caps[1].trim(), line);
        }

        if let Some(caps) = SIGNAL_ON_RE.captures(content) {
            return one(Command::SignalOn {
                condition: caps[1].to_ascii_uppercase(),
                handler: caps.get(2).map(|m| m.as_str().to_string()),
                source_line: line,
            });
        }
        if let Some(caps) = SIGNAL_OFF_RE.captures(content) {
            return one(Command::SignalOff {
                condition: caps[1].to_ascii_uppercase(),
                source_line: line,
            });
        }
        if let Some(caps) = SIGNAL_RE.captures(content) {
            return one(Command::Signal {
                target: caps[1].to_string(),
                source_line: line,
            });
        }

        if let Some(caps) = LET_RE.captures(content) {
            return self.parse_let(tokens, idx, caps[1].trim(), line);
        }

        if IF_THEN_DO_RE.is_match(content) || IF_THEN_RE.is_match(content) {
            return self.parse_if_block(tokens, idx, depth, content, line);
        }

        if let Some(caps) = DO_RE.captures(content) {
            return self.parse_do_block(tokens, idx, depth, caps[1].trim(), line);
        }

        if SELECT_RE.is_match(content) {
            return self.parse_select_block(tokens, idx, depth, line);
        }

        if let Some(caps) = INTERPRET_ISOLATED_RE.captures(content) {
            let expression = self.value_expression(&caps[1], line)?;
            let imports = caps
                .get(2)
                .map(|m| split_variable_list(m.as_str()))
                .unwrap_or_default();
            let exports = caps
                .get(3)
                .map(|m| split_variable_list(m.as_str()))
                .unwrap_or_default();
            return one(Command::Interpret {
                expression,
                isolated: true,
                imports,
                exports,
                source_line: line,
            });
        }

        if let Some(caps) = INTERPRET_RE.captures(content) {
            return one(Command::Interpret {
                expression: self.value_expression(&caps[1], line)?,
                isolated: false,
                imports: Vec::new(),
                exports: Vec::new(),
                source_line: line,
            });
        }

        if NO_INTERPRET_RE.is_match(content) {
            return one(Command::NoInterpret { source_line: line });
        }

        if let Some(caps) = EXIT_RE.captures(content) {
            let rest = caps[1].trim();
            let value = if rest.is_empty() {
                None
            } else {
                Some(self.value_expression(rest, line)?)
            };
            return one(Command::Exit {
                value,
                source_line: line,
            });
        }

        if let Some(caps) = SAY_RE.captures(content) {
            let rest = caps[1].trim();
            let value = if rest.is_empty() {
                Expression::literal("")
            } else {
                self.value_expression(rest, line)?
            };
            return one(Command::Say {
                value,
                source_line: line,
            });
        }

        if let Some(caps) = HEREDOC_REF_RE.captures(content) {
            let (body, delimiter, consumed) = self.take_heredoc(tokens, idx, &caps[1], line)?;
            return Ok((
                Some(Command::HeredocString {
                    content: body,
                    delimiter,
                    source_line: line,
                }),
                consumed,
            ));
        }

        if let Some(inner) = args::unquote(content) {
            return one(Command::QuotedString {
                value: inner.to_string(),
                interpolated: expr::has_interpolation_markers(inner),
                source_line: line,
            });
        }

        if let Some(caps) = ASSIGN_RE.captures(content) {
            let rhs = caps[2].trim();
            // `a == b` is a comparison, never an assignment.
            if !rhs.starts_with('=') {
                return self.parse_assignment(tokens, idx, &caps[1], rhs, line);
            }
        }

        if let Some(caps) = BARE_CALL_RE.captures(content) {
            let arguments = args::parse_call_arguments(&caps[2], line, self.config.max_depth)?;
            return one(Command::FunctionCall {
                name: caps[1].to_string(),
                arguments,
                source_line: line,
            });
        }

        if self.config.strict {
            return Err(Error::UnrecognizedStatement {
                content: content.to_string(),
                line,
            });
        }
        debug!(line, content, "dropping unrecognized line");
        Ok((None, idx + 1))
    }

    // ── simple statement helpers ────────────────────────────────────────

    fn match_address(&self, rest: &str, line: usize) -> Option<Command> {
        if rest.is_empty() {
            return Some(Command::AddressReset { source_line: line });
        }
        let (target, remainder) = split_first_word(rest);
        let remainder = remainder.trim();
        if remainder.is_empty() {
            return Some(Command::AddressTarget {
                target: target.to_string(),
                source_line: line,
            });
        }
        if let Some(pattern_src) = strip_keyword(remainder, "MATCHING") {
            let pattern = args::unquote(pattern_src.trim())?;
            return Some(Command::AddressMatching {
                target: target.to_string(),
                pattern: pattern.to_string(),
                source_line: line,
            });
        }
        if let Some(pattern_src) = strip_keyword(remainder, "LINES") {
            let pattern = args::unquote(pattern_src.trim())?;
            return Some(Command::AddressLines {
                target: target.to_string(),
                pattern: pattern.to_string(),
                source_line: line,
            });
        }
        let command = args::unquote(remainder)?;
        Some(Command::AddressInline {
            target: target.to_string(),
            command: command.to_string(),
            source_line: line,
        })
    }

    fn match_parse(&self, rest: &str, line: usize) -> Result<Option<Command>> {
        if let Some(caps) = PARSE_ARG_RE.captures(rest) {
            return Ok(Some(Command::Parse {
                source: ParseSource::Arg,
                variables: split_variable_list(&caps[1]),
                source_line: line,
            }));
        }
        if let Some(caps) = PARSE_VALUE_RE.captures(rest) {
            return Ok(Some(Command::Parse {
                source: ParseSource::Value(self.value_expression(&caps[1], line)?),
                variables: split_variable_list(&caps[2]),
                source_line: line,
            }));
        }
        if let Some(caps) = PARSE_VAR_RE.captures(rest) {
            return Ok(Some(Command::Parse {
                source: ParseSource::Var(caps[1].to_string()),
                variables: split_variable_list(&caps[2]),
                source_line: line,
            }));
        }
        Ok(None)
    }

    fn match_call(&self, rest: &str, line: usize) -> Result<Option<Command>> {
        let (target_src, args_src) = split_first_word(rest);
        let target = if let Some(caps) = CALL_VAR_TARGET_RE.captures(target_src) {
            CallTarget::Variable(caps[1].to_string())
        } else if CALL_NAME_TARGET_RE.is_match(target_src) {
            CallTarget::Name(target_src.to_string())
        } else {
            return Ok(None);
        };

        let args_src = args_src.trim();
        let mut arguments = Vec::new();
        if !args_src.is_empty() {
            // Comma-separated when a top-level comma exists, space-separated
            // otherwise.
            let segments = if args::has_top_level_comma(args_src) {
                args::split_top_level(args_src, ',')
            } else {
                args::split_top_level_whitespace(args_src)
            };
            for segment in segments {
                let segment = segment.trim();
                if segment.is_empty() {
                    continue;
                }
                arguments.push(args::classify_value(segment, line, self.config.max_depth)?);
            }
        }
        Ok(Some(Command::Call {
            target,
            arguments,
            source_line: line,
        }))
    }

    /// Classify the value text of a simple statement (SAY, PUSH, QUEUE, ...):
    /// quoted string, full expression, or raw-literal fallback.
    fn value_expression(&self, text: &str, line: usize) -> Result<Expression> {
        let text = text.trim();
        if let Some(inner) = args::unquote(text) {
            if expr::has_interpolation_markers(inner) {
                return Ok(Expression::InterpolatedString {
                    template: inner.to_string(),
                });
            }
            return Ok(Expression::Literal {
                value: inner.to_string(),
            });
        }
        match expr::parse_expression(text, line, self.config.max_depth)? {
            Some(expression) => Ok(expression),
            None => Ok(Expression::Literal {
                value: text.to_string(),
            }),
        }
    }

    // ── assignments ─────────────────────────────────────────────────────

    fn parse_let(
        &self,
        tokens: &[Token],
        idx: usize,
        rest: &str,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        let Some(caps) = ASSIGN_RE.captures(rest) else {
            let message = if rest.is_empty() || rest.starts_with('=') {
                "missing variable name".to_string()
            } else {
                "missing assignment operator".to_string()
            };
            return Err(Error::MalformedLet { message, line });
        };
        let variable = caps[1].to_string();
        let rhs = caps[2].trim();
        self.parse_assignment(tokens, idx, &variable, rhs, line)
    }

    /// The assignment right-hand-side cascade. Tiers are tried in order;
    /// each one only runs when every earlier tier failed to match.
    fn parse_assignment(
        &self,
        tokens: &[Token],
        idx: usize,
        variable: &str,
        rhs: &str,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        let assignment = |value: AssignedValue, consumed: usize| {
            Ok((
                Some(Command::Assignment {
                    variable: variable.to_string(),
                    value,
                    source_line: line,
                }),
                consumed,
            ))
        };

        // Tier 1: heredoc marker (needs token lookahead, checked first).
        if let Some(caps) = HEREDOC_REF_RE.captures(rhs) {
            let (body, delimiter, consumed) = self.take_heredoc(tokens, idx, &caps[1], line)?;
            return assignment(
                AssignedValue::Expression(Expression::HeredocString {
                    content: body,
                    delimiter,
                }),
                consumed,
            );
        }

        // Tier 2: CALL-shaped right-hand side wraps a Call command.
        if let Some(caps) = CALL_RE.captures(rhs) {
            if let Some(call) = self.match_call(caps[1].trim(), line)? {
                return assignment(AssignedValue::Call(Box::new(call)), idx + 1);
            }
        }

        // Tier 3: concatenation operator, detected before arithmetic since
        // `||` is not a valid arithmetic token.
        if contains_top_level_concat(rhs) {
            if let Some(expression) = expr::parse_expression(rhs, line, self.config.max_depth)? {
                return assignment(AssignedValue::Expression(expression), idx + 1);
            }
        }

        // Tier 4: fully-quoted string, tagged interpolated when it carries
        // `{name}` or `{}` markers.
        if let Some(inner) = args::unquote(rhs) {
            let expression = if expr::has_interpolation_markers(inner) {
                Expression::InterpolatedString {
                    template: inner.to_string(),
                }
            } else {
                Expression::Literal {
                    value: inner.to_string(),
                }
            };
            return assignment(AssignedValue::Expression(expression), idx + 1);
        }

        // Tier 5: brace-delimited well-formed structured data stays an
        // opaque literal, not a block.
        if rhs.starts_with('{') && serde_json::from_str::<serde_json::Value>(rhs).is_ok() {
            return assignment(
                AssignedValue::Expression(Expression::Literal {
                    value: rhs.to_string(),
                }),
                idx + 1,
            );
        }

        // Tier 6 (and the tier-7 bare-identifier heuristic inside the
        // expression entry): arithmetic/concatenation parse attempt.
        if let Some(expression) = expr::parse_expression(rhs, line, self.config.max_depth)? {
            return assignment(AssignedValue::Expression(expression), idx + 1);
        }

        // Tier 8: raw-string literal fallback.
        assignment(
            AssignedValue::Expression(Expression::Literal {
                value: rhs.to_string(),
            }),
            idx + 1,
        )
    }

    /// Consume the heredoc token that must immediately follow `idx`.
    /// Returns the body, the delimiter and the next unconsumed index.
    fn take_heredoc(
        &self,
        tokens: &[Token],
        idx: usize,
        delimiter: &str,
        line: usize,
    ) -> Result<(String, String, usize)> {
        match tokens.get(idx + 1) {
            Some(Token::Heredoc {
                content,
                delimiter: found,
                ..
            }) if found == delimiter => Ok((content.clone(), found.clone(), idx + 2)),
            _ => Err(Error::MissingHeredoc { line }),
        }
    }

    // ── block parsers ───────────────────────────────────────────────────

    /// Consume statements until `stop` matches a line at this nesting level.
    /// Returns the body and the index of the stop token (not consumed).
    /// Nested blocks consume their own terminators before returning, so the
    /// scan never mistakes an inner terminator for its own.
    fn parse_body_until(
        &self,
        tokens: &[Token],
        start: usize,
        depth: usize,
        stop: impl Fn(&str) -> bool,
        missing: Error,
    ) -> Result<(Vec<Command>, usize)> {
        let mut commands = Vec::new();
        let mut idx = start;
        loop {
            let Some(token) = tokens.get(idx) else {
                return Err(missing);
            };
            if let Token::Line { content, .. } = token {
                if stop(content) {
                    return Ok((commands, idx));
                }
            }
            let (command, next) = self.parse_statement(tokens, idx, depth)?;
            if let Some(command) = command {
                commands.push(command);
            }
            idx = next;
        }
    }

    fn parse_if_block(
        &self,
        tokens: &[Token],
        idx: usize,
        depth: usize,
        content: &str,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        trace!(line, "parsing IF block");

        // Shape A: IF cond THEN DO ... END [ELSE DO ... END]
        if let Some(caps) = IF_THEN_DO_RE.captures(content) {
            let cond = condition::parse_condition(&caps[1]);
            let (then_commands, end_idx) = self.parse_body_until(
                tokens,
                idx + 1,
                depth + 1,
                |l| l.eq_ignore_ascii_case("END"),
                Error::UnmatchedIf {
                    terminator: "END".to_string(),
                    line,
                },
            )?;
            let mut next = end_idx + 1;
            let mut else_commands = Vec::new();
            if let Some(Token::Line { content, .. }) = tokens.get(next) {
                if ELSE_DO_RE.is_match(content) {
                    let (body, else_end) = self.parse_body_until(
                        tokens,
                        next + 1,
                        depth + 1,
                        |l| l.eq_ignore_ascii_case("END"),
                        Error::UnmatchedIf {
                            terminator: "END".to_string(),
                            line,
                        },
                    )?;
                    else_commands = body;
                    next = else_end + 1;
                }
            }
            return Ok((
                Some(Command::If {
                    condition: cond,
                    then_commands,
                    else_commands,
                    source_line: line,
                }),
                next,
            ));
        }

        // Shape B: IF cond THEN ... [ELSE ...] ENDIF
        let caps = IF_THEN_RE
            .captures(content)
            .expect("caller checked the IF shape");
        let cond = condition::parse_condition(&caps[1]);
        let (then_commands, stop_idx) = self.parse_body_until(
            tokens,
            idx + 1,
            depth + 1,
            |l| l.eq_ignore_ascii_case("ELSE") || l.eq_ignore_ascii_case("ENDIF"),
            Error::UnmatchedIf {
                terminator: "ENDIF".to_string(),
                line,
            },
        )?;
        let mut else_commands = Vec::new();
        let next = if tokens[stop_idx].content().eq_ignore_ascii_case("ELSE") {
            let (body, endif_idx) = self.parse_body_until(
                tokens,
                stop_idx + 1,
                depth + 1,
                |l| l.eq_ignore_ascii_case("ENDIF"),
                Error::UnmatchedIf {
                    terminator: "ENDIF".to_string(),
                    line,
                },
            )?;
            else_commands = body;
            endif_idx + 1
        } else {
            stop_idx + 1
        };
        Ok((
            Some(Command::If {
                condition: cond,
                then_commands,
                else_commands,
                source_line: line,
            }),
            next,
        ))
    }

    fn parse_do_block(
        &self,
        tokens: &[Token],
        idx: usize,
        depth: usize,
        spec_src: &str,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        trace!(line, spec = spec_src, "parsing DO block");
        let spec = self.parse_loop_spec(spec_src, line)?;
        let (body, end_idx) = self.parse_body_until(
            tokens,
            idx + 1,
            depth + 1,
            |l| l.eq_ignore_ascii_case("END"),
            Error::UnmatchedDo { line },
        )?;
        Ok((
            Some(Command::Do {
                spec,
                body,
                source_line: line,
            }),
            end_idx + 1,
        ))
    }

    fn parse_loop_spec(&self, src: &str, line: usize) -> Result<LoopSpec> {
        if src.is_empty() || FOREVER_RE.is_match(src) {
            return Ok(LoopSpec::Infinite);
        }
        if let Some(caps) = WHILE_RE.captures(src) {
            return Ok(LoopSpec::While {
                condition: condition::parse_condition(&caps[1]),
            });
        }
        if let Some(caps) = RANGE_STEP_RE.captures(src) {
            return Ok(LoopSpec::RangeWithStep {
                variable: caps[1].to_string(),
                start: self.value_expression(&caps[2], line)?,
                end: self.value_expression(&caps[3], line)?,
                step: self.value_expression(&caps[4], line)?,
            });
        }
        if let Some(caps) = RANGE_RE.captures(src) {
            return Ok(LoopSpec::Range {
                variable: caps[1].to_string(),
                start: self.value_expression(&caps[2], line)?,
                end: self.value_expression(&caps[3], line)?,
            });
        }
        if let Some(caps) = OVER_RE.captures(src) {
            return Ok(LoopSpec::Over {
                variable: caps[1].to_string(),
                array: self.value_expression(&caps[2], line)?,
            });
        }
        Ok(LoopSpec::Repeat {
            count: self.value_expression(src, line)?,
        })
    }

    fn parse_select_block(
        &self,
        tokens: &[Token],
        idx: usize,
        depth: usize,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        trace!(line, "parsing SELECT block");
        let mut whens = Vec::new();
        let mut otherwise = None;
        let mut cursor = idx + 1;

        loop {
            let Some(token) = tokens.get(cursor) else {
                return Err(Error::UnmatchedSelect { line });
            };
            let Token::Line { content, .. } = token else {
                return Err(Error::StrayHeredoc {
                    line: token.source_line(),
                });
            };

            if content.eq_ignore_ascii_case("END") {
                return Ok((
                    Some(Command::Select {
                        whens,
                        otherwise,
                        source_line: line,
                    }),
                    cursor + 1,
                ));
            }

            if let Some(caps) = WHEN_RE.captures(content) {
                let cond = condition::parse_condition(&caps[1]);
                let (commands, stop_idx) = self.parse_body_until(
                    tokens,
                    cursor + 1,
                    depth + 1,
                    |l| {
                        WHEN_RE.is_match(l)
                            || l.eq_ignore_ascii_case("OTHERWISE")
                            || l.eq_ignore_ascii_case("END")
                    },
                    Error::UnmatchedSelect { line },
                )?;
                whens.push(WhenClause {
                    condition: cond,
                    commands,
                });
                cursor = stop_idx;
                continue;
            }

            if content.eq_ignore_ascii_case("OTHERWISE") {
                let (commands, stop_idx) = self.parse_body_until(
                    tokens,
                    cursor + 1,
                    depth + 1,
                    |l| l.eq_ignore_ascii_case("END"),
                    Error::UnmatchedSelect { line },
                )?;
                otherwise = Some(commands);
                cursor = stop_idx;
                continue;
            }

            return Err(Error::UnexpectedInSelect {
                content: content.clone(),
                line: token.source_line(),
            });
        }
    }

    fn parse_retry_block(
        &self,
        tokens: &[Token],
        idx: usize,
        depth: usize,
        timeout_src: &str,
        line: usize,
    ) -> Result<(Option<Command>, usize)> {
        trace!(line, "parsing RETRY_ON_STALE block");
        let timeout = if timeout_src.is_empty() {
            None
        } else {
            Some(self.value_expression(timeout_src, line)?)
        };
        let (body, end_idx) = self.parse_body_until(
            tokens,
            idx + 1,
            depth + 1,
            |l| END_RETRY_RE.is_match(l),
            Error::UnmatchedRetry { line },
        )?;
        Ok((
            Some(Command::RetryOnStale {
                timeout,
                body,
                source_line: line,
            }),
            end_idx + 1,
        ))
    }
}

// ── free helpers ────────────────────────────────────────────────────────

/// Split off the first whitespace-delimited word.
fn split_first_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    }
}

/// Strip a leading case-insensitive keyword followed by whitespace.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    if rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Split a variable list on commas when present, whitespace otherwise.
fn split_variable_list(text: &str) -> Vec<String> {
    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').collect()
    } else {
        text.split_whitespace().collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `||` appears outside quotes.
fn contains_top_level_concat(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '|' if chars.get(i + 1) == Some(&'|') => return true,
                _ => {}
            },
        }
        i += 1;
    }
    false
}
