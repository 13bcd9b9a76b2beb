//! Expression parser
//!
//! A dedicated expression-level lexer feeds a cursor-based precedence
//! climber: concatenation, then additive, then multiplicative operators,
//! then factors. Two-character operators (`**`, `//`, `||`) are matched
//! greedily before single-character ones. Each binary application builds a
//! `BinaryOp` whose children are already-parsed results, so the tree encodes
//! precedence directly.
//!
//! Expression parsing is all-or-nothing: if the lexer rejects a character or
//! tokens are left over after parsing, the whole attempt reports no match
//! and the caller falls back to a raw-string literal. Only genuinely
//! structural problems (unbalanced parentheses, nesting overflow) abort the
//! parse.

use crate::error::Error;
use crate::parser::ast::{CallArgument, Expression};
use regex::Regex;
use std::sync::LazyLock;

/// Internal failure channel: `NoMatch` degrades to a literal at the call
/// site, `Fatal` aborts the whole parse.
pub(crate) enum ExprFail {
    NoMatch,
    Fatal(Error),
}

type ExprResult = Result<Expression, ExprFail>;

/// Parse a complete expression from `text`. Returns `Ok(None)` when the text
/// is not an expression (caller falls back to a literal), `Err` only for
/// structural errors.
pub(crate) fn parse_expression(
    text: &str,
    line: usize,
    max_depth: usize,
) -> crate::error::Result<Option<Expression>> {
    match parse_inner(text, line, max_depth, 0) {
        Ok(expr) => Ok(Some(expr)),
        Err(ExprFail::NoMatch) => Ok(None),
        Err(ExprFail::Fatal(e)) => Err(e),
    }
}

fn parse_inner(text: &str, line: usize, max_depth: usize, depth: usize) -> ExprResult {
    if depth > max_depth {
        return Err(ExprFail::Fatal(Error::NestingTooDeep {
            max: max_depth,
            line,
        }));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(ExprFail::NoMatch);
    }

    // Array forms are recognized ahead of arithmetic parsing.
    if let Some((name, index_src)) = match_array_access(text) {
        let index = parse_inner(index_src, line, max_depth, depth + 1)?;
        return Ok(Expression::ArrayAccess {
            variable: name.to_string(),
            index: Box::new(index),
        });
    }
    if text.starts_with('[') {
        return parse_array_literal(text);
    }

    let tokens = lex(text).ok_or(ExprFail::NoMatch)?;
    if tokens.is_empty() {
        return Err(ExprFail::NoMatch);
    }

    // A bare identifier standing alone goes through the call-vs-variable
    // heuristic rather than the climber.
    if tokens.len() == 1 {
        if let TokKind::Ident(name) = &tokens[0].kind {
            if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
                return Ok(Expression::Boolean {
                    value: name.eq_ignore_ascii_case("true"),
                });
            }
            if is_callable_bare_identifier(name) {
                return Ok(Expression::FunctionCall {
                    name: name.clone(),
                    arguments: Vec::new(),
                });
            }
            return Ok(Expression::Variable { name: name.clone() });
        }
    }

    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
        line,
        max_depth,
    };
    let expr = cursor.parse_concat(depth)?;
    if !cursor.at_end() {
        // Leftover tokens mean this was never a full expression.
        return Err(ExprFail::NoMatch);
    }
    Ok(expr)
}

/// `name[index]` where the opening bracket's match is the final character.
fn match_array_access(text: &str) -> Option<(&str, &str)> {
    static HEAD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)\[").unwrap());
    let caps = HEAD.captures(text)?;
    let name = caps.get(1).expect("group").as_str();
    let open = name.len();
    if !text.ends_with(']') {
        return None;
    }
    // The bracket after the name must close at the very end of the text.
    let mut depth = 0usize;
    for (i, ch) in text.char_indices().skip(open) {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    if i == text.len() - 1 {
                        return Some((name, &text[open + 1..i]));
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// A bracket-delimited literal is accepted only when it is well-formed
/// structured list data; anything else falls back at the call site.
fn parse_array_literal(text: &str) -> ExprResult {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ExprFail::NoMatch)?;
    let serde_json::Value::Array(items) = value else {
        return Err(ExprFail::NoMatch);
    };
    let elements = items.into_iter().map(json_to_expression).collect();
    Ok(Expression::ArrayLiteral { elements })
}

fn json_to_expression(value: serde_json::Value) -> Expression {
    match value {
        serde_json::Value::String(s) => Expression::Literal { value: s },
        serde_json::Value::Number(n) => Expression::Number {
            value: n.as_f64().unwrap_or(0.0),
        },
        serde_json::Value::Bool(b) => Expression::Boolean { value: b },
        other => Expression::Literal {
            value: other.to_string(),
        },
    }
}

// ── call-vs-variable heuristic ──────────────────────────────────────────

static VERB_SHAPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(get|check|create|prepare|make|set|handle|execute|process|update|delete|add|remove|list|find|search)[a-z0-9_]*$",
    )
    .unwrap()
});

const BARE_BUILTINS: &[&str] = &["DATE", "TIME", "NOW", "TODAY", "RANDOM", "UUID"];

/// Decide whether a bare identifier standing alone is a zero-argument
/// function call or a variable reference. The grammar alone cannot tell;
/// this reproduces the legacy allow/deny name-shape rules (see DESIGN.md
/// for the compatibility decision).
pub(crate) fn is_callable_bare_identifier(name: &str) -> bool {
    if name.contains('.') || VERB_SHAPED.is_match(name) {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    let all_upper =
        name == upper && name.chars().any(|c| c.is_ascii_alphabetic());
    all_upper
        || upper.starts_with("REXX")
        || BARE_BUILTINS.contains(&upper.as_str())
}

// ── expression-level lexer ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Number(f64),
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Op(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
struct ExprToken {
    kind: TokKind,
    /// Whitespace preceded this token; a call requires the paren to abut
    /// the identifier.
    space_before: bool,
}

/// Lex expression text into a small token list, or `None` when a character
/// cannot belong to an expression (the caller then falls back to a literal).
fn lex(text: &str) -> Option<Vec<ExprToken>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut space_before = false;

    while i < chars.len() {
        let ch = chars[i];
        if ch == ' ' || ch == '\t' {
            space_before = true;
            i += 1;
            continue;
        }

        let kind = match ch {
            '(' => {
                i += 1;
                TokKind::LParen
            }
            ')' => {
                i += 1;
                TokKind::RParen
            }
            ',' => {
                i += 1;
                TokKind::Comma
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    i += 2;
                    TokKind::Op("**")
                } else {
                    i += 1;
                    TokKind::Op("*")
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    i += 2;
                    TokKind::Op("//")
                } else {
                    i += 1;
                    TokKind::Op("/")
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    i += 2;
                    TokKind::Op("||")
                } else {
                    return None;
                }
            }
            '+' => {
                i += 1;
                TokKind::Op("+")
            }
            '-' => {
                i += 1;
                TokKind::Op("-")
            }
            '%' => {
                i += 1;
                TokKind::Op("%")
            }
            '"' | '\'' => {
                let quote = ch;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(&c) => {
                            value.push(c);
                            i += 1;
                        }
                        None => return None, // unterminated string
                    }
                }
                TokKind::Str(value)
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_digit() {
                        i += 1;
                    } else if c == '.' && !seen_dot {
                        seen_dot = true;
                        i += 1;
                    } else {
                        break;
                    }
                }
                let raw: String = chars[start..i].iter().collect();
                TokKind::Number(raw.parse().ok()?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                TokKind::Ident(chars[start..i].iter().collect())
            }
            _ => return None,
        };

        tokens.push(ExprToken { kind, space_before });
        space_before = false;
    }
    Some(tokens)
}

// ── precedence climbing over the token cursor ───────────────────────────

struct Cursor<'a> {
    tokens: &'a [ExprToken],
    pos: usize,
    line: usize,
    max_depth: usize,
}

impl Cursor<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_space_before(&self) -> bool {
        self.tokens.get(self.pos).is_some_and(|t| t.space_before)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn check_depth(&self, depth: usize) -> Result<(), ExprFail> {
        if depth > self.max_depth {
            return Err(ExprFail::Fatal(Error::NestingTooDeep {
                max: self.max_depth,
                line: self.line,
            }));
        }
        Ok(())
    }

    /// Lowest level: `||` concatenation chains.
    fn parse_concat(&mut self, depth: usize) -> ExprResult {
        self.check_depth(depth)?;
        let first = self.parse_addition(depth + 1)?;
        if !matches!(self.peek(), Some(TokKind::Op("||"))) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while matches!(self.peek(), Some(TokKind::Op("||"))) {
            self.advance();
            parts.push(self.parse_addition(depth + 1)?);
        }
        Ok(Expression::Concatenation { parts })
    }

    fn parse_addition(&mut self, depth: usize) -> ExprResult {
        self.check_depth(depth)?;
        let mut left = self.parse_multiplication(depth + 1)?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Op(op @ ("+" | "-"))) => *op,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplication(depth + 1)?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self, depth: usize) -> ExprResult {
        self.check_depth(depth)?;
        let mut left = self.parse_factor(depth + 1)?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Op(op @ ("*" | "/" | "%" | "//" | "**"))) => *op,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor(depth + 1)?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self, depth: usize) -> ExprResult {
        self.check_depth(depth)?;
        match self.peek().cloned() {
            Some(TokKind::Op("-")) => {
                // A leading minus binds to the factor it precedes.
                self.advance();
                match self.parse_factor(depth + 1)? {
                    Expression::Number { value } => Ok(Expression::Number { value: -value }),
                    other => Ok(Expression::binary(
                        "-",
                        Expression::Number { value: 0.0 },
                        other,
                    )),
                }
            }
            Some(TokKind::LParen) => {
                self.advance();
                let inner = self.parse_concat(depth + 1)?;
                match self.peek() {
                    Some(TokKind::RParen) => {
                        self.advance();
                        Ok(inner)
                    }
                    _ => Err(ExprFail::Fatal(Error::MismatchedParens { line: self.line })),
                }
            }
            Some(TokKind::Number(value)) => {
                self.advance();
                Ok(Expression::Number { value })
            }
            Some(TokKind::Str(value)) => {
                self.advance();
                if has_interpolation_markers(&value) {
                    Ok(Expression::InterpolatedString { template: value })
                } else {
                    Ok(Expression::Literal { value })
                }
            }
            Some(TokKind::Ident(name)) => {
                self.advance();
                if matches!(self.peek(), Some(TokKind::LParen)) && !self.peek_space_before() {
                    return self.parse_call(&name, depth);
                }
                if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
                    return Ok(Expression::Boolean {
                        value: name.eq_ignore_ascii_case("true"),
                    });
                }
                Ok(Expression::Variable { name })
            }
            _ => Err(ExprFail::NoMatch),
        }
    }

    /// `name(args...)` with the opening paren already peeked.
    fn parse_call(&mut self, name: &str, depth: usize) -> ExprResult {
        self.advance(); // (
        let mut arguments = Vec::new();
        if matches!(self.peek(), Some(TokKind::RParen)) {
            self.advance();
        } else {
            loop {
                let value = self.parse_concat(depth + 1)?;
                arguments.push(CallArgument::positional(value));
                match self.peek() {
                    Some(TokKind::Comma) => self.advance(),
                    Some(TokKind::RParen) => {
                        self.advance();
                        break;
                    }
                    _ => {
                        return Err(ExprFail::Fatal(Error::MismatchedParens { line: self.line }));
                    }
                }
            }
        }
        Ok(Expression::FunctionCall {
            name: name.to_string(),
            arguments,
        })
    }
}

static INTERPOLATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}|\{\}").unwrap());

/// True if a quoted string contains `{name}` or empty `{}` markers.
pub(crate) fn has_interpolation_markers(text: &str) -> bool {
    INTERPOLATION_MARKER.is_match(text)
}
