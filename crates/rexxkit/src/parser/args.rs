//! Function-call argument parsing
//!
//! Turns the raw text between a callable's parentheses into classified
//! argument values. Extraction is quote- and paren-aware so commas inside
//! strings or nested calls never terminate the current argument. Values are
//! deliberately under-parsed: only text that is clearly arithmetic is sent
//! through the expression parser, everything else stays a raw string for the
//! executor to resolve.

use crate::error::Result;
use crate::parser::ast::{CallArgument, Expression};
use crate::parser::expr;
use regex::Regex;
use std::sync::LazyLock;

static NAMED_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=").unwrap());

// Clear arithmetic shapes that justify a real expression parse. The spaced
// `identifier - number` form keeps hyphenated identifiers like `meal-1`
// out of the subtraction path.
static NUM_OP_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-?\d+(\.\d+)?\s*[-+*/%]\s*-?\d+(\.\d+)?\s*$").unwrap());
static IDENT_STAR_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_.]*\s*\*\s*-?\d+(\.\d+)?\s*$").unwrap());
static IDENT_SPACED_MINUS_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_.]*\s+-\s+\d+(\.\d+)?\s*$").unwrap());

/// Parse a raw argument string into named or positional arguments.
///
/// If any top-level segment looks like `identifier=`, all segments are
/// treated as `name=value` pairs; otherwise positional slots are labeled
/// `value`, `arg2`, `arg3`, ...
pub(crate) fn parse_call_arguments(
    raw: &str,
    line: usize,
    max_depth: usize,
) -> Result<Vec<CallArgument>> {
    let inner = strip_enclosing_parens(raw.trim());
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let segments = split_top_level(inner, ',');
    let named_mode = segments.iter().any(|s| NAMED_SEGMENT.is_match(s));

    let mut arguments = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if named_mode {
            if let Some(caps) = NAMED_SEGMENT.captures(segment) {
                let name = caps.get(1).expect("group").as_str().to_string();
                let value_src = &segment[caps.get(0).expect("match").end()..];
                let value = classify_value(value_src, line, max_depth)?;
                arguments.push(CallArgument::named(name, value));
                continue;
            }
        }
        let slot = if i == 0 {
            "value".to_string()
        } else {
            format!("arg{}", i + 1)
        };
        let value = classify_value(segment, line, max_depth)?;
        arguments.push(CallArgument::named(slot, value));
    }
    Ok(arguments)
}

/// Classify a single argument value: quoted string, bare number, clearly
/// arithmetic expression, or raw string fallback.
pub(crate) fn classify_value(raw: &str, line: usize, max_depth: usize) -> Result<Expression> {
    let text = raw.trim();

    if let Some(value) = unquote(text) {
        if expr::has_interpolation_markers(value) {
            return Ok(Expression::InterpolatedString {
                template: value.to_string(),
            });
        }
        return Ok(Expression::Literal {
            value: value.to_string(),
        });
    }

    if let Ok(n) = text.parse::<f64>() {
        return Ok(Expression::Number { value: n });
    }

    if text.contains('(')
        || NUM_OP_NUM.is_match(text)
        || IDENT_STAR_NUM.is_match(text)
        || IDENT_SPACED_MINUS_NUM.is_match(text)
    {
        if let Some(parsed) = expr::parse_expression(text, line, max_depth)? {
            return Ok(parsed);
        }
    }

    Ok(Expression::Literal {
        value: text.to_string(),
    })
}

/// Strip one layer of enclosing parentheses, if the pair actually encloses
/// the whole string.
fn strip_enclosing_parens(text: &str) -> &str {
    if !(text.starts_with('(') && text.ends_with(')')) {
        return text;
    }
    let mut depth = 0i32;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != text.len() - 1 {
                    return text; // closes early: not one enclosing pair
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Split on a separator at quote depth zero and paren depth zero.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' => {
                    depth -= 1;
                    current.push(ch);
                }
                c if c == separator && depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    parts.push(current);
    parts
}

/// Split on top-level whitespace runs (outside quotes and parens).
pub(crate) fn split_top_level_whitespace(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' => {
                    depth -= 1;
                    current.push(ch);
                }
                c if c.is_whitespace() && depth == 0 => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// True when a comma exists outside quotes and parens.
pub(crate) fn has_top_level_comma(text: &str) -> bool {
    split_top_level(text, ',').len() > 1
}

/// The inner text of a fully-quoted string, or `None`.
pub(crate) fn unquote(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if text.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[text.len() - 1] == first {
            // Reject "a" x "b": the opening quote must close at the end.
            let inner = &text[1..text.len() - 1];
            if !inner.contains(first as char) {
                return Some(inner);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEPTH: usize = 100;

    fn parse(raw: &str) -> Vec<CallArgument> {
        parse_call_arguments(raw, 1, DEPTH).unwrap()
    }

    #[test]
    fn test_positional_slot_names() {
        let args = parse("1, 2, 3");
        let names: Vec<_> = args.iter().map(|a| a.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["value", "arg2", "arg3"]);
    }

    #[test]
    fn test_named_arguments() {
        let args = parse("width=100, label=\"x axis\"");
        assert_eq!(args[0].name.as_deref(), Some("width"));
        assert_eq!(args[0].value, Expression::number(100.0));
        assert_eq!(args[1].name.as_deref(), Some("label"));
        assert_eq!(args[1].value, Expression::literal("x axis"));
    }

    #[test]
    fn test_enclosing_parens_stripped_once() {
        let args = parse("(1, 2)");
        assert_eq!(args.len(), 2);
        // A paren pair that closes early is not an enclosing pair.
        let args = parse("(1), (2)");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_commas_inside_quotes_preserved() {
        let args = parse("\"a,b\", 3");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value, Expression::literal("a,b"));
        assert_eq!(args[1].value, Expression::number(3.0));
    }

    #[test]
    fn test_commas_inside_nested_calls_preserved() {
        let args = parse("MAX(1, 2), 3");
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0].value, Expression::FunctionCall { .. }));
    }

    #[test]
    fn test_interpolated_quoted_value() {
        let args = parse("\"hello {name}\"");
        assert_eq!(
            args[0].value,
            Expression::InterpolatedString {
                template: "hello {name}".to_string()
            }
        );
    }

    #[test]
    fn test_hyphenated_identifier_not_subtraction() {
        // meal-1 is a name, not arithmetic.
        let args = parse("meal-1");
        assert_eq!(args[0].value, Expression::literal("meal-1"));
        // With surrounding spaces it is subtraction.
        let args = parse("meal - 1");
        assert_eq!(
            args[0].value,
            Expression::binary("-", Expression::variable("meal"), Expression::number(1.0))
        );
    }

    #[test]
    fn test_clear_arithmetic_patterns() {
        let args = parse("2 + 3");
        assert_eq!(
            args[0].value,
            Expression::binary("+", Expression::number(2.0), Expression::number(3.0))
        );
        let args = parse("count*2");
        assert_eq!(
            args[0].value,
            Expression::binary("*", Expression::variable("count"), Expression::number(2.0))
        );
    }

    #[test]
    fn test_unclear_text_stays_raw() {
        let args = parse("some plain text");
        assert_eq!(args[0].value, Expression::literal("some plain text"));
    }

    #[test]
    fn test_empty_argument_list() {
        assert!(parse("").is_empty());
        assert!(parse("()").is_empty());
    }

    #[test]
    fn test_split_top_level_whitespace() {
        let parts = split_top_level_whitespace("1 \"a b\" MAX(2, 3)");
        assert_eq!(parts, vec!["1", "\"a b\"", "MAX(2, 3)"]);
    }
}
