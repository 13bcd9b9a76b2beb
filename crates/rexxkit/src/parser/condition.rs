//! Condition parsing shared by IF, WHEN and DO WHILE
//!
//! Conditions are split at the first top-level comparison operator; the two
//! operands stay raw text because the executor re-resolves them against the
//! live variable environment. Anything without a comparison operator becomes
//! a boolean expression condition.

use crate::parser::ast::Condition;

// Longest operators first so `>=` never splits as `>` `=`.
const COMPARISON_OPERATORS: &[&str] = &[">=", "<=", "==", "!=", "<>", ">", "<", "="];

/// Parse a raw condition string.
pub(crate) fn parse_condition(raw: &str) -> Condition {
    let text = raw.trim();
    if let Some((left, operator, right)) = split_comparison(text) {
        return Condition::Comparison {
            left: left.trim().to_string(),
            operator: operator.to_string(),
            right: right.trim().to_string(),
        };
    }
    Condition::Boolean {
        expression: text.to_string(),
    }
}

/// Find the first comparison operator outside quotes and parentheses.
fn split_comparison(text: &str) -> Option<(&str, &str, &str)> {
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                _ if depth == 0 => {
                    for op in COMPARISON_OPERATORS {
                        if text[i..].starts_with(op) {
                            // Operands must be non-empty on both sides.
                            let left = &text[..i];
                            let right = &text[i + op.len()..];
                            if left.trim().is_empty() || right.trim().is_empty() {
                                return None;
                            }
                            return Some((left, op, right));
                        }
                    }
                }
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            parse_condition("x > 10"),
            Condition::Comparison {
                left: "x".to_string(),
                operator: ">".to_string(),
                right: "10".to_string(),
            }
        );
    }

    #[test]
    fn test_two_char_operator_wins() {
        assert_eq!(
            parse_condition("count >= limit"),
            Condition::Comparison {
                left: "count".to_string(),
                operator: ">=".to_string(),
                right: "limit".to_string(),
            }
        );
        assert_eq!(
            parse_condition("a <> b"),
            Condition::Comparison {
                left: "a".to_string(),
                operator: "<>".to_string(),
                right: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_operator_inside_quotes_ignored() {
        assert_eq!(
            parse_condition("label = \"a = b\""),
            Condition::Comparison {
                left: "label".to_string(),
                operator: "=".to_string(),
                right: "\"a = b\"".to_string(),
            }
        );
    }

    #[test]
    fn test_operator_inside_parens_ignored() {
        assert_eq!(
            parse_condition("MAX(a, b) = 3"),
            Condition::Comparison {
                left: "MAX(a, b)".to_string(),
                operator: "=".to_string(),
                right: "3".to_string(),
            }
        );
    }

    #[test]
    fn test_boolean_condition() {
        assert_eq!(
            parse_condition("done"),
            Condition::Boolean {
                expression: "done".to_string()
            }
        );
        assert_eq!(
            parse_condition("ISEMPTY(queue)"),
            Condition::Boolean {
                expression: "ISEMPTY(queue)".to_string()
            }
        );
    }
}
