//! Integration tests covering the full set of statement shapes.

use pretty_assertions::assert_eq;
use rexxkit::{
    AssignedValue, CallTarget, Command, Expression, ParseSource, Parser, ParserConfig, parse,
};

fn parse_one(source: &str) -> Command {
    let mut program = parse(source).unwrap();
    assert_eq!(program.commands.len(), 1, "expected one command in {source:?}");
    program.commands.remove(0)
}

fn assigned_expression(command: Command) -> Expression {
    match command {
        Command::Assignment {
            value: AssignedValue::Expression(expression),
            ..
        } => expression,
        other => panic!("expected expression assignment, got {other:?}"),
    }
}

#[test]
fn parses_numeric_settings() {
    match parse_one("NUMERIC DIGITS 12") {
        Command::Numeric { setting, value, .. } => {
            assert_eq!(setting, "DIGITS");
            assert_eq!(value, Some(Expression::number(12.0)));
        }
        other => panic!("expected Numeric, got {other:?}"),
    }
    match parse_one("NUMERIC FORM") {
        Command::Numeric { setting, value, .. } => {
            assert_eq!(setting, "FORM");
            assert_eq!(value, None);
        }
        other => panic!("expected Numeric, got {other:?}"),
    }
}

#[test]
fn parses_bare_arg_as_parse_arg() {
    match parse_one("ARG first, second") {
        Command::Parse {
            source, variables, ..
        } => {
            assert_eq!(source, ParseSource::Arg);
            assert_eq!(variables, vec!["first", "second"]);
        }
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn parses_parse_value_and_parse_var() {
    match parse_one("PARSE VALUE greeting WITH word rest") {
        Command::Parse {
            source, variables, ..
        } => {
            assert_eq!(source, ParseSource::Value(Expression::variable("greeting")));
            assert_eq!(variables, vec!["word", "rest"]);
        }
        other => panic!("expected Parse, got {other:?}"),
    }
    match parse_one("PARSE VAR line WITH key value") {
        Command::Parse { source, .. } => {
            assert_eq!(source, ParseSource::Var("line".to_string()));
        }
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn parses_stack_statements() {
    assert!(matches!(
        parse_one("PUSH \"item\""),
        Command::Push { value: Expression::Literal { .. }, .. }
    ));
    assert!(matches!(
        parse_one("PULL answer"),
        Command::Pull { ref variable, .. } if variable == "answer"
    ));
    assert!(matches!(
        parse_one("QUEUE 42"),
        Command::Queue { value: Expression::Number { .. }, .. }
    ));
}

#[test]
fn parses_trace_return_exit() {
    assert!(matches!(
        parse_one("TRACE i"),
        Command::Trace { ref setting, .. } if setting == "I"
    ));
    match parse_one("RETURN result") {
        Command::Return { value, .. } => {
            assert_eq!(value, Some(Expression::variable("result")));
        }
        other => panic!("expected Return, got {other:?}"),
    }
    assert!(matches!(parse_one("RETURN"), Command::Return { value: None, .. }));
    match parse_one("EXIT 1") {
        Command::Exit { value, .. } => assert_eq!(value, Some(Expression::number(1.0))),
        other => panic!("expected Exit, got {other:?}"),
    }
}

#[test]
fn keywords_are_case_insensitive() {
    assert!(matches!(parse_one("say \"x\""), Command::Say { .. }));
    assert!(matches!(parse_one("Exit"), Command::Exit { .. }));
    assert!(matches!(
        parse_one("let n = 1"),
        Command::Assignment { .. }
    ));
}

// ── assignment cascade ──────────────────────────────────────────────────

#[test]
fn let_heredoc_value() {
    match parse_one("LET body = <<EOF\nline one\nline two\nEOF") {
        Command::Assignment {
            value: AssignedValue::Expression(Expression::HeredocString { content, delimiter }),
            ..
        } => {
            assert_eq!(content, "line one\nline two");
            assert_eq!(delimiter, "EOF");
        }
        other => panic!("expected heredoc assignment, got {other:?}"),
    }
}

#[test]
fn let_call_value_wraps_call_command() {
    match parse_one("LET result = CALL fetch url") {
        Command::Assignment {
            value: AssignedValue::Call(call),
            ..
        } => match *call {
            Command::Call {
                target, arguments, ..
            } => {
                assert_eq!(target, CallTarget::Name("fetch".to_string()));
                assert_eq!(arguments, vec![Expression::literal("url")]);
            }
            other => panic!("expected Call, got {other:?}"),
        },
        other => panic!("expected call assignment, got {other:?}"),
    }
}

#[test]
fn let_concatenation_value() {
    let expression = assigned_expression(parse_one("LET s = first || \"-\" || last"));
    assert_eq!(
        expression,
        Expression::Concatenation {
            parts: vec![
                Expression::variable("first"),
                Expression::literal("-"),
                Expression::variable("last"),
            ]
        }
    );
}

#[test]
fn let_quoted_values() {
    assert_eq!(
        assigned_expression(parse_one("LET s = \"plain\"")),
        Expression::literal("plain")
    );
    assert_eq!(
        assigned_expression(parse_one("LET s = \"hi {name}\"")),
        Expression::InterpolatedString {
            template: "hi {name}".to_string()
        }
    );
}

#[test]
fn let_structured_literal_stays_opaque() {
    let expression = assigned_expression(parse_one(r#"LET obj = {"a": 1, "b": [2, 3]}"#));
    assert_eq!(expression, Expression::literal(r#"{"a": 1, "b": [2, 3]}"#));
}

#[test]
fn let_expression_precedence() {
    let expression = assigned_expression(parse_one("LET x = 2 + 3 * 4"));
    assert_eq!(
        expression,
        Expression::binary(
            "+",
            Expression::number(2.0),
            Expression::binary("*", Expression::number(3.0), Expression::number(4.0)),
        )
    );
}

#[test]
fn let_bare_identifier_heuristic() {
    // All-uppercase shape parses as a zero-argument call.
    assert!(matches!(
        assigned_expression(parse_one("LET today = DATE")),
        Expression::FunctionCall { ref name, .. } if name == "DATE"
    ));
    // Ordinary names stay variable references.
    assert_eq!(
        assigned_expression(parse_one("LET copy = original")),
        Expression::variable("original")
    );
}

#[test]
fn let_raw_literal_fallback() {
    assert_eq!(
        assigned_expression(parse_one("LET note = some plain text")),
        Expression::literal("some plain text")
    );
}

#[test]
fn let_array_forms() {
    assert_eq!(
        assigned_expression(parse_one("LET first = items[0]")),
        Expression::ArrayAccess {
            variable: "items".to_string(),
            index: Box::new(Expression::number(0.0)),
        }
    );
    assert_eq!(
        assigned_expression(parse_one("LET xs = [1, \"two\", true]")),
        Expression::ArrayLiteral {
            elements: vec![
                Expression::number(1.0),
                Expression::literal("two"),
                Expression::Boolean { value: true },
            ]
        }
    );
}

// ── heredocs in the token stream ────────────────────────────────────────

#[test]
fn heredoc_statement_consumes_two_tokens() {
    let program = parse("<<NOTE\nfree text\nNOTE\nSAY \"after\"").unwrap();
    assert_eq!(program.commands.len(), 2);
    match &program.commands[0] {
        Command::HeredocString {
            content, delimiter, ..
        } => {
            assert_eq!(content, "free text");
            assert_eq!(delimiter, "NOTE");
        }
        other => panic!("expected HeredocString, got {other:?}"),
    }
    assert!(matches!(program.commands[1], Command::Say { .. }));
}

#[test]
fn unterminated_heredoc_reports_opening_line() {
    let err = parse("SAY \"x\"\nLET b = <<EOF\nnever closed").unwrap_err();
    assert_eq!(
        err,
        rexxkit::Error::UnterminatedHeredoc {
            delimiter: "EOF".to_string(),
            line: 2
        }
    );
}

// ── CALL argument splitting ─────────────────────────────────────────────

#[test]
fn call_with_commas_splits_on_commas_only() {
    match parse_one("CALL foo 1, \"a,b\", 3") {
        Command::Call { arguments, .. } => {
            assert_eq!(
                arguments,
                vec![
                    Expression::number(1.0),
                    Expression::literal("a,b"),
                    Expression::number(3.0),
                ]
            );
        }
        other => panic!("expected Call, got {other:?}"),
    }
}

#[test]
fn call_without_commas_splits_on_whitespace() {
    match parse_one("CALL log \"two words\" 5") {
        Command::Call { arguments, .. } => {
            assert_eq!(
                arguments,
                vec![Expression::literal("two words"), Expression::number(5.0)]
            );
        }
        other => panic!("expected Call, got {other:?}"),
    }
}

// ── interpolation flag on bare strings ──────────────────────────────────

#[test]
fn bare_string_interpolation_flag() {
    match parse_one("\"no markers\"") {
        Command::QuotedString { interpolated, .. } => assert!(!interpolated),
        other => panic!("expected QuotedString, got {other:?}"),
    }
    match parse_one("'braces {} count'") {
        Command::QuotedString { interpolated, .. } => assert!(interpolated),
        other => panic!("expected QuotedString, got {other:?}"),
    }
}

// ── source lines and serialization ──────────────────────────────────────

#[test]
fn source_lines_survive_blank_lines_and_comments() {
    let source = "SAY \"one\"\n\n-- comment\nSAY \"four\"";
    let program = parse(source).unwrap();
    assert_eq!(program.commands[0].source_line(), 1);
    assert_eq!(program.commands[1].source_line(), 4);
}

#[test]
fn program_serializes_with_type_tags() {
    let program = parse("SAY \"hi\"\nLET x = 1").unwrap();
    let value = serde_json::to_value(&program).unwrap();
    assert_eq!(value["commands"][0]["type"], "Say");
    assert_eq!(value["commands"][1]["type"], "Assignment");

    let back: rexxkit::Program = serde_json::from_value(value).unwrap();
    assert_eq!(program, back);
}

// ── strict mode ─────────────────────────────────────────────────────────

#[test]
fn lenient_mode_drops_unknown_lines() {
    let program = parse("@@not a statement@@\nSAY \"kept\"").unwrap();
    assert_eq!(program.commands.len(), 1);
}

#[test]
fn strict_mode_reports_unknown_lines() {
    let parser = Parser::with_config(ParserConfig::new().strict(true));
    let err = parser.parse("SAY \"ok\"\n@@not a statement@@").unwrap_err();
    match err {
        rexxkit::Error::UnrecognizedStatement { content, line } => {
            assert_eq!(content, "@@not a statement@@");
            assert_eq!(line, 2);
        }
        other => panic!("expected UnrecognizedStatement, got {other:?}"),
    }
}
