//! AST types for parsed scripts
//!
//! These types define the command tree handed to the executor. Commands and
//! expressions are produced once per parse and are read-only afterwards;
//! nothing here holds interior mutability.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete parsed program: the ordered command list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub commands: Vec<Command>,
}

/// A single statement in the command tree.
///
/// Every variant records the 1-based source line of the statement that
/// produced it, for executor diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// A label definition (e.g., `cleanup:`)
    Label { name: String, source_line: usize },

    /// `ADDRESS` with no operand - reset to the default environment
    AddressReset { source_line: usize },

    /// `ADDRESS target` - switch the command environment
    AddressTarget { target: String, source_line: usize },

    /// `ADDRESS target "command"` - one-shot command string
    AddressInline {
        target: String,
        command: String,
        source_line: usize,
    },

    /// `ADDRESS target MATCHING "pattern"`
    AddressMatching {
        target: String,
        pattern: String,
        source_line: usize,
    },

    /// `ADDRESS target LINES "pattern"`
    AddressLines {
        target: String,
        pattern: String,
        source_line: usize,
    },

    /// `NUMERIC DIGITS|FUZZ|FORM [value]`
    Numeric {
        setting: String,
        value: Option<Expression>,
        source_line: usize,
    },

    /// `PARSE source WITH vars` or the simplified `ARG vars` form
    Parse {
        source: ParseSource,
        variables: Vec<String>,
        source_line: usize,
    },

    /// `PUSH expr`
    Push {
        value: Expression,
        source_line: usize,
    },

    /// `PULL var`
    Pull {
        variable: String,
        source_line: usize,
    },

    /// `QUEUE expr`
    Queue {
        value: Expression,
        source_line: usize,
    },

    /// `CALL name args...` or `CALL (var) args...`
    Call {
        target: CallTarget,
        arguments: Vec<Expression>,
        source_line: usize,
    },

    /// `RETURN [expr]`
    Return {
        value: Option<Expression>,
        source_line: usize,
    },

    /// `TRACE setting`
    Trace { setting: String, source_line: usize },

    /// `RETRY_ON_STALE [timeout] ... END_RETRY`
    RetryOnStale {
        timeout: Option<Expression>,
        body: Vec<Command>,
        source_line: usize,
    },

    /// `SIGNAL label` - unconditional jump
    Signal { target: String, source_line: usize },

    /// `SIGNAL ON condition [NAME handler]`
    SignalOn {
        condition: String,
        handler: Option<String>,
        source_line: usize,
    },

    /// `SIGNAL OFF condition`
    SignalOff {
        condition: String,
        source_line: usize,
    },

    /// `LET var = value` or the bare `var = value` form
    Assignment {
        variable: String,
        value: AssignedValue,
        source_line: usize,
    },

    /// `IF cond THEN DO ... END [ELSE DO ... END]` or
    /// `IF cond THEN ... [ELSE ...] ENDIF`
    If {
        condition: Condition,
        then_commands: Vec<Command>,
        else_commands: Vec<Command>,
        source_line: usize,
    },

    /// `DO [spec] ... END`
    Do {
        spec: LoopSpec,
        body: Vec<Command>,
        source_line: usize,
    },

    /// `SELECT WHEN... [OTHERWISE...] END`
    Select {
        whens: Vec<WhenClause>,
        otherwise: Option<Vec<Command>>,
        source_line: usize,
    },

    /// `INTERPRET expr`, optionally `WITH ISOLATED [IMPORT(..)] [EXPORT(..)]`
    Interpret {
        expression: Expression,
        isolated: bool,
        imports: Vec<String>,
        exports: Vec<String>,
        source_line: usize,
    },

    /// `NO-INTERPRET` - forbid INTERPRET for the rest of the program
    NoInterpret { source_line: usize },

    /// `EXIT [expr]`
    Exit {
        value: Option<Expression>,
        source_line: usize,
    },

    /// `SAY expr`
    Say {
        value: Expression,
        source_line: usize,
    },

    /// A bare heredoc reference standing alone on a line
    HeredocString {
        content: String,
        delimiter: String,
        source_line: usize,
    },

    /// A bare quoted string standing alone on a line
    QuotedString {
        value: String,
        interpolated: bool,
        source_line: usize,
    },

    /// A bare function call statement, e.g. `LOG("msg")`
    FunctionCall {
        name: String,
        arguments: Vec<CallArgument>,
        source_line: usize,
    },
}

impl Command {
    /// The 1-based source line of the statement that produced this command.
    pub fn source_line(&self) -> usize {
        match self {
            Self::Label { source_line, .. }
            | Self::AddressReset { source_line }
            | Self::AddressTarget { source_line, .. }
            | Self::AddressInline { source_line, .. }
            | Self::AddressMatching { source_line, .. }
            | Self::AddressLines { source_line, .. }
            | Self::Numeric { source_line, .. }
            | Self::Parse { source_line, .. }
            | Self::Push { source_line, .. }
            | Self::Pull { source_line, .. }
            | Self::Queue { source_line, .. }
            | Self::Call { source_line, .. }
            | Self::Return { source_line, .. }
            | Self::Trace { source_line, .. }
            | Self::RetryOnStale { source_line, .. }
            | Self::Signal { source_line, .. }
            | Self::SignalOn { source_line, .. }
            | Self::SignalOff { source_line, .. }
            | Self::Assignment { source_line, .. }
            | Self::If { source_line, .. }
            | Self::Do { source_line, .. }
            | Self::Select { source_line, .. }
            | Self::Interpret { source_line, .. }
            | Self::NoInterpret { source_line }
            | Self::Exit { source_line, .. }
            | Self::Say { source_line, .. }
            | Self::HeredocString { source_line, .. }
            | Self::QuotedString { source_line, .. }
            | Self::FunctionCall { source_line, .. } => *source_line,
        }
    }
}

/// Target of a `CALL` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    /// `CALL name ...`
    Name(String),
    /// `CALL (var) ...` - routine name held in a variable
    Variable(String),
}

/// Right-hand side of an assignment.
///
/// Most assignments bind an expression, but a `CALL`-shaped right-hand side
/// wraps a whole Call command so the executor can route the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignedValue {
    Expression(Expression),
    Call(Box<Command>),
}

/// One `WHEN cond THEN` arm of a `SELECT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    pub condition: Condition,
    pub commands: Vec<Command>,
}

/// Data source of a `PARSE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseSource {
    /// `PARSE ARG` / bare `ARG` - the program's invocation arguments
    Arg,
    /// `PARSE VALUE expr WITH ...`
    Value(Expression),
    /// `PARSE VAR name WITH ...`
    Var(String),
}

/// The iteration strategy of a `DO` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LoopSpec {
    /// `DO i = start TO end`
    Range {
        variable: String,
        start: Expression,
        end: Expression,
    },
    /// `DO i = start TO end BY step`
    RangeWithStep {
        variable: String,
        start: Expression,
        end: Expression,
        step: Expression,
    },
    /// `DO item OVER collection`
    Over { variable: String, array: Expression },
    /// `DO WHILE cond`
    While { condition: Condition },
    /// `DO n` - fixed repeat count
    Repeat { count: Expression },
    /// `DO` / `DO FOREVER`
    Infinite,
}

/// A parsed condition (IF / WHEN / WHILE).
///
/// Comparison operands are kept as raw text; the executor re-resolves them
/// against the live variable environment at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Condition {
    Comparison {
        left: String,
        operator: String,
        right: String,
    },
    Boolean { expression: String },
}

/// One argument of a function call.
///
/// `name` is `Some` for `name=value` arguments and for the positional slots
/// the argument parser labels `value`, `arg2`, `arg3`, ...; expression-level
/// calls leave it `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArgument {
    pub name: Option<String>,
    pub value: Expression,
}

impl CallArgument {
    pub fn positional(value: Expression) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expression) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// An expression node. `BinaryOp` forms a binary tree that already encodes
/// operator precedence; no flat operator list survives parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// An opaque string value (including expression-fallback text)
    Literal { value: String },

    /// A numeric literal
    Number { value: f64 },

    /// `true` / `false`
    Boolean { value: bool },

    /// A variable or dotted-name reference
    Variable { name: String },

    /// A binary arithmetic operation; children encode precedence
    BinaryOp {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `name[index]`
    ArrayAccess {
        variable: String,
        index: Box<Expression>,
    },

    /// A bracket-delimited literal list
    ArrayLiteral { elements: Vec<Expression> },

    /// `name(args...)`
    FunctionCall {
        name: String,
        arguments: Vec<CallArgument>,
    },

    /// Explicit `||` concatenation chain
    Concatenation { parts: Vec<Expression> },

    /// A quoted string containing `{name}` or `{}` interpolation markers;
    /// the raw template is kept for the executor to expand
    InterpolatedString { template: String },

    /// A heredoc body spliced into an expression position
    HeredocString { content: String, delimiter: String },
}

impl Expression {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn number(value: f64) -> Self {
        Self::Number { value }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    pub fn binary(operator: &str, left: Expression, right: Expression) -> Self {
        Self::BinaryOp {
            operator: operator.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Re-serialize to standard infix text.
    ///
    /// Binary operations are fully parenthesized, so re-parsing the output
    /// reproduces a structurally identical tree.
    pub fn to_infix(&self) -> String {
        match self {
            Self::Literal { value } => format!("\"{value}\""),
            Self::Number { value } => format_number(*value),
            Self::Boolean { value } => value.to_string(),
            Self::Variable { name } => name.clone(),
            Self::BinaryOp {
                operator,
                left,
                right,
            } => format!("({} {} {})", left.to_infix(), operator, right.to_infix()),
            Self::ArrayAccess { variable, index } => {
                format!("{}[{}]", variable, index.to_infix())
            }
            Self::ArrayLiteral { elements } => {
                let inner: Vec<String> = elements.iter().map(Expression::to_infix).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::FunctionCall { name, arguments } => {
                let inner: Vec<String> = arguments
                    .iter()
                    .map(|a| match &a.name {
                        Some(n) => format!("{}={}", n, a.value.to_infix()),
                        None => a.value.to_infix(),
                    })
                    .collect();
                format!("{}({})", name, inner.join(", "))
            }
            Self::Concatenation { parts } => {
                let inner: Vec<String> = parts.iter().map(Expression::to_infix).collect();
                inner.join(" || ")
            }
            Self::InterpolatedString { template } => format!("\"{template}\""),
            Self::HeredocString { content, .. } => format!("\"{content}\""),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_infix())
    }
}

/// Format an f64 the way script numbers read: no trailing `.0` on integers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
