//! Sandboxed arithmetic for the agent.
//!
//! The evaluator accepts numbers, `+ - * /`, unary minus and parentheses, and
//! nothing else. Input length and nesting depth are bounded. Anything outside
//! that grammar is a sandbox violation; there is no access to the host.

use crate::registry::Tool;
use async_trait::async_trait;
use aura_core::error::ToolError;
use aura_core::types::ToolOutput;
use std::time::Duration;

pub const TOOL_NAME: &str = "evaluate_expression";

/// Longest expression accepted, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 256;

/// Deepest parenthesis or unary-minus nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Input outside the permitted grammar or limits.
    #[error("{0}")]
    Sandbox(String),

    /// Well-formed input with no finite value.
    #[error("{0}")]
    Arithmetic(String),
}

/// Evaluate an expression to a number.
pub fn eval_expression(input: &str) -> Result<f64, EvalError> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(EvalError::Sandbox(format!(
            "expression longer than {MAX_EXPRESSION_LEN} characters"
        )));
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvalError::Arithmetic("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = tokens.get(parser.pos) {
        return Err(EvalError::Arithmetic(format!(
            "unexpected {token:?} at position {}",
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(EvalError::Arithmetic("result is not finite".to_string()));
    }
    Ok(value)
}

/// Evaluate and render for an observation: the value, or an error string.
pub fn evaluate_expression(input: &str) -> String {
    match eval_expression(input) {
        Ok(value) => format_number(value),
        Err(err) => format!("Error: {err}"),
    }
}

/// Integers print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let number = literal
                    .parse()
                    .map_err(|_| EvalError::Arithmetic(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Number(number));
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                tokens.push(match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                chars.next();
            }
            other => {
                return Err(EvalError::Sandbox(format!(
                    "character '{other}' is not permitted"
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(EvalError::Sandbox(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(())
    }

    // expr = term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut left = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    left += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    left -= self.term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // term = factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut left = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    left *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let right = self.factor()?;
                    if right == 0.0 {
                        return Err(EvalError::Arithmetic("division by zero".to_string()));
                    }
                    left /= right;
                }
                _ => return Ok(left),
            }
        }
    }

    // factor = '-' factor | number | '(' expr ')'
    fn factor(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let value = -self.factor()?;
                self.depth -= 1;
                Ok(value)
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                self.descend()?;
                let value = self.expr()?;
                if self.peek() != Some(Token::RParen) {
                    return Err(EvalError::Arithmetic("missing closing parenthesis".to_string()));
                }
                self.pos += 1;
                self.depth -= 1;
                Ok(value)
            }
            Some(token) => Err(EvalError::Arithmetic(format!("unexpected {token:?}"))),
            None => Err(EvalError::Arithmetic("unexpected end of expression".to_string())),
        }
    }
}

/// Agent tool wrapping [`eval_expression`].
pub struct ExpressionTool;

#[async_trait]
impl Tool for ExpressionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Evaluates an arithmetic expression using numbers, + - * /, and parentheses."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The arithmetic expression to evaluate, e.g. '2 + 3 * (4 - 1)'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let expr = args["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.to_string(),
                reason: "missing required 'expression' parameter".to_string(),
            })?;

        match eval_expression(expr) {
            Ok(value) => Ok(ToolOutput::text(format_number(value))),
            Err(EvalError::Sandbox(reason)) => Err(ToolError::SandboxViolation {
                name: TOOL_NAME.to_string(),
                reason,
            }),
            Err(EvalError::Arithmetic(message)) => Err(ToolError::ExecutionFailed {
                name: TOOL_NAME.to_string(),
                message,
            }),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
