//! Arithmetic evaluation for the `calculate_math` tool.
//!
//! Supports numeric literals (`2`, `0.5`, `1e3`), `+ - * / **`, unary `+`/`-`
//! and parentheses. Nothing else is accepted: there are no names, calls or
//! strings, so an expression can never reach anything but numbers.

use super::ToolContext;
use crate::types::Tool;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArithmeticError {
    #[error("unexpected character {0:?} at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("expression is nested more than {MAX_DEPTH} levels deep")]
    TooDeep,
}

/// Nesting limit for parentheses, signs and exponents combined.
pub const MAX_DEPTH: usize = 256;

pub fn evaluate(expr: &str) -> Result<f64, ArithmeticError> {
    let mut parser = Parser {
        input: expr,
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_expr()?;
    parser.expect_end()?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ArithmeticError::NonFinite)
    }
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.input[self.pos..].chars().next()
    }

    fn peek_power(&mut self) -> bool {
        self.skip_whitespace();
        self.input[self.pos..].starts_with("**")
    }

    fn advance(&mut self) -> Option<char> {
        self.skip_whitespace();
        let ch = self.input[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn expect_end(&mut self) -> Result<(), ArithmeticError> {
        match self.peek() {
            Some(ch) => Err(ArithmeticError::UnexpectedChar(ch, self.pos)),
            None => Ok(()),
        }
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, ArithmeticError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.advance();
                    left += self.parse_term()?;
                }
                Some('-') => {
                    self.advance();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    /// term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<f64, ArithmeticError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some('*') if !self.peek_power() => {
                    self.advance();
                    left *= self.parse_unary()?;
                }
                Some('/') => {
                    self.advance();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err(ArithmeticError::DivisionByZero);
                    }
                    left /= right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    /// Every recursive path (parentheses, signs, exponents) passes through
    /// here, so this is where nesting is bounded.
    fn parse_unary(&mut self) -> Result<f64, ArithmeticError> {
        if self.depth >= MAX_DEPTH {
            return Err(ArithmeticError::TooDeep);
        }
        self.depth += 1;
        let value = self.parse_signed();
        self.depth -= 1;
        value
    }

    /// unary := ('+' | '-') unary | power
    fn parse_signed(&mut self) -> Result<f64, ArithmeticError> {
        match self.peek() {
            Some('+') => {
                self.advance();
                self.parse_unary()
            }
            Some('-') => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_power(),
        }
    }

    /// power := primary ('**' unary)?, right associative and tighter than a
    /// unary minus on its left: `-2 ** 2` is `-4`.
    fn parse_power(&mut self) -> Result<f64, ArithmeticError> {
        let base = self.parse_primary()?;
        if self.peek_power() {
            self.pos += 2;
            let exponent = self.parse_unary()?;
            if base == 0.0 && exponent < 0.0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<f64, ArithmeticError> {
        match self.peek() {
            Some('(') => {
                self.advance();
                let value = self.parse_expr()?;
                match self.peek() {
                    Some(')') => {
                        self.advance();
                        Ok(value)
                    }
                    Some(ch) => Err(ArithmeticError::UnexpectedChar(ch, self.pos)),
                    None => Err(ArithmeticError::UnexpectedEnd),
                }
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number(),
            Some(ch) => Err(ArithmeticError::UnexpectedChar(ch, self.pos)),
            None => Err(ArithmeticError::UnexpectedEnd),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ArithmeticError> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        let digits = |pos: &mut usize| {
            while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
                *pos += 1;
            }
        };

        let mut pos = self.pos;
        digits(&mut pos);
        if pos < bytes.len() && bytes[pos] == b'.' {
            pos += 1;
            digits(&mut pos);
        }
        if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
            let mut exponent = pos + 1;
            if exponent < bytes.len() && matches!(bytes[exponent], b'+' | b'-') {
                exponent += 1;
            }
            if exponent < bytes.len() && bytes[exponent].is_ascii_digit() {
                digits(&mut exponent);
                pos = exponent;
            }
        }

        self.pos = pos;
        let literal = &self.input[start..pos];
        literal
            .parse::<f64>()
            .map_err(|_| ArithmeticError::InvalidNumber(literal.to_string()))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(
    title = "calculate_math",
    description = "Evaluate a mathematical expression and return the result."
)]
pub struct CalculateMath {
    #[schemars(
        description = "A mathematical expression to evaluate (e.g., '2 + 3 * 4'). Supports basic arithmetic (+, -, *, /, **, parentheses)."
    )]
    pub expression: String,
}

#[async_trait]
impl Tool for CalculateMath {
    type Context = ToolContext;

    async fn apply(&self, _: &ToolContext) -> anyhow::Result<String> {
        Ok(format_number(evaluate(&self.expression)?))
    }

    fn from_inline(args: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            expression: args.to_string(),
        })
    }
}
