//! 계산기 툴
//!
//! 재귀 하강 파서로 산술식을 계산합니다.
//! 지원: `+ - * / % ^`, 괄호, 단항 마이너스, 소수.
//! `^`는 오른쪽 결합이며 단항 마이너스보다 우선합니다 (`-2^2 = -4`).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool};

/// 산술식 계산
pub fn evaluate(expression: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: expression.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };

    if parser.chars.is_empty() {
        bail!("empty expression");
    }

    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        bail!("unexpected '{}' at position {}", c, parser.pos);
    }
    if !value.is_finite() {
        bail!("result is not a finite number");
    }
    Ok(value)
}

/// 정수면 소수점 없이 출력
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    bail!("division by zero");
                }
                value /= divisor;
            } else if self.eat('%') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    bail!("modulo by zero");
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // unary := ('-' | '+') unary | power
    fn unary(&mut self) -> Result<f64> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    // power := atom ('^' unary)?
    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // atom := number | '(' expr ')'
    fn atom(&mut self) -> Result<f64> {
        if self.eat('(') {
            let value = self.expr()?;
            if !self.eat(')') {
                bail!("missing closing parenthesis");
            }
            return Ok(value);
        }

        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if start == self.pos {
            match self.peek() {
                Some(c) => bail!("unexpected '{}' at position {}", c, self.pos),
                None => bail!("unexpected end of expression"),
            }
        }

        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("invalid number '{}'", literal))
    }
}

/// 계산기 툴
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^ and parentheses."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. (2 + 3) * 4"
                }
            },
            "required": ["expression"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let expression = required_str(&args, "expression")?;
        Ok(format_number(evaluate(expression)?))
    }
}
