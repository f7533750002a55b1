//! Arithmetic expression evaluator.
//!
//! Deterministic and side-effect free: a string either evaluates to a finite
//! `f64` or fails with an [`EvalError`]. Grammar, lowest precedence first:
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | '(' sum ')'
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0} after complete expression")]
    Trailing(String),

    #[error("missing ')'")]
    UnbalancedParen,

    #[error("result is not a finite number")]
    NonFinite,
}

/// Evaluate `expr` to a finite number.
pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expr)?;
    let value = Parser::new(tokens).parse()?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

/// Render a result the way request listings show it: shortest decimal that
/// round-trips, without a trailing `.0` for whole numbers.
pub fn format_result(value: f64) -> String {
    format!("{value}")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, EvalError> {
    let bytes = expr.as_bytes();
    let mut idx = 0usize;
    let mut tokens = Vec::new();

    while idx < bytes.len() {
        let b = bytes[idx];
        if b.is_ascii_whitespace() {
            idx += 1;
            continue;
        }
        let single = match b {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'^' => Some(Token::Caret),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            idx += 1;
            continue;
        }

        if b.is_ascii_digit() || b == b'.' {
            let start = idx;
            idx += 1;
            while idx < bytes.len() {
                match bytes[idx] {
                    b'0'..=b'9' | b'.' | b'e' | b'E' => idx += 1,
                    // Sign only belongs to the literal right after an exponent marker.
                    b'+' | b'-' if matches!(bytes[idx - 1], b'e' | b'E') => idx += 1,
                    _ => break,
                }
            }
            let raw = &expr[start..idx];
            let value = raw
                .parse::<f64>()
                .map_err(|_| EvalError::InvalidNumber(raw.to_string()))?;
            tokens.push(Token::Number(value));
            continue;
        }

        // Report the full character, not the leading byte of a multi-byte one.
        let ch = expr[idx..].chars().next().unwrap_or(b as char);
        return Err(EvalError::UnexpectedChar { ch, offset: idx });
    }

    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    fn parse(mut self) -> Result<f64, EvalError> {
        let value = self.sum()?;
        match self.peek() {
            None => Ok(value),
            Some(token) => Err(EvalError::Trailing(token.to_string())),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.index).copied()
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn sum(&mut self) -> Result<f64, EvalError> {
        let mut value = self.product()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    value += self.product()?;
                }
                Some(Token::Minus) => {
                    self.consume();
                    value -= self.product()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn product(&mut self) -> Result<f64, EvalError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.consume();
                    value /= self.unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.consume();
            // Right-associative: 2^3^2 == 2^(3^2).
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        match self.consume() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.sum()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::UnbalancedParen),
                }
            }
            Some(token) => Err(EvalError::Trailing(token.to_string())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}
