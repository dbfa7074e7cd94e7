//! Recursive-descent parser producing an explicit AST.
//!
//! Precedence, tightest first: unary minus, `* /`, `+ -`, comparisons,
//! ternary. Comparisons chain left-associatively; the ternary is
//! right-associative.

use super::error::FormulaError;
use super::lexer::{Spanned, Token};

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Binary operators. Comparisons yield 1.0 or 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

pub(crate) struct Parser<'a> {
    tokens: &'a [Spanned],
    source_len: usize,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Spanned], source_len: usize) -> Self {
        Self {
            tokens,
            source_len,
            pos: 0,
        }
    }

    /// Parse the token stream as one complete expression.
    pub fn parse(mut self) -> Result<Expr, FormulaError> {
        let expr = self.ternary()?;
        if self.pos < self.tokens.len() {
            return Err(self.error_here("unexpected token"));
        }
        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, FormulaError> {
        let cond = self.comparison()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(&Token::Colon, "expected ':' in conditional")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.tokens.get(self.pos) {
            Some(Spanned {
                token: Token::Number(value),
                ..
            }) => {
                let value = *value;
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Spanned {
                token: Token::Var(name),
                ..
            }) => {
                let name = name.clone();
                self.pos += 1;
                Ok(Expr::Var(name))
            }
            Some(Spanned {
                token: Token::LParen,
                ..
            }) => {
                self.pos += 1;
                let inner = self.ternary()?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(inner)
            }
            _ => Err(self.error_here("expected a number, placeholder, or '('")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, message: &str) -> Result<(), FormulaError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    fn error_here(&self, message: &str) -> FormulaError {
        let position = self
            .tokens
            .get(self.pos)
            .map_or(self.source_len, |s| s.position);
        FormulaError::Syntax {
            position,
            message: message.into(),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
