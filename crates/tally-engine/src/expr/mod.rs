//! Formula parsing, validation, and evaluation.
//!
//! Formulas are string expressions over named numeric placeholders:
//!
//! ```text
//! {token_count} * 0.001 + 10
//! {count} > 100 ? {count} * 0.8 : {count}
//! ```
//!
//! The grammar covers numeric literals (`12`, `3.5`, `.5`, `5.`),
//! placeholders `{identifier}` with `identifier ~ [A-Za-z][A-Za-z0-9_]*`,
//! binary `+ - * /`, comparisons `< > <= >= == !=` (yielding 1.0/0.0), one
//! ternary `cond ? a : b` (non-zero condition is true), and parentheses.
//! No assignment, loops, calls, or strings. The parser accepts a small
//! superset of that surface (chained comparisons, repeated unary minus);
//! everything else is rejected with a positioned syntax error.
//!
//! Validation runs in stages, each with its own error: empty source,
//! character whitelist, running-count balance for `()` and `{}`, the
//! placeholder identifier rule, and finally a full tokenize and parse.
//! `&`, `|`, lone `=`, and lone `!` pass the whitelist but form no
//! operator, so they fail at the parse stage.
//!
//! Evaluation uses IEEE-754 `f64` semantics with one exception: a zero
//! divisor is its own error rather than a silent infinity, and a NaN or
//! non-finite final result is an error rather than a value.

mod error;
mod eval;
mod lexer;
mod parser;

pub use error::FormulaError;

use std::collections::BTreeMap;

use parser::Expr;

/// A validated, compiled formula.
///
/// Built once per distinct source string and reused across evaluations;
/// the cost resolver caches these by exact source.
#[derive(Debug, Clone)]
pub struct ParsedFormula {
    source: String,
    variables: Vec<String>,
    ast: Expr,
}

impl ParsedFormula {
    /// The original source string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names, in first-appearance order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluate against a variable assignment.
    ///
    /// Every referenced variable must be present and finite; both are
    /// checked per variable before the AST is walked.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` naming the first absent placeholder and
    /// the names that were supplied, `BadVariable` for a NaN or infinite
    /// input, `DivisionByZero` for a zero divisor, and `NonFiniteResult`
    /// when the arithmetic itself overflows to NaN or infinity.
    pub fn evaluate(&self, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
        for name in &self.variables {
            match vars.get(name) {
                None => {
                    return Err(FormulaError::MissingVariable {
                        formula: self.source.clone(),
                        name: name.clone(),
                        supplied: vars.keys().cloned().collect(),
                    });
                }
                Some(value) if !value.is_finite() => {
                    return Err(FormulaError::BadVariable {
                        name: name.clone(),
                        value: *value,
                    });
                }
                Some(_) => {}
            }
        }

        let value = eval::evaluate(&self.ast, &self.source, vars)?;
        if !value.is_finite() {
            return Err(FormulaError::NonFiniteResult {
                formula: self.source.clone(),
            });
        }
        Ok(value)
    }
}

/// Parse and validate a formula source string.
///
/// # Errors
///
/// Returns the first failing validation stage's error: `EmptyFormula`,
/// `InvalidCharacter`, `Unbalanced`, `InvalidPlaceholder`, or `Syntax`.
pub fn parse(source: &str) -> Result<ParsedFormula, FormulaError> {
    if source.trim().is_empty() {
        return Err(FormulaError::EmptyFormula);
    }
    check_charset(source)?;
    check_balance(source)?;
    check_placeholders(source)?;

    let tokens = lexer::tokenize(source)?;
    let ast = parser::Parser::new(&tokens, source.chars().count()).parse()?;

    let mut variables = Vec::new();
    for spanned in &tokens {
        if let lexer::Token::Var(name) = &spanned.token {
            if !variables.contains(name) {
                variables.push(name.clone());
            }
        }
    }

    Ok(ParsedFormula {
        source: source.to_owned(),
        variables,
        ast,
    })
}

/// Validate a formula source string without keeping the parse.
///
/// # Errors
///
/// Same as [`parse`].
pub fn validate(source: &str) -> Result<(), FormulaError> {
    parse(source).map(|_| ())
}

/// Parse and evaluate in one step.
///
/// Convenience for one-off evaluation; hot paths should hold a
/// [`ParsedFormula`] (or go through the cost resolver's cache) instead of
/// re-parsing.
///
/// # Errors
///
/// Any [`parse`] or [`ParsedFormula::evaluate`] error.
pub fn evaluate(source: &str, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
    parse(source)?.evaluate(vars)
}

fn check_charset(source: &str) -> Result<(), FormulaError> {
    for (position, ch) in source.chars().enumerate() {
        let allowed = ch.is_ascii_alphanumeric()
            || ch.is_ascii_whitespace()
            || matches!(
                ch,
                '_' | '+'
                    | '-'
                    | '*'
                    | '/'
                    | '('
                    | ')'
                    | '{'
                    | '}'
                    | '.'
                    | '?'
                    | ':'
                    | '<'
                    | '>'
                    | '='
                    | '!'
                    | '&'
                    | '|'
            );
        if !allowed {
            return Err(FormulaError::InvalidCharacter { ch, position });
        }
    }
    Ok(())
}

fn check_balance(source: &str) -> Result<(), FormulaError> {
    let mut parens = 0_i32;
    let mut braces = 0_i32;
    for ch in source.chars() {
        match ch {
            '(' => parens += 1,
            ')' => {
                parens -= 1;
                if parens < 0 {
                    return Err(FormulaError::Unbalanced { delimiter: ')' });
                }
            }
            '{' => braces += 1,
            '}' => {
                braces -= 1;
                if braces < 0 {
                    return Err(FormulaError::Unbalanced { delimiter: '}' });
                }
            }
            _ => {}
        }
    }
    if parens != 0 {
        return Err(FormulaError::Unbalanced { delimiter: '(' });
    }
    if braces != 0 {
        return Err(FormulaError::Unbalanced { delimiter: '{' });
    }
    Ok(())
}

fn check_placeholders(source: &str) -> Result<(), FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end] != '}' {
                end += 1;
            }
            let contents: String = chars[start..end].iter().collect();
            if !lexer::is_identifier(&contents) {
                return Err(FormulaError::InvalidPlaceholder {
                    placeholder: contents,
                });
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    Ok(())
}
