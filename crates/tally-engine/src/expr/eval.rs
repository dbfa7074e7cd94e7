//! AST evaluation under IEEE-754 `f64` semantics.

use std::collections::BTreeMap;

use super::error::FormulaError;
use super::parser::{BinOp, Expr};

/// Walk the AST against a variable assignment.
///
/// Callers pre-check that every referenced variable is present and finite;
/// the map lookup here still fails soundly if they don't.
pub(crate) fn evaluate(
    expr: &Expr,
    formula: &str,
    vars: &BTreeMap<String, f64>,
) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Var(name) => {
            vars.get(name)
                .copied()
                .ok_or_else(|| FormulaError::MissingVariable {
                    formula: formula.to_owned(),
                    name: name.clone(),
                    supplied: vars.keys().cloned().collect(),
                })
        }
        Expr::Neg(inner) => Ok(-evaluate(inner, formula, vars)?),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, formula, vars)?;
            let rhs = evaluate(rhs, formula, vars)?;
            apply(*op, lhs, rhs, formula)
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            let cond = evaluate(cond, formula, vars)?;
            if is_truthy(cond) {
                evaluate(then, formula, vars)
            } else {
                evaluate(otherwise, formula, vars)
            }
        }
    }
}

// Non-zero condition selects the then-branch.
#[allow(clippy::float_cmp)]
fn is_truthy(cond: f64) -> bool {
    cond != 0.0
}

#[allow(clippy::float_cmp)]
fn apply(op: BinOp, lhs: f64, rhs: f64, formula: &str) -> Result<f64, FormulaError> {
    let value = match op {
        BinOp::Add => lhs + rhs,
        BinOp::Sub => lhs - rhs,
        BinOp::Mul => lhs * rhs,
        BinOp::Div => {
            if rhs == 0.0 {
                return Err(FormulaError::DivisionByZero {
                    formula: formula.to_owned(),
                });
            }
            lhs / rhs
        }
        BinOp::Lt => from_bool(lhs < rhs),
        BinOp::Gt => from_bool(lhs > rhs),
        BinOp::Le => from_bool(lhs <= rhs),
        BinOp::Ge => from_bool(lhs >= rhs),
        BinOp::Eq => from_bool(lhs == rhs),
        BinOp::Ne => from_bool(lhs != rhs),
    };
    Ok(value)
}

const fn from_bool(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;
    use crate::expr::parser::Parser;

    fn eval(source: &str, vars: &[(&str, f64)]) -> Result<f64, FormulaError> {
        let tokens = tokenize(source).unwrap();
        let ast = Parser::new(&tokens, source.chars().count()).parse().unwrap();
        let vars: BTreeMap<String, f64> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), *v))
            .collect();
        evaluate(&ast, source, &vars)
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(eval("{a} < {b}", &[("a", 1.0), ("b", 2.0)]).unwrap(), 1.0);
        assert_eq!(eval("{a} > {b}", &[("a", 1.0), ("b", 2.0)]).unwrap(), 0.0);
        assert_eq!(eval("{a} == {b}", &[("a", 3.0), ("b", 3.0)]).unwrap(), 1.0);
        assert_eq!(eval("{a} != {b}", &[("a", 3.0), ("b", 3.0)]).unwrap(), 0.0);
        assert_eq!(eval("{a} <= {a}", &[("a", 3.0)]).unwrap(), 1.0);
        assert_eq!(eval("{a} >= 4", &[("a", 3.0)]).unwrap(), 0.0);
    }

    #[test]
    fn ternary_selects_on_truthiness() {
        assert_eq!(eval("2 ? 3 : 4", &[]).unwrap(), 3.0);
        assert_eq!(eval("0 ? 3 : 4", &[]).unwrap(), 4.0);
        assert_eq!(eval("-1 ? 3 : 4", &[]).unwrap(), 3.0);
    }

    #[test]
    fn double_negation() {
        assert_eq!(eval("--5", &[]).unwrap(), 5.0);
        assert_eq!(eval("5--3", &[]).unwrap(), 8.0);
    }

    #[test]
    fn division_by_zero_divisor() {
        assert!(matches!(
            eval("1/{d}", &[("d", 0.0)]),
            Err(FormulaError::DivisionByZero { .. })
        ));
        // -0.0 compares equal to 0.0 and is rejected the same way
        assert!(matches!(
            eval("1/{d}", &[("d", -0.0)]),
            Err(FormulaError::DivisionByZero { .. })
        ));
    }
}
