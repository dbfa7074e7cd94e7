//! Error types for formula parsing and evaluation.

/// Errors that can occur while validating, parsing, or evaluating a formula.
///
/// The first five variants are syntax-class errors raised at construction
/// time; the rest are evaluation-class errors raised when a parsed formula
/// meets a concrete variable assignment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// The source string is empty or whitespace-only.
    #[error("formula is empty")]
    EmptyFormula,

    /// A character outside the allowed set.
    #[error("invalid character '{ch}' at position {position}")]
    InvalidCharacter {
        /// The offending character.
        ch: char,
        /// Character offset into the source.
        position: usize,
    },

    /// Parentheses or placeholder braces don't balance.
    #[error("unbalanced '{delimiter}' in formula")]
    Unbalanced {
        /// The delimiter that failed the running-count check.
        delimiter: char,
    },

    /// A `{...}` group whose contents are not a valid identifier.
    #[error("invalid placeholder {{{placeholder}}}")]
    InvalidPlaceholder {
        /// The contents of the offending group.
        placeholder: String,
    },

    /// The source failed to parse as an expression.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Character offset into the source.
        position: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// A referenced variable was not supplied.
    #[error("formula '{formula}' references missing variable '{name}' (supplied: {supplied:?})")]
    MissingVariable {
        /// The formula source.
        formula: String,
        /// The variable that was not supplied.
        name: String,
        /// The variable names that were supplied.
        supplied: Vec<String>,
    },

    /// A supplied variable value is NaN or infinite.
    #[error("variable '{name}' is not a finite number: {value}")]
    BadVariable {
        /// The offending variable name.
        name: String,
        /// The value it carried.
        value: f64,
    },

    /// A division met a zero divisor.
    #[error("division by zero while evaluating '{formula}'")]
    DivisionByZero {
        /// The formula source.
        formula: String,
    },

    /// Evaluation completed but produced NaN or infinity.
    #[error("formula '{formula}' produced a non-finite result")]
    NonFiniteResult {
        /// The formula source.
        formula: String,
    },
}

impl FormulaError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyFormula => "empty_formula",
            Self::InvalidCharacter { .. } => "invalid_character",
            Self::Unbalanced { .. } => "unbalanced_delimiters",
            Self::InvalidPlaceholder { .. } => "invalid_placeholder",
            Self::Syntax { .. } => "formula_syntax",
            Self::MissingVariable { .. } => "missing_variable",
            Self::BadVariable { .. } => "bad_variable",
            Self::DivisionByZero { .. } => "division_by_zero",
            Self::NonFiniteResult { .. } => "non_finite_result",
        }
    }

    /// Check whether this is an evaluation-class error (as opposed to a
    /// syntax-class error raised at construction time).
    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable { .. }
                | Self::BadVariable { .. }
                | Self::DivisionByZero { .. }
                | Self::NonFiniteResult { .. }
        )
    }
}
