//! Error types for the credit engine.

use tally_store::StoreError;

use crate::expr::FormulaError;
use crate::membership::DenialReason;

/// Result type for credit engine operations.
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can occur in credit engine operations.
#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    /// No pricing configured for the requested action.
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The action that has no pricing.
        action: String,
    },

    /// A tier name not present in the configured tier ladder.
    #[error("unknown tier: {tier}")]
    UnknownTier {
        /// The unrecognized tier name.
        tier: String,
    },

    /// The cost spec failed construction-time validation.
    #[error("invalid cost spec for action '{action}': {detail}")]
    InvalidCostSpec {
        /// The offending action.
        action: String,
        /// What was wrong with it.
        detail: String,
    },

    /// Formula validation or evaluation failed.
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// The account cannot cover the charge.
    #[error("insufficient balance: balance={balance_cents}, required={required_cents}")]
    InsufficientBalance {
        /// Current balance in cents.
        balance_cents: i64,
        /// Required amount in cents.
        required_cents: i64,
    },

    /// The account's membership does not satisfy the action's requirement.
    #[error("membership denied: {reason} (required tier: {required})")]
    MembershipDenied {
        /// Why the membership check failed.
        reason: DenialReason,
        /// The tier the action required.
        required: String,
    },

    /// An idempotency key was reused with different request parameters.
    #[error("idempotency key reused with different parameters: {key}")]
    IdempotencyConflict {
        /// The conflicting key.
        key: String,
    },

    /// A grant or refund carried a negative amount.
    #[error("invalid amount: {amount_cents}")]
    InvalidAmount {
        /// The rejected amount in cents.
        amount_cents: i64,
    },

    /// Account not found.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account ID that was not found.
        account_id: String,
    },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Broad classification of a [`CreditError`].
///
/// Only infrastructure errors are candidates for retry; the retry policy's
/// allow-list makes the final call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration (unknown action/tier, invalid spec, formula
    /// syntax). Fatal to the call that triggers it.
    Configuration,

    /// A business-rule rejection signaled to the caller.
    Domain,

    /// A formula met a variable assignment it could not evaluate.
    Evaluation,

    /// The storage collaborator failed.
    Infrastructure,
}

impl CreditError {
    /// Stable machine-readable code, used by retry allow-list matching.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownAction { .. } => "unknown_action",
            Self::UnknownTier { .. } => "unknown_tier",
            Self::InvalidCostSpec { .. } => "invalid_cost_spec",
            Self::Formula(e) => e.code(),
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::MembershipDenied { .. } => "membership_denied",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::Storage(e) => e.code(),
        }
    }

    /// Which broad class this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownAction { .. }
            | Self::UnknownTier { .. }
            | Self::InvalidCostSpec { .. } => ErrorCategory::Configuration,
            Self::Formula(e) => {
                if e.is_evaluation() {
                    ErrorCategory::Evaluation
                } else {
                    ErrorCategory::Configuration
                }
            }
            Self::InsufficientBalance { .. }
            | Self::MembershipDenied { .. }
            | Self::IdempotencyConflict { .. }
            | Self::InvalidAmount { .. }
            | Self::AccountNotFound { .. } => ErrorCategory::Domain,
            Self::Storage(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Numeric status code reported by the backend, when one exists.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Storage(e) => e.status_code(),
            _ => None,
        }
    }
}
