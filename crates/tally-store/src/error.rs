//! Error types for tally storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up (e.g. "account").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A debit would drive the balance below zero.
    #[error("insufficient funds: balance={balance_cents}, required={required_cents}")]
    InsufficientFunds {
        /// Current balance in cents.
        balance_cents: i64,
        /// Required amount in cents.
        required_cents: i64,
    },

    /// A record already exists under this unique key.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// The key that collided.
        key: String,
    },

    /// The backend is temporarily unreachable or overloaded.
    ///
    /// This is the transient class: callers may retry these per their
    /// retry policy. All other variants are permanent.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Backend status code, when the backend has one.
        code: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// Backend operation failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "storage_not_found",
            Self::InsufficientFunds { .. } => "storage_insufficient_funds",
            Self::DuplicateKey { .. } => "storage_duplicate_key",
            Self::Unavailable { .. } => "storage_unavailable",
            Self::Backend(_) => "storage_backend",
            Self::Serialization(_) => "storage_serialization",
        }
    }

    /// Check whether this error is in the transient class.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Backend status code, when one was reported.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unavailable { code, .. } => *code,
            _ => None,
        }
    }
}
