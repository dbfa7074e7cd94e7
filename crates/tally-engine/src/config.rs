//! Engine configuration.
//!
//! Defaults are safe to run with: idempotency caching on with a 24 hour
//! TTL, retries on for transient storage failures, audit writes outside
//! the balance transaction.

use chrono::Duration;

use crate::retry::RetryConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Idempotency guard settings.
    pub idempotency: IdempotencyConfig,

    /// Retry policy settings.
    pub retry: RetryConfig,

    /// Audit recorder settings.
    pub audit: AuditConfig,
}

/// Idempotency guard settings.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// When disabled, every request is treated as new and nothing is cached.
    pub enabled: bool,

    /// How long a cached response stays replayable.
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::hours(24),
        }
    }
}

/// Audit recorder settings.
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    /// When `true`, audit writes share the caller's transaction context and
    /// fail the operation with it. When `false` (the default) they run
    /// outside it and a failed audit write never fails the operation.
    pub in_transaction: bool,
}
