//! Retry policy for transient storage failures.
//!
//! Delays grow exponentially: the first retry waits `initial_delay`, each
//! further retry multiplies by `multiplier`, and the wait never exceeds
//! `max_delay`. Which errors qualify is driven by [`RetryRule`] matchers;
//! by default only errors carrying the `storage_unavailable` code retry.
//! Non-matching errors propagate immediately without burning attempts.

use std::future::Future;
use std::time::Duration;

use crate::error::{CreditError, Result};

/// Matches errors that should be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryRule {
    /// Match on the stable error code.
    Code(String),

    /// Match when the error display contains a substring.
    MessageContains(String),

    /// Match on the mapped status code.
    Status(u16),
}

/// Retry behaviour knobs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// When disabled, every operation runs exactly once.
    pub enabled: bool,

    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub initial_delay: Duration,

    /// Growth factor applied to each further wait.
    pub multiplier: f64,

    /// Upper bound on any single wait.
    pub max_delay: Duration,

    /// An error retries when any rule matches.
    pub retry_on: Vec<RetryRule>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
            retry_on: vec![RetryRule::Code("storage_unavailable".into())],
        }
    }
}

impl RetryConfig {
    /// The wait before the given attempt number. Attempt 1 is the first
    /// try and never waits; attempt 2 waits `initial_delay`, attempt 3
    /// waits `initial_delay * multiplier`, and so on up to `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let raw = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether the error matches any retry rule.
    #[must_use]
    pub fn is_retryable(&self, err: &CreditError) -> bool {
        self.retry_on.iter().any(|rule| match rule {
            RetryRule::Code(code) => err.code() == code,
            RetryRule::MessageContains(needle) => err.to_string().contains(needle.as_str()),
            RetryRule::Status(status) => err.status_code() == Some(*status),
        })
    }
}

/// Runs fallible async operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Build a policy from explicit configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op`, retrying matching failures with exponential backoff.
    /// `what` names the operation in log output.
    ///
    /// # Errors
    ///
    /// Returns the final error once attempts are exhausted, or the first
    /// error that matches no retry rule.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        Self::run_with(what, &self.config, op).await
    }

    /// Run `op` under an explicit configuration, bypassing the policy's own.
    ///
    /// # Errors
    ///
    /// Same as [`RetryPolicy::run`].
    pub async fn run_with<T, F, Fut>(what: &str, config: &RetryConfig, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !config.enabled {
            return op().await;
        }

        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(what = %what, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= config.max_attempts || !config.is_retryable(&err) {
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = config.delay_for_attempt(attempt);
                    tracing::warn!(
                        what = %what,
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
