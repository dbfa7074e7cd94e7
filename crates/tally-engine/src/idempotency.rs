//! Idempotency guard.
//!
//! Callers tag write operations with a key; the guard caches the response
//! payload under that key together with a fingerprint of the request
//! parameters. A repeat of the same request replays the cached payload
//! without touching balances, while a reuse of the key with different
//! parameters is rejected as a conflict. Records expire lazily after the
//! configured TTL.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tally_store::{NewIdempotencyRecord, Store};

use crate::config::IdempotencyConfig;
use crate::error::Result;

/// Outcome of an idempotency lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// No live record for the key; proceed with the operation.
    Miss,

    /// Same key, same parameters: the cached response payload.
    Replay(serde_json::Value),

    /// Same key, different parameters.
    Conflict,
}

/// Fingerprint of the semantic request parameters.
///
/// The JSON value serializes with object keys in sorted order, so two
/// parameter sets that are semantically equal hash identically regardless
/// of construction order.
#[must_use]
pub fn request_fingerprint(params: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks and saves idempotency records around write operations.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyGuard {
    config: IdempotencyConfig,
}

impl IdempotencyGuard {
    /// Build a guard from explicit configuration.
    #[must_use]
    pub const fn new(config: IdempotencyConfig) -> Self {
        Self { config }
    }

    /// Look up the key before executing an operation.
    ///
    /// A disabled guard always reports a miss, as does an absent or
    /// expired record.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from the lookup.
    pub async fn check<S: Store>(
        &self,
        store: &S,
        key: &str,
        fingerprint: &str,
        ctx: Option<&S::Context>,
    ) -> Result<IdempotencyCheck> {
        if !self.config.enabled {
            return Ok(IdempotencyCheck::Miss);
        }
        let record = match store.get_idempotency_record(key, ctx).await? {
            Some(record) => record,
            None => return Ok(IdempotencyCheck::Miss),
        };
        // Lookup already filters expired records; keep a second check here
        // so a stale read can never replay.
        if !record.is_live_at(Utc::now()) {
            return Ok(IdempotencyCheck::Miss);
        }
        if record.fingerprint == fingerprint {
            Ok(IdempotencyCheck::Replay(record.payload))
        } else {
            Ok(IdempotencyCheck::Conflict)
        }
    }

    /// Cache the response payload after a successful operation.
    ///
    /// A disabled guard stores nothing.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from the write. Callers decide whether
    /// that fails the operation; the engine logs and swallows it.
    pub async fn save<S: Store>(
        &self,
        store: &S,
        key: &str,
        fingerprint: &str,
        payload: serde_json::Value,
        ctx: Option<&S::Context>,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let expires_at = Utc::now() + self.config.ttl;
        store
            .create_idempotency_record(
                NewIdempotencyRecord {
                    key: key.to_owned(),
                    fingerprint: fingerprint.to_owned(),
                    payload,
                    expires_at,
                },
                ctx,
            )
            .await?;
        Ok(())
    }
}
