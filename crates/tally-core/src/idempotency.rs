//! Idempotency record type.
//!
//! Completed operations are remembered under their caller-supplied key so a
//! retried request replays the original result instead of double-applying.
//! Records expire lazily: an expired record is treated as absent wherever it
//! is read, whether or not storage has physically removed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed operation remembered under its idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The caller-supplied key.
    pub key: String,

    /// SHA-256 hex fingerprint of the request's semantic parameters.
    ///
    /// A replay under the same key must carry the same fingerprint;
    /// a mismatch is a conflict, not a replay.
    pub fingerprint: String,

    /// Serialized result of the original operation.
    pub payload: serde_json::Value,

    /// When the record was written.
    pub created_at: DateTime<Utc>,

    /// When the record stops shielding retries.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Check whether the record has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Check whether the record still shields retries as of `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
    }
}
