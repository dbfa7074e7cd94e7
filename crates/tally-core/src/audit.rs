//! Audit trail types.
//!
//! Every attempted operation produces one audit entry, success or failure.
//! Failed attempts never touch balances, so the audit trail is the only
//! record they leave.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, AuditId, EntryKind};

/// One record of an attempted operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique audit ID (ULID, time-ordered).
    pub id: AuditId,

    /// The account the operation targeted.
    pub account_id: AccountId,

    /// The metered action involved.
    pub action: String,

    /// What kind of operation was attempted.
    pub kind: EntryKind,

    /// Whether the attempt succeeded or failed.
    pub status: AuditStatus,

    /// Amount involved in cents, when one was known at failure time.
    pub amount_cents: Option<i64>,

    /// Error description for failed attempts.
    pub error: Option<String>,

    /// Structured detail mirrored from the request.
    pub metadata: serde_json::Value,

    /// When the attempt was recorded.
    pub created_at: DateTime<Utc>,
}

/// Outcome of an audited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The operation completed and the balance was mutated.
    Success,

    /// The operation was rejected or failed before mutation.
    Failed,
}

impl AuditStatus {
    /// Stable lowercase name, as stored and logged.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuditStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(AuditStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn failed_entry_roundtrip() {
        let entry = AuditEntry {
            id: AuditId::generate(),
            account_id: AccountId::generate(),
            action: "ai-completion".into(),
            kind: EntryKind::Charge,
            status: AuditStatus::Failed,
            amount_cents: None,
            error: Some("insufficient funds".into()),
            metadata: serde_json::json!({"request": "abc"}),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, AuditStatus::Failed);
        assert_eq!(back.error.as_deref(), Some("insufficient funds"));
    }
}
