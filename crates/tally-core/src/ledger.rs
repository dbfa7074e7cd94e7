//! Ledger entry types for tally.
//!
//! Every balance change produces exactly one ledger entry, created in the
//! same atomic unit as the mutation itself. Entries are immutable once
//! written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, EntryId};

/// An immutable record of one balance delta.
///
/// `balance_before_cents` and `balance_after_cents` are captured by the
/// storage collaborator inside the atomic step that applied the delta, so
/// `balance_after = balance_before + amount` holds against the account's
/// real balance at that instant, not a separately fetched snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID, time-ordered).
    pub id: EntryId,

    /// The account whose balance changed.
    pub account_id: AccountId,

    /// The metered action this entry accounts for (e.g. "ai-completion").
    pub action: String,

    /// What kind of operation produced this entry.
    pub kind: EntryKind,

    /// Signed delta in cents. Negative for charges, positive for grants
    /// and refunds.
    pub amount_cents: i64,

    /// Balance before the delta was applied (in cents).
    pub balance_before_cents: i64,

    /// Balance after the delta was applied (in cents).
    pub balance_after_cents: i64,

    /// Structured detail, including the cost breakdown for charges.
    pub metadata: serde_json::Value,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Check the entry's internal arithmetic invariant.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.balance_after_cents == self.balance_before_cents + self.amount_cents
    }
}

/// The kind of operation behind a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Credits deducted for a metered action.
    Charge,

    /// Credits added without a prior charge (promo, top-up, plan grant).
    Grant,

    /// Credits returned for a previously charged action.
    Refund,
}

impl EntryKind {
    /// Check if this kind adds credits (positive balance change).
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Grant | Self::Refund)
    }

    /// Check if this kind removes credits (negative balance change).
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Charge)
    }

    /// Stable lowercase name, as stored and logged.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Grant => "grant",
            Self::Refund => "refund",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
