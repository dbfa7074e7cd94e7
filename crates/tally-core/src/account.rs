//! Account types for tally.
//!
//! This module defines the balance-holding account the engine debits and
//! credits. Accounts are owned by the storage collaborator; the engine only
//! reads them and requests deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A credit account.
///
/// The account tracks the current balance and the optional membership tier
/// used for pricing and access gating. Balances are integer cents
/// (1 credit = 100 cents) so accounting never accumulates float drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account ID (assigned by the host platform).
    pub id: AccountId,

    /// Current balance in cents. Never driven negative by this engine.
    pub balance_cents: i64,

    /// Membership tier label, if any (e.g. "basic", "premium").
    ///
    /// The label is an open string; rank ordering lives in the engine's
    /// tier ladder configuration, not here.
    pub tier: Option<String>,

    /// When the membership tier expires, if it expires at all.
    pub tier_expires_at: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance and no membership.
    #[must_use]
    pub fn new(id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance_cents: 0,
            tier: None,
            tier_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the account can cover a deduction.
    #[must_use]
    pub fn has_sufficient_balance(&self, amount_cents: i64) -> bool {
        self.balance_cents >= amount_cents
    }

    /// Check whether the membership tier is expired as of `now`.
    ///
    /// An account with no expiration timestamp never expires. Expiry is
    /// strict: a tier expiring exactly at `now` is still live.
    #[must_use]
    pub fn is_tier_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.tier_expires_at.is_some_and(|expires| expires < now)
    }

    /// The tier that is actually in effect as of `now`.
    ///
    /// Returns `None` when no tier is set or when the stored tier has
    /// expired -- an expired membership prices and gates like no membership
    /// at all.
    #[must_use]
    pub fn effective_tier_at(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.is_tier_expired_at(now) {
            None
        } else {
            self.tier.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(AccountId::generate());
        assert_eq!(account.balance_cents, 0);
        assert!(account.tier.is_none());
        assert!(account.tier_expires_at.is_none());
    }

    #[test]
    fn account_sufficient_balance() {
        let mut account = Account::new(AccountId::generate());
        account.balance_cents = 1000;

        assert!(account.has_sufficient_balance(500));
        assert!(account.has_sufficient_balance(1000));
        assert!(!account.has_sufficient_balance(1001));
    }

    #[test]
    fn tier_without_expiry_never_expires() {
        let mut account = Account::new(AccountId::generate());
        account.tier = Some("premium".into());

        let now = Utc::now();
        assert!(!account.is_tier_expired_at(now));
        assert_eq!(account.effective_tier_at(now), Some("premium"));
    }

    #[test]
    fn expired_tier_is_not_effective() {
        let now = Utc::now();
        let mut account = Account::new(AccountId::generate());
        account.tier = Some("premium".into());
        account.tier_expires_at = Some(now - Duration::days(1));

        assert!(account.is_tier_expired_at(now));
        assert_eq!(account.effective_tier_at(now), None);
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let now = Utc::now();
        let mut account = Account::new(AccountId::generate());
        account.tier = Some("basic".into());
        account.tier_expires_at = Some(now);

        // Expiring exactly now is still live; only a timestamp strictly in
        // the past downgrades the tier.
        assert!(!account.is_tier_expired_at(now));
        assert_eq!(account.effective_tier_at(now), Some("basic"));
    }
}
