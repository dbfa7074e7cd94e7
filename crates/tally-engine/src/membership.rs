//! Membership tier validation.
//!
//! Tiers are open string labels ranked by a configured [`TierLadder`]:
//! position in the ladder is rank, higher outranks lower. An account whose
//! tier has expired is treated as having no tier at all, whatever its
//! stored label says.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::Account;

use crate::error::{CreditError, Result};

/// Ordered tier names, lowest rank first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierLadder {
    tiers: Vec<String>,
}

impl TierLadder {
    /// Build a ladder from tier names in ascending rank order.
    #[must_use]
    pub fn new(tiers: Vec<String>) -> Self {
        Self { tiers }
    }

    /// Rank of a tier name, if the ladder knows it.
    #[must_use]
    pub fn rank(&self, tier: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t == tier)
    }

    /// The configured tier names, ascending.
    #[must_use]
    pub fn tiers(&self) -> &[String] {
        &self.tiers
    }
}

/// Why a membership check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The account has never had a tier.
    NoActiveMembership,

    /// The account's tier label exists but its expiry has passed.
    MembershipExpired,

    /// The account's live tier ranks below the requirement.
    InsufficientTier,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoActiveMembership => "no active membership",
            Self::MembershipExpired => "membership expired",
            Self::InsufficientTier => "insufficient tier",
        };
        f.write_str(text)
    }
}

/// Outcome of a membership check.
#[derive(Debug, Clone)]
pub struct MembershipCheck {
    /// Whether the requirement is satisfied.
    pub valid: bool,

    /// Why it isn't, when `valid` is false.
    pub reason: Option<DenialReason>,

    /// The tier the account effectively holds (None once expired).
    pub effective_tier: Option<String>,

    /// Whether the account's stored tier has expired.
    pub expired: bool,
}

/// Validates account tiers against per-request requirements.
#[derive(Debug, Clone)]
pub struct MembershipValidator {
    ladder: TierLadder,
}

impl MembershipValidator {
    /// Create a validator over a tier ladder.
    #[must_use]
    pub fn new(ladder: TierLadder) -> Self {
        Self { ladder }
    }

    /// Validate against the current clock.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::UnknownTier` if either tier name is not in the
    /// ladder.
    pub fn validate(&self, account: &Account, required: Option<&str>) -> Result<MembershipCheck> {
        self.validate_at(account, required, Utc::now())
    }

    /// Validate against an explicit clock.
    ///
    /// No requirement always validates. A required tier against an account
    /// with no effective tier fails with `MembershipExpired` when expiry
    /// caused the downgrade and `NoActiveMembership` otherwise. Two live
    /// tiers compare by ladder rank.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::UnknownTier` if either tier name is not in the
    /// ladder.
    pub fn validate_at(
        &self,
        account: &Account,
        required: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MembershipCheck> {
        let expired = account.is_tier_expired_at(now);
        let effective_tier = account.effective_tier_at(now).map(str::to_owned);

        let Some(required) = required else {
            return Ok(MembershipCheck {
                valid: true,
                reason: None,
                effective_tier,
                expired,
            });
        };

        let Some(effective) = effective_tier.as_deref() else {
            let reason = if expired && account.tier.is_some() {
                DenialReason::MembershipExpired
            } else {
                DenialReason::NoActiveMembership
            };
            return Ok(MembershipCheck {
                valid: false,
                reason: Some(reason),
                effective_tier,
                expired,
            });
        };

        let required_rank = self
            .ladder
            .rank(required)
            .ok_or_else(|| CreditError::UnknownTier {
                tier: required.to_owned(),
            })?;
        let effective_rank =
            self.ladder
                .rank(effective)
                .ok_or_else(|| CreditError::UnknownTier {
                    tier: effective.to_owned(),
                })?;

        if effective_rank >= required_rank {
            Ok(MembershipCheck {
                valid: true,
                reason: None,
                effective_tier,
                expired,
            })
        } else {
            Ok(MembershipCheck {
                valid: false,
                reason: Some(DenialReason::InsufficientTier),
                effective_tier,
                expired,
            })
        }
    }
}
