//! Credit engine orchestrator.
//!
//! [`CreditEngine`] runs the full pipeline for each write operation:
//!
//! 1. Idempotency check (replay or conflict short-circuits here)
//! 2. Account fetch
//! 3. Membership validation against the required tier
//! 4. Cost resolution against the effective tier (charges only)
//! 5. Atomic balance mutation with its ledger entry, retried on
//!    transient storage failures
//! 6. Audit entry
//! 7. Idempotency save of the receipt
//!
//! Failures before the mutation are audited and returned. Failures after
//! the mutation committed (audit in its default mode, idempotency save)
//! are logged and swallowed so the caller still gets the receipt for work
//! that was actually done.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{Account, AccountId, EntryId, EntryKind, LedgerEntry};
use tally_store::{LedgerDraft, LedgerQuery, Store, StoreError};

use crate::audit::AuditRecorder;
use crate::config::EngineConfig;
use crate::cost::{CostBreakdown, CostResolver, CostSpec};
use crate::error::{CreditError, Result};
use crate::expr::ParsedFormula;
use crate::idempotency::{request_fingerprint, IdempotencyCheck, IdempotencyGuard};
use crate::membership::{DenialReason, MembershipValidator, TierLadder};
use crate::retry::RetryPolicy;

/// A charge request. Cost comes from the pricing spec, optionally driven
/// by formula variables.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// The account to charge.
    pub account_id: AccountId,

    /// The metered action.
    pub action: String,

    /// Formula variables, for dynamically priced actions.
    pub variables: Option<BTreeMap<String, f64>>,

    /// Minimum tier the account must hold.
    pub required_tier: Option<String>,

    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,

    /// Free-form detail mirrored into ledger and audit entries.
    pub metadata: serde_json::Value,
}

impl ChargeRequest {
    /// A charge for `action` with no variables, no tier requirement, and
    /// no idempotency key.
    pub fn new(account_id: AccountId, action: impl Into<String>) -> Self {
        Self {
            account_id,
            action: action.into(),
            variables: None,
            required_tier: None,
            idempotency_key: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach formula variables.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, f64>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Require a minimum membership tier.
    #[must_use]
    pub fn with_required_tier(mut self, tier: impl Into<String>) -> Self {
        self.required_tier = Some(tier.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A grant or refund request. The amount is explicit; pricing never runs.
#[derive(Debug, Clone)]
pub struct CreditRequest {
    /// The account to credit.
    pub account_id: AccountId,

    /// The action label recorded on the entry.
    pub action: String,

    /// Amount to add, in cents. Must be non-negative.
    pub amount_cents: i64,

    /// Minimum tier the account must hold.
    pub required_tier: Option<String>,

    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,

    /// Free-form detail mirrored into ledger and audit entries.
    pub metadata: serde_json::Value,
}

impl CreditRequest {
    /// A credit of `amount_cents` for `action`.
    pub fn new(account_id: AccountId, action: impl Into<String>, amount_cents: i64) -> Self {
        Self {
            account_id,
            action: action.into(),
            amount_cents,
            required_tier: None,
            idempotency_key: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Require a minimum membership tier.
    #[must_use]
    pub fn with_required_tier(mut self, tier: impl Into<String>) -> Self {
        self.required_tier = Some(tier.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What a completed operation looked like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReceipt {
    /// The ledger entry the operation created.
    pub entry_id: EntryId,

    /// The account that was mutated.
    pub account_id: AccountId,

    /// The metered action.
    pub action: String,

    /// What kind of operation ran.
    pub kind: EntryKind,

    /// Signed delta in cents.
    pub amount_cents: i64,

    /// Balance before the delta (in cents).
    pub balance_before_cents: i64,

    /// Balance after the delta (in cents).
    pub balance_after_cents: i64,

    /// Cost breakdown, present on charges.
    pub cost: Option<CostBreakdown>,

    /// Whether this receipt was replayed from the idempotency cache.
    #[serde(default)]
    pub replayed: bool,

    /// When the ledger entry was created.
    pub created_at: DateTime<Utc>,
}

/// The transactional credit core.
///
/// Generic over its storage collaborator; all balance arithmetic happens
/// inside [`Store::apply_balance_delta`], so two engines sharing a store
/// cannot double-spend.
pub struct CreditEngine<S: Store> {
    store: Arc<S>,
    resolver: CostResolver,
    membership: MembershipValidator,
    guard: IdempotencyGuard,
    retry: RetryPolicy,
    audit: AuditRecorder,
}

impl<S: Store> CreditEngine<S> {
    /// Build an engine over a store.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InvalidCostSpec` or a formula error if the
    /// pricing spec does not validate.
    pub fn new(
        store: Arc<S>,
        cost_spec: CostSpec,
        ladder: TierLadder,
        config: EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            resolver: CostResolver::new(cost_spec)?,
            membership: MembershipValidator::new(ladder),
            guard: IdempotencyGuard::new(config.idempotency),
            retry: RetryPolicy::new(config.retry),
            audit: AuditRecorder::new(config.audit),
        })
    }

    /// The storage collaborator.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Charge an account for an action.
    ///
    /// The price comes from the pricing spec, resolved against the tier
    /// the account effectively holds (an expired tier prices as no tier).
    ///
    /// # Errors
    ///
    /// See the crate error taxonomy; notable cases are
    /// `CreditError::InsufficientBalance`, `CreditError::MembershipDenied`,
    /// and `CreditError::IdempotencyConflict`.
    pub async fn charge(
        &self,
        request: ChargeRequest,
        ctx: Option<&S::Context>,
    ) -> Result<OperationReceipt> {
        let store = self.store.as_ref();
        let kind = EntryKind::Charge;
        let fingerprint = request_fingerprint(&serde_json::json!({
            "kind": kind.as_str(),
            "account_id": request.account_id,
            "action": request.action,
            "variables": request.variables,
            "required_tier": request.required_tier,
        }));

        if let Some(key) = &request.idempotency_key {
            match self.guard.check(store, key, &fingerprint, ctx).await {
                Ok(IdempotencyCheck::Miss) => {}
                Ok(IdempotencyCheck::Replay(payload)) => {
                    return match replayed_receipt(key, payload) {
                        Ok(receipt) => Ok(receipt),
                        Err(err) => Err(self
                            .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                            .await),
                    };
                }
                Ok(IdempotencyCheck::Conflict) => {
                    let err = CreditError::IdempotencyConflict { key: key.clone() };
                    return Err(self
                        .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                        .await);
                }
                Err(err) => {
                    return Err(self
                        .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                        .await);
                }
            }
        }

        let account = match store.fetch_account(&request.account_id, ctx).await {
            Ok(account) => account,
            Err(err) => {
                let err = map_store_error(err, &request.account_id);
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };

        let check = match self
            .membership
            .validate(&account, request.required_tier.as_deref())
        {
            Ok(check) => check,
            Err(err) => {
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };
        if !check.valid {
            let err = CreditError::MembershipDenied {
                reason: check.reason.unwrap_or(DenialReason::NoActiveMembership),
                required: request.required_tier.clone().unwrap_or_default(),
            };
            return Err(self
                .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                .await);
        }

        // Price against the tier the account actually holds right now, not
        // the stored tier.
        let breakdown = match self.resolver.explain(
            &request.action,
            check.effective_tier.as_deref(),
            request.variables.as_ref(),
        ) {
            Ok(breakdown) => breakdown,
            Err(err) => {
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };
        let amount_cents = -breakdown.final_cents;
        let ledger_metadata = match charge_metadata(&request.metadata, &breakdown) {
            Ok(metadata) => metadata,
            Err(err) => {
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };

        let outcome = match self
            .retry
            .run("charge", || {
                let draft = LedgerDraft {
                    action: request.action.clone(),
                    kind,
                    metadata: ledger_metadata.clone(),
                };
                let account_id = request.account_id;
                async move {
                    store
                        .apply_balance_delta(&account_id, amount_cents, draft, ctx)
                        .await
                        .map_err(|err| map_store_error(err, &account_id))
                }
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self
                    .fail(
                        &request.account_id,
                        &request.action,
                        kind,
                        Some(amount_cents),
                        err,
                        &request.metadata,
                        ctx,
                    )
                    .await);
            }
        };

        self.audit
            .record_success(
                store,
                request.account_id,
                &request.action,
                kind,
                outcome.entry.amount_cents,
                request.metadata.clone(),
                ctx,
            )
            .await?;

        let receipt = receipt_for(&outcome.entry, Some(breakdown));
        if let Some(key) = &request.idempotency_key {
            self.cache_receipt(key, &fingerprint, &receipt, ctx).await;
        }

        tracing::info!(
            account_id = %receipt.account_id,
            action = %receipt.action,
            amount_cents = receipt.amount_cents,
            balance_cents = receipt.balance_after_cents,
            "Charge applied"
        );
        Ok(receipt)
    }

    /// Grant credits to an account.
    ///
    /// # Errors
    ///
    /// `CreditError::InvalidAmount` for a negative amount, otherwise the
    /// same cases as a charge minus cost resolution.
    pub async fn grant(
        &self,
        request: CreditRequest,
        ctx: Option<&S::Context>,
    ) -> Result<OperationReceipt> {
        self.credit_operation(EntryKind::Grant, request, ctx).await
    }

    /// Refund credits to an account.
    ///
    /// # Errors
    ///
    /// Same as [`CreditEngine::grant`].
    pub async fn refund(
        &self,
        request: CreditRequest,
        ctx: Option<&S::Context>,
    ) -> Result<OperationReceipt> {
        self.credit_operation(EntryKind::Refund, request, ctx).await
    }

    async fn credit_operation(
        &self,
        kind: EntryKind,
        request: CreditRequest,
        ctx: Option<&S::Context>,
    ) -> Result<OperationReceipt> {
        let store = self.store.as_ref();

        if request.amount_cents < 0 {
            let err = CreditError::InvalidAmount {
                amount_cents: request.amount_cents,
            };
            return Err(self
                .fail(
                    &request.account_id,
                    &request.action,
                    kind,
                    Some(request.amount_cents),
                    err,
                    &request.metadata,
                    ctx,
                )
                .await);
        }

        let fingerprint = request_fingerprint(&serde_json::json!({
            "kind": kind.as_str(),
            "account_id": request.account_id,
            "action": request.action,
            "amount_cents": request.amount_cents,
            "required_tier": request.required_tier,
        }));

        if let Some(key) = &request.idempotency_key {
            match self.guard.check(store, key, &fingerprint, ctx).await {
                Ok(IdempotencyCheck::Miss) => {}
                Ok(IdempotencyCheck::Replay(payload)) => {
                    return match replayed_receipt(key, payload) {
                        Ok(receipt) => Ok(receipt),
                        Err(err) => Err(self
                            .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                            .await),
                    };
                }
                Ok(IdempotencyCheck::Conflict) => {
                    let err = CreditError::IdempotencyConflict { key: key.clone() };
                    return Err(self
                        .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                        .await);
                }
                Err(err) => {
                    return Err(self
                        .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                        .await);
                }
            }
        }

        let account = match store.fetch_account(&request.account_id, ctx).await {
            Ok(account) => account,
            Err(err) => {
                let err = map_store_error(err, &request.account_id);
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };

        let check = match self
            .membership
            .validate(&account, request.required_tier.as_deref())
        {
            Ok(check) => check,
            Err(err) => {
                return Err(self
                    .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                    .await);
            }
        };
        if !check.valid {
            let err = CreditError::MembershipDenied {
                reason: check.reason.unwrap_or(DenialReason::NoActiveMembership),
                required: request.required_tier.clone().unwrap_or_default(),
            };
            return Err(self
                .fail(&request.account_id, &request.action, kind, None, err, &request.metadata, ctx)
                .await);
        }

        let amount_cents = request.amount_cents;
        let ledger_metadata = wrap_metadata(&request.metadata);
        let outcome = match self
            .retry
            .run(kind.as_str(), || {
                let draft = LedgerDraft {
                    action: request.action.clone(),
                    kind,
                    metadata: ledger_metadata.clone(),
                };
                let account_id = request.account_id;
                async move {
                    store
                        .apply_balance_delta(&account_id, amount_cents, draft, ctx)
                        .await
                        .map_err(|err| map_store_error(err, &account_id))
                }
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self
                    .fail(
                        &request.account_id,
                        &request.action,
                        kind,
                        Some(amount_cents),
                        err,
                        &request.metadata,
                        ctx,
                    )
                    .await);
            }
        };

        self.audit
            .record_success(
                store,
                request.account_id,
                &request.action,
                kind,
                outcome.entry.amount_cents,
                request.metadata.clone(),
                ctx,
            )
            .await?;

        let receipt = receipt_for(&outcome.entry, None);
        if let Some(key) = &request.idempotency_key {
            self.cache_receipt(key, &fingerprint, &receipt, ctx).await;
        }

        tracing::info!(
            account_id = %receipt.account_id,
            action = %receipt.action,
            kind = %kind,
            amount_cents = receipt.amount_cents,
            balance_cents = receipt.balance_after_cents,
            "Credit applied"
        );
        Ok(receipt)
    }

    /// Fetch an account.
    ///
    /// # Errors
    ///
    /// `CreditError::AccountNotFound` if the account doesn't exist.
    pub async fn account(
        &self,
        account_id: &AccountId,
        ctx: Option<&S::Context>,
    ) -> Result<Account> {
        self.store
            .fetch_account(account_id, ctx)
            .await
            .map_err(|err| map_store_error(err, account_id))
    }

    /// List ledger entries for an account, newest first.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn history(
        &self,
        account_id: &AccountId,
        query: &LedgerQuery,
        ctx: Option<&S::Context>,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.list_ledger_entries(account_id, query, ctx).await?)
    }

    /// Resolve a price without charging anyone.
    ///
    /// # Errors
    ///
    /// Same as [`CostResolver::explain`].
    pub fn explain_cost(
        &self,
        action: &str,
        tier: Option<&str>,
        vars: Option<&BTreeMap<String, f64>>,
    ) -> Result<CostBreakdown> {
        self.resolver.explain(action, tier, vars)
    }

    /// Validate and compile a formula outside any pricing spec.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn compile_formula(&self, source: &str) -> Result<ParsedFormula> {
        Ok(crate::expr::parse(source)?)
    }

    /// Record a failure audit entry, then hand the error back.
    ///
    /// A failed audit write never masks the original error; in
    /// transactional mode the shared context aborts with the caller.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        account_id: &AccountId,
        action: &str,
        kind: EntryKind,
        amount_cents: Option<i64>,
        err: CreditError,
        metadata: &serde_json::Value,
        ctx: Option<&S::Context>,
    ) -> CreditError {
        if let Err(audit_err) = self
            .audit
            .record_failure(
                self.store.as_ref(),
                *account_id,
                action,
                kind,
                amount_cents,
                &err,
                metadata.clone(),
                ctx,
            )
            .await
        {
            tracing::error!(
                account_id = %account_id,
                error = %audit_err,
                "Audit write failed while recording an operation failure"
            );
        }
        err
    }

    async fn cache_receipt(
        &self,
        key: &str,
        fingerprint: &str,
        receipt: &OperationReceipt,
        ctx: Option<&S::Context>,
    ) {
        let payload = match to_json(receipt) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(key = %key, error = %err, "Idempotency save failed");
                return;
            }
        };
        if let Err(err) = self
            .guard
            .save(self.store.as_ref(), key, fingerprint, payload, ctx)
            .await
        {
            tracing::error!(key = %key, error = %err, "Idempotency save failed");
        }
    }
}

fn receipt_for(entry: &LedgerEntry, cost: Option<CostBreakdown>) -> OperationReceipt {
    OperationReceipt {
        entry_id: entry.id,
        account_id: entry.account_id,
        action: entry.action.clone(),
        kind: entry.kind,
        amount_cents: entry.amount_cents,
        balance_before_cents: entry.balance_before_cents,
        balance_after_cents: entry.balance_after_cents,
        cost,
        replayed: false,
        created_at: entry.created_at,
    }
}

fn replayed_receipt(key: &str, payload: serde_json::Value) -> Result<OperationReceipt> {
    let mut receipt: OperationReceipt = serde_json::from_value(payload)
        .map_err(|e| CreditError::Storage(StoreError::Serialization(e.to_string())))?;
    receipt.replayed = true;
    tracing::info!(key = %key, entry_id = %receipt.entry_id, "Replaying cached response");
    Ok(receipt)
}

fn map_store_error(err: StoreError, account_id: &AccountId) -> CreditError {
    match err {
        StoreError::NotFound { .. } => CreditError::AccountNotFound {
            account_id: account_id.to_string(),
        },
        StoreError::InsufficientFunds {
            balance_cents,
            required_cents,
        } => CreditError::InsufficientBalance {
            balance_cents,
            required_cents,
        },
        other => CreditError::Storage(other),
    }
}

fn charge_metadata(
    request_metadata: &serde_json::Value,
    breakdown: &CostBreakdown,
) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    if !request_metadata.is_null() {
        map.insert("request".into(), request_metadata.clone());
    }
    map.insert("cost".into(), to_json(breakdown)?);
    Ok(serde_json::Value::Object(map))
}

fn wrap_metadata(request_metadata: &serde_json::Value) -> serde_json::Value {
    if request_metadata.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::json!({ "request": request_metadata })
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| CreditError::Storage(StoreError::Serialization(e.to_string())))
}
