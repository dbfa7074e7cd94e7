//! Common test utilities for tally-engine integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tally_core::{Account, AccountId, AuditEntry, IdempotencyRecord, LedgerEntry};
use tally_engine::{ActionPricing, CostSpec, CreditEngine, EngineConfig, PriceEntry, TierLadder};
use tally_store::{
    LedgerDraft, LedgerQuery, MemoryStore, MutationOutcome, NewAuditEntry, NewIdempotencyRecord,
    NewLedgerEntry, Store, StoreError,
};

/// Test harness wiring an engine over a fresh in-memory store.
pub struct TestHarness {
    /// The store, shared with the engine.
    pub store: Arc<MemoryStore>,
    /// The engine under test.
    pub engine: CreditEngine<MemoryStore>,
}

impl TestHarness {
    /// Create a harness with the sample pricing spec and tier ladder.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a harness with explicit engine configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = CreditEngine::new(
            Arc::clone(&store),
            sample_cost_spec(),
            sample_ladder(),
            config,
        )
        .expect("Failed to build engine");
        Self { store, engine }
    }

    /// Seed an account with a balance and no tier.
    pub async fn seed_account(&self, balance_cents: i64) -> AccountId {
        let id = AccountId::generate();
        let mut account = Account::new(id);
        account.balance_cents = balance_cents;
        self.store.put_account(account).await;
        id
    }

    /// Seed an account with a balance and a tier that never expires.
    pub async fn seed_member(&self, balance_cents: i64, tier: &str) -> AccountId {
        let id = AccountId::generate();
        let mut account = Account::new(id);
        account.balance_cents = balance_cents;
        account.tier = Some(tier.to_owned());
        self.store.put_account(account).await;
        id
    }

    /// Seed an account whose tier expired an hour ago.
    pub async fn seed_expired_member(&self, balance_cents: i64, tier: &str) -> AccountId {
        let id = AccountId::generate();
        let mut account = Account::new(id);
        account.balance_cents = balance_cents;
        account.tier = Some(tier.to_owned());
        account.tier_expires_at = Some(Utc::now() - Duration::hours(1));
        self.store.put_account(account).await;
        id
    }

    /// Current balance in cents.
    pub async fn balance(&self, id: AccountId) -> i64 {
        self.store
            .fetch_account(&id, None)
            .await
            .expect("Account missing")
            .balance_cents
    }

    /// All ledger entries for an account, newest first.
    pub async fn ledger(&self, id: AccountId) -> Vec<LedgerEntry> {
        self.store
            .list_ledger_entries(&id, &LedgerQuery::default(), None)
            .await
            .expect("Failed to list ledger entries")
    }

    /// All audit entries in the store, oldest first.
    pub async fn audits(&self) -> Vec<AuditEntry> {
        self.store.audit_entries().await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Pricing used across the integration tests.
pub fn sample_cost_spec() -> CostSpec {
    CostSpec::new()
        .with_action(
            "ai-completion",
            ActionPricing::new(PriceEntry::Formula("{token}*0.001+10".into()))
                .with_tier("premium", PriceEntry::Formula("{token}*0.0008+8".into())),
        )
        .with_action("image-gen", ActionPricing::new(PriceEntry::Fixed(25.0)))
        .with_action(
            "export",
            ActionPricing::new(PriceEntry::Fixed(10.0))
                .with_tier("premium", PriceEntry::Fixed(5.0)),
        )
}

/// basic < premium < enterprise.
pub fn sample_ladder() -> TierLadder {
    TierLadder::new(vec!["basic".into(), "premium".into(), "enterprise".into()])
}

/// Build a variables map from pairs.
pub fn vars(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
}

/// A store that fails selected operations a set number of times before
/// delegating to an inner [`MemoryStore`].
pub struct FlakyStore {
    inner: MemoryStore,
    delta_failures: AtomicU32,
    audit_failures: AtomicU32,
    idempotency_read_failures: AtomicU32,
    idempotency_save_failures: AtomicU32,
    /// Total calls made to `apply_balance_delta`, failures included.
    pub delta_attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            delta_failures: AtomicU32::new(0),
            audit_failures: AtomicU32::new(0),
            idempotency_read_failures: AtomicU32::new(0),
            idempotency_save_failures: AtomicU32::new(0),
            delta_attempts: AtomicU32::new(0),
        }
    }

    /// Fail the next `times` balance mutations.
    pub fn fail_deltas(&self, times: u32) {
        self.delta_failures.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` audit writes.
    pub fn fail_audits(&self, times: u32) {
        self.audit_failures.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` idempotency record reads.
    pub fn fail_idempotency_reads(&self, times: u32) {
        self.idempotency_read_failures.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` idempotency record writes.
    pub fn fail_idempotency_saves(&self, times: u32) {
        self.idempotency_save_failures.store(times, Ordering::SeqCst);
    }

    pub async fn put_account(&self, account: Account) {
        self.inner.put_account(account).await;
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.audit_entries().await
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable {
            code: Some(503),
            message: "injected failure".into(),
        }
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for FlakyStore {
    type Context = ();

    async fn fetch_account(
        &self,
        id: &AccountId,
        ctx: Option<&()>,
    ) -> tally_store::Result<Account> {
        self.inner.fetch_account(id, ctx).await
    }

    async fn apply_balance_delta(
        &self,
        id: &AccountId,
        delta_cents: i64,
        draft: LedgerDraft,
        ctx: Option<&()>,
    ) -> tally_store::Result<MutationOutcome> {
        self.delta_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.delta_failures) {
            return Err(Self::unavailable());
        }
        self.inner.apply_balance_delta(id, delta_cents, draft, ctx).await
    }

    async fn create_ledger_entry(
        &self,
        entry: NewLedgerEntry,
        ctx: Option<&()>,
    ) -> tally_store::Result<LedgerEntry> {
        self.inner.create_ledger_entry(entry, ctx).await
    }

    async fn list_ledger_entries(
        &self,
        account_id: &AccountId,
        query: &LedgerQuery,
        ctx: Option<&()>,
    ) -> tally_store::Result<Vec<LedgerEntry>> {
        self.inner.list_ledger_entries(account_id, query, ctx).await
    }

    async fn create_audit_entry(
        &self,
        entry: NewAuditEntry,
        ctx: Option<&()>,
    ) -> tally_store::Result<AuditEntry> {
        if Self::take_failure(&self.audit_failures) {
            return Err(Self::unavailable());
        }
        self.inner.create_audit_entry(entry, ctx).await
    }

    async fn get_idempotency_record(
        &self,
        key: &str,
        ctx: Option<&()>,
    ) -> tally_store::Result<Option<IdempotencyRecord>> {
        if Self::take_failure(&self.idempotency_read_failures) {
            return Err(Self::unavailable());
        }
        self.inner.get_idempotency_record(key, ctx).await
    }

    async fn create_idempotency_record(
        &self,
        record: NewIdempotencyRecord,
        ctx: Option<&()>,
    ) -> tally_store::Result<IdempotencyRecord> {
        if Self::take_failure(&self.idempotency_save_failures) {
            return Err(Self::unavailable());
        }
        self.inner.create_idempotency_record(record, ctx).await
    }
}

/// Harness variant whose store injects failures.
pub struct FlakyHarness {
    pub store: Arc<FlakyStore>,
    pub engine: CreditEngine<FlakyStore>,
}

impl FlakyHarness {
    pub fn new() -> Self {
        let store = Arc::new(FlakyStore::new());
        let engine = CreditEngine::new(
            Arc::clone(&store),
            sample_cost_spec(),
            sample_ladder(),
            EngineConfig::default(),
        )
        .expect("Failed to build engine");
        Self { store, engine }
    }

    pub async fn seed_account(&self, balance_cents: i64) -> AccountId {
        let id = AccountId::generate();
        let mut account = Account::new(id);
        account.balance_cents = balance_cents;
        self.store.put_account(account).await;
        id
    }
}

impl Default for FlakyHarness {
    fn default() -> Self {
        Self::new()
    }
}
