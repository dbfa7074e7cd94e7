//! In-memory reference implementation of the storage contract.
//!
//! [`MemoryStore`] keeps everything behind a single `tokio` `RwLock`, so
//! [`Store::apply_balance_delta`] is trivially atomic: the write lock covers
//! the read-modify-write and the ledger insert together. It has no external
//! transactions, so its `Context` is `()` and the `ctx` argument is ignored.
//!
//! Intended for tests and embedders that don't need durability.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use tally_core::{
    Account, AccountId, AuditEntry, AuditId, EntryId, IdempotencyRecord, LedgerEntry,
};

use crate::error::{Result, StoreError};
use crate::{
    LedgerDraft, LedgerQuery, MutationOutcome, NewAuditEntry, NewIdempotencyRecord,
    NewLedgerEntry, Store,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    // Appended in creation order; listings iterate in reverse.
    ledger: Vec<LedgerEntry>,
    audits: Vec<AuditEntry>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

/// In-memory store backed by a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account record.
    pub async fn put_account(&self, account: Account) {
        self.inner
            .write()
            .await
            .accounts
            .insert(account.id, account);
    }

    /// Snapshot of every audit entry written so far, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.read().await.audits.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Context = ();

    async fn fetch_account(
        &self,
        id: &AccountId,
        _ctx: Option<&Self::Context>,
    ) -> Result<Account> {
        let inner = self.inner.read().await;
        inner
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: id.to_string(),
            })
    }

    async fn apply_balance_delta(
        &self,
        id: &AccountId,
        delta_cents: i64,
        draft: LedgerDraft,
        _ctx: Option<&Self::Context>,
    ) -> Result<MutationOutcome> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let account = inner
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: id.to_string(),
            })?;

        let before = account.balance_cents;
        let after = before + delta_cents;
        if after < 0 {
            return Err(StoreError::InsufficientFunds {
                balance_cents: before,
                required_cents: -delta_cents,
            });
        }

        account.balance_cents = after;
        account.updated_at = now;
        let account = account.clone();

        let entry = LedgerEntry {
            id: EntryId::generate(),
            account_id: *id,
            action: draft.action,
            kind: draft.kind,
            amount_cents: delta_cents,
            balance_before_cents: before,
            balance_after_cents: after,
            metadata: draft.metadata,
            created_at: now,
        };
        inner.ledger.push(entry.clone());

        Ok(MutationOutcome { account, entry })
    }

    async fn create_ledger_entry(
        &self,
        new: NewLedgerEntry,
        _ctx: Option<&Self::Context>,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            id: EntryId::generate(),
            account_id: new.account_id,
            action: new.action,
            kind: new.kind,
            amount_cents: new.amount_cents,
            balance_before_cents: new.balance_before_cents,
            balance_after_cents: new.balance_after_cents,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        self.inner.write().await.ledger.push(entry.clone());
        Ok(entry)
    }

    async fn list_ledger_entries(
        &self,
        account_id: &AccountId,
        query: &LedgerQuery,
        _ctx: Option<&Self::Context>,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        let entries = inner
            .ledger
            .iter()
            .rev()
            .filter(|e| e.account_id == *account_id)
            .filter(|e| query.action.as_deref().map_or(true, |a| e.action == a))
            .filter(|e| query.from.map_or(true, |from| e.created_at >= from))
            .filter(|e| query.to.map_or(true, |to| e.created_at < to))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(entries)
    }

    async fn create_audit_entry(
        &self,
        new: NewAuditEntry,
        _ctx: Option<&Self::Context>,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: AuditId::generate(),
            account_id: new.account_id,
            action: new.action,
            kind: new.kind,
            status: new.status,
            amount_cents: new.amount_cents,
            error: new.error,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        self.inner.write().await.audits.push(entry.clone());
        Ok(entry)
    }

    async fn get_idempotency_record(
        &self,
        key: &str,
        _ctx: Option<&Self::Context>,
    ) -> Result<Option<IdempotencyRecord>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        Ok(inner
            .idempotency
            .get(key)
            .filter(|r| r.is_live_at(now))
            .cloned())
    }

    async fn create_idempotency_record(
        &self,
        record: NewIdempotencyRecord,
        _ctx: Option<&Self::Context>,
    ) -> Result<IdempotencyRecord> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.idempotency.get(&record.key) {
            if existing.is_live_at(now) {
                return Err(StoreError::DuplicateKey { key: record.key });
            }
        }

        let rec = IdempotencyRecord {
            key: record.key.clone(),
            fingerprint: record.fingerprint,
            payload: record.payload,
            created_at: now,
            expires_at: record.expires_at,
        };
        inner.idempotency.insert(record.key, rec.clone());
        Ok(rec)
    }
}
