//! Storage contract for tally.
//!
//! This crate defines the [`Store`] trait the credit engine writes through,
//! the request/response types that cross that boundary, and [`MemoryStore`],
//! an in-memory reference implementation used by tests and embedders.
//!
//! # Atomicity
//!
//! The engine never holds a lock of its own. Single-account serialization is
//! the store's obligation: [`Store::apply_balance_delta`] must read the
//! balance, apply the delta, reject a result below zero, and create the
//! ledger entry as one atomic unit. The before/after balances on the entry
//! come from inside that unit, never from a separately fetched snapshot.
//!
//! # Transaction contexts
//!
//! Every method takes `ctx: Option<&Self::Context>`. The context type is
//! store-defined: `()` for [`MemoryStore`], a transaction handle for a SQL
//! backend. Passing `Some(ctx)` lets an embedder join store calls to an
//! atomic unit it manages itself; `None` means the store runs the call
//! standalone. The context is always an explicit parameter, never ambient
//! state.
//!
//! # Example
//!
//! ```no_run
//! use tally_core::{Account, AccountId};
//! use tally_store::{MemoryStore, Store};
//!
//! # async fn demo() -> Result<(), tally_store::StoreError> {
//! let store = MemoryStore::new();
//!
//! // Seed an account
//! let id = AccountId::generate();
//! store.put_account(Account::new(id)).await;
//!
//! // Read it back through the contract
//! let account = store.fetch_account(&id, None).await?;
//! assert_eq!(account.balance_cents, 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_core::{
    Account, AccountId, AuditEntry, AuditStatus, EntryKind, IdempotencyRecord, LedgerEntry,
};

/// Ledger detail supplied to [`Store::apply_balance_delta`].
///
/// The store fills in the entry id, the before/after balances, and the
/// creation timestamp inside its atomic unit.
#[derive(Debug, Clone)]
pub struct LedgerDraft {
    /// The metered action being accounted.
    pub action: String,

    /// What kind of operation produced the delta.
    pub kind: EntryKind,

    /// Structured detail to store on the entry.
    pub metadata: serde_json::Value,
}

/// A fully specified ledger entry for standalone creation.
///
/// Unlike [`LedgerDraft`], the caller supplies the before/after balances;
/// the store only generates the id and timestamp. Used by embedders that
/// manage their own balance mutation.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    /// The account the entry belongs to.
    pub account_id: AccountId,

    /// The metered action being accounted.
    pub action: String,

    /// What kind of operation produced the delta.
    pub kind: EntryKind,

    /// Signed delta in cents.
    pub amount_cents: i64,

    /// Balance before the delta (in cents).
    pub balance_before_cents: i64,

    /// Balance after the delta (in cents).
    pub balance_after_cents: i64,

    /// Structured detail to store on the entry.
    pub metadata: serde_json::Value,
}

/// An audit entry to be created.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    /// The account the attempt targeted.
    pub account_id: AccountId,

    /// The metered action involved.
    pub action: String,

    /// What kind of operation was attempted.
    pub kind: EntryKind,

    /// Whether the attempt succeeded or failed.
    pub status: AuditStatus,

    /// Amount involved in cents, when one was known.
    pub amount_cents: Option<i64>,

    /// Error description for failed attempts.
    pub error: Option<String>,

    /// Structured detail mirrored from the request.
    pub metadata: serde_json::Value,
}

/// An idempotency record to be created.
#[derive(Debug, Clone)]
pub struct NewIdempotencyRecord {
    /// The caller-supplied key.
    pub key: String,

    /// SHA-256 hex fingerprint of the request's semantic parameters.
    pub fingerprint: String,

    /// Serialized result of the completed operation.
    pub payload: serde_json::Value,

    /// When the record stops shielding retries.
    pub expires_at: DateTime<Utc>,
}

/// Filters and pagination for [`Store::list_ledger_entries`].
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    /// Maximum number of entries to return.
    pub limit: usize,

    /// Number of entries to skip (after filtering, newest first).
    pub offset: usize,

    /// Only entries created at or after this instant.
    pub from: Option<DateTime<Utc>>,

    /// Only entries created strictly before this instant.
    pub to: Option<DateTime<Utc>>,

    /// Only entries for this action.
    pub action: Option<String>,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            from: None,
            to: None,
            action: None,
        }
    }
}

/// What [`Store::apply_balance_delta`] produced.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The account after the delta was applied.
    pub account: Account,

    /// The ledger entry created alongside the mutation.
    pub entry: LedgerEntry,
}

/// The storage collaborator the credit engine writes through.
///
/// This trait abstracts the persistence layer, allowing for different
/// implementations (in-memory for tests, a database for production).
#[async_trait]
pub trait Store: Send + Sync {
    /// Transaction context an embedder can thread through store calls.
    ///
    /// `()` for stores without external transactions.
    type Context: Send + Sync;

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn fetch_account(
        &self,
        id: &AccountId,
        ctx: Option<&Self::Context>,
    ) -> Result<Account>;

    /// Apply a signed balance delta and create its ledger entry atomically.
    ///
    /// Reads the balance, applies the delta, and writes the ledger entry in
    /// one unit. Accounts are never auto-created and never driven below
    /// zero.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if the delta would drive the
    ///   balance below zero; the balance is left untouched and no entry is
    ///   created.
    async fn apply_balance_delta(
        &self,
        id: &AccountId,
        delta_cents: i64,
        draft: LedgerDraft,
        ctx: Option<&Self::Context>,
    ) -> Result<MutationOutcome>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Create a ledger entry standalone, outside any balance mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_ledger_entry(
        &self,
        entry: NewLedgerEntry,
        ctx: Option<&Self::Context>,
    ) -> Result<LedgerEntry>;

    /// List ledger entries for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_ledger_entries(
        &self,
        account_id: &AccountId,
        query: &LedgerQuery,
        ctx: Option<&Self::Context>,
    ) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Audit Operations
    // =========================================================================

    /// Create an audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_audit_entry(
        &self,
        entry: NewAuditEntry,
        ctx: Option<&Self::Context>,
    ) -> Result<AuditEntry>;

    // =========================================================================
    // Idempotency Operations
    // =========================================================================

    /// Get the live idempotency record under a key.
    ///
    /// Expired records are treated as absent whether or not they have been
    /// physically removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_idempotency_record(
        &self,
        key: &str,
        ctx: Option<&Self::Context>,
    ) -> Result<Option<IdempotencyRecord>>;

    /// Create an idempotency record with an explicit expiration.
    ///
    /// An expired record under the same key is replaced.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a live record already exists
    /// under the key.
    async fn create_idempotency_record(
        &self,
        record: NewIdempotencyRecord,
        ctx: Option<&Self::Context>,
    ) -> Result<IdempotencyRecord>;
}
