//! Audit recorder.
//!
//! Every operation attempt gets an audit entry, successful or not. By
//! default the write runs outside the balance transaction and a failed
//! audit write is logged and swallowed so it can never undo a committed
//! charge. With [`AuditConfig::in_transaction`] set, the write joins the
//! caller's transaction context and its failure fails the operation.
//!
//! [`AuditConfig::in_transaction`]: crate::config::AuditConfig

use tally_core::{AccountId, AuditStatus, EntryKind};
use tally_store::{NewAuditEntry, Store};

use crate::config::AuditConfig;
use crate::error::{CreditError, Result};

/// Writes audit entries for operation attempts.
#[derive(Debug, Clone, Default)]
pub struct AuditRecorder {
    config: AuditConfig,
}

impl AuditRecorder {
    /// Build a recorder from explicit configuration.
    #[must_use]
    pub const fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Record a successful operation.
    ///
    /// # Errors
    ///
    /// Fails only in transactional mode, with the underlying storage error.
    pub async fn record_success<S: Store>(
        &self,
        store: &S,
        account_id: AccountId,
        action: &str,
        kind: EntryKind,
        amount_cents: i64,
        metadata: serde_json::Value,
        ctx: Option<&S::Context>,
    ) -> Result<()> {
        self.write(
            store,
            NewAuditEntry {
                account_id,
                action: action.to_owned(),
                kind,
                status: AuditStatus::Success,
                amount_cents: Some(amount_cents),
                error: None,
                metadata,
            },
            ctx,
        )
        .await
    }

    /// Record a failed operation attempt with the error that stopped it.
    ///
    /// # Errors
    ///
    /// Fails only in transactional mode, with the underlying storage error.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_failure<S: Store>(
        &self,
        store: &S,
        account_id: AccountId,
        action: &str,
        kind: EntryKind,
        amount_cents: Option<i64>,
        error: &CreditError,
        metadata: serde_json::Value,
        ctx: Option<&S::Context>,
    ) -> Result<()> {
        self.write(
            store,
            NewAuditEntry {
                account_id,
                action: action.to_owned(),
                kind,
                status: AuditStatus::Failed,
                amount_cents,
                error: Some(error.to_string()),
                metadata,
            },
            ctx,
        )
        .await
    }

    async fn write<S: Store>(
        &self,
        store: &S,
        entry: NewAuditEntry,
        ctx: Option<&S::Context>,
    ) -> Result<()> {
        let account_id = entry.account_id;
        let ctx = if self.config.in_transaction { ctx } else { None };
        match store.create_audit_entry(entry, ctx).await {
            Ok(_) => Ok(()),
            Err(err) if self.config.in_transaction => Err(err.into()),
            Err(err) => {
                tracing::error!(account_id = %account_id, error = %err, "Audit write failed");
                Ok(())
            }
        }
    }
}
