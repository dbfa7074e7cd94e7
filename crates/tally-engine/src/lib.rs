//! Transactional credit core.
//!
//! `tally-engine` meters actions against prepaid credit balances held in
//! integer cents. It wires six collaborators around the storage contract
//! from `tally-store`:
//!
//! - a formula engine for dynamic pricing expressions
//! - a cost resolver with per-tier price fallback
//! - a membership validator over an ordered tier ladder
//! - an idempotency guard that replays cached responses
//! - a retry policy for transient storage failures
//! - an audit recorder for every attempt, failed ones included
//!
//! The engine itself holds no locks and no balances. Atomicity lives in
//! [`tally_store::Store::apply_balance_delta`], which makes the engine
//! safe to share across tasks and instances that share a store.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tally_core::{Account, AccountId};
//! use tally_engine::{
//!     ActionPricing, ChargeRequest, CostSpec, CreditEngine, EngineConfig, PriceEntry,
//!     TierLadder,
//! };
//! use tally_store::MemoryStore;
//!
//! # async fn demo() -> Result<(), tally_engine::CreditError> {
//! let store = Arc::new(MemoryStore::new());
//! let id = AccountId::generate();
//! let mut account = Account::new(id);
//! account.balance_cents = 10_000;
//! store.put_account(account).await;
//!
//! let spec = CostSpec::new().with_action(
//!     "ai-completion",
//!     ActionPricing::new(PriceEntry::Formula("{token}*0.001+10".into())),
//! );
//! let ladder = TierLadder::new(vec!["basic".into(), "premium".into()]);
//! let engine = CreditEngine::new(store, spec, ladder, EngineConfig::default())?;
//!
//! let receipt = engine
//!     .charge(
//!         ChargeRequest::new(id, "ai-completion")
//!             .with_variables([("token".to_owned(), 3500.0)].into()),
//!         None,
//!     )
//!     .await?;
//! assert_eq!(receipt.amount_cents, -1350);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod expr;
pub mod idempotency;
pub mod membership;
pub mod retry;

pub use audit::AuditRecorder;
pub use config::{AuditConfig, EngineConfig, IdempotencyConfig};
pub use cost::{ActionPricing, CostBreakdown, CostResolver, CostSpec, PriceEntry, PriceKey};
pub use engine::{ChargeRequest, CreditEngine, CreditRequest, OperationReceipt};
pub use error::{CreditError, ErrorCategory, Result};
pub use expr::{FormulaError, ParsedFormula};
pub use idempotency::{request_fingerprint, IdempotencyCheck, IdempotencyGuard};
pub use membership::{DenialReason, MembershipCheck, MembershipValidator, TierLadder};
pub use retry::{RetryConfig, RetryPolicy, RetryRule};
