//! Core types for the tally credit engine.
//!
//! This crate provides the foundational types used throughout tally:
//!
//! - **Identifiers**: `AccountId`, `EntryId`, `AuditId`
//! - **Accounts**: `Account` with balance and membership tier
//! - **Ledger**: `LedgerEntry`, `EntryKind`
//! - **Audit**: `AuditEntry`, `AuditStatus`
//! - **Idempotency**: `IdempotencyRecord`
//!
//! # Credit Unit
//!
//! **1 credit = $0.01 (1 cent)**
//!
//! - A charge priced at 10.00 deducts 1000 cents
//! - Stored as `i64` (integer cents) to avoid floating point precision issues
//! - Formula evaluation happens in `f64` and is rounded to cents exactly once,
//!   at the boundary where a price becomes a balance delta

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod audit;
pub mod idempotency;
pub mod ids;
pub mod ledger;

pub use account::Account;
pub use audit::{AuditEntry, AuditStatus};
pub use idempotency::IdempotencyRecord;
pub use ids::{AccountId, AuditId, EntryId, IdError};
pub use ledger::{EntryKind, LedgerEntry};
