//! Failure-injection integration tests.

mod common;

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use common::{FlakyHarness, TestHarness};
use tally_core::AuditStatus;
use tally_engine::{request_fingerprint, ChargeRequest, CreditError, CreditRequest};
use tally_store::{NewIdempotencyRecord, Store, StoreError};

// ============================================================================
// Retries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn charge_survives_transient_storage_failures() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(10_000).await;
    harness.store.fail_deltas(2);

    let receipt = harness
        .engine
        .charge(ChargeRequest::new(id, "image-gen"), None)
        .await
        .unwrap();

    assert_eq!(receipt.balance_after_cents, 7_500);
    assert_eq!(harness.store.delta_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn charge_gives_up_after_max_attempts() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(10_000).await;
    harness.store.fail_deltas(10);

    let err = harness
        .engine
        .charge(ChargeRequest::new(id, "image-gen"), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CreditError::Storage(StoreError::Unavailable { .. })
    ));
    assert_eq!(harness.store.delta_attempts.load(Ordering::SeqCst), 3);

    let account = harness.store.fetch_account(&id, None).await.unwrap();
    assert_eq!(account.balance_cents, 10_000);
}

#[tokio::test(start_paused = true)]
async fn grant_retries_through_the_same_policy() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(0).await;
    harness.store.fail_deltas(1);

    let receipt = harness
        .engine
        .grant(CreditRequest::new(id, "signup-bonus", 5_000), None)
        .await
        .unwrap();

    assert_eq!(receipt.balance_after_cents, 5_000);
    assert_eq!(harness.store.delta_attempts.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Post-Commit Failures
// ============================================================================

#[tokio::test]
async fn audit_outage_does_not_fail_the_charge() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(10_000).await;
    harness.store.fail_audits(1);

    let receipt = harness
        .engine
        .charge(ChargeRequest::new(id, "image-gen"), None)
        .await
        .unwrap();

    // The charge committed; only the audit entry is missing.
    assert_eq!(receipt.balance_after_cents, 7_500);
    assert!(harness.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn idempotency_save_outage_does_not_fail_the_charge() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(10_000).await;
    harness.store.fail_idempotency_saves(1);

    let first = harness
        .engine
        .charge(
            ChargeRequest::new(id, "image-gen").with_idempotency_key("req-1"),
            None,
        )
        .await
        .unwrap();
    assert!(!first.replayed);

    // Nothing was cached, so the same request executes again.
    let second = harness
        .engine
        .charge(
            ChargeRequest::new(id, "image-gen").with_idempotency_key("req-1"),
            None,
        )
        .await
        .unwrap();
    assert!(!second.replayed);
    assert_ne!(second.entry_id, first.entry_id);
}

// ============================================================================
// Idempotency Read Failures
// ============================================================================

#[tokio::test]
async fn idempotency_read_outage_is_audited_before_propagating() {
    let harness = FlakyHarness::new();
    let id = harness.seed_account(10_000).await;
    harness.store.fail_idempotency_reads(1);

    let err = harness
        .engine
        .charge(
            ChargeRequest::new(id, "image-gen").with_idempotency_key("req-1"),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CreditError::Storage(StoreError::Unavailable { .. })
    ));

    // No mutation, but the failed attempt left its audit entry.
    let account = harness.store.fetch_account(&id, None).await.unwrap();
    assert_eq!(account.balance_cents, 10_000);
    let audits = harness.store.audit_entries().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
}

#[tokio::test]
async fn corrupt_cached_payload_surfaces_as_storage_error() {
    let harness = TestHarness::new();
    let id = harness.seed_account(10_000).await;

    // Plant a record whose payload is not a receipt, under the exact
    // fingerprint the engine computes for this request.
    let fingerprint = request_fingerprint(&serde_json::json!({
        "kind": "charge",
        "account_id": id,
        "action": "image-gen",
        "variables": null,
        "required_tier": null,
    }));
    harness
        .store
        .create_idempotency_record(
            NewIdempotencyRecord {
                key: "req-1".into(),
                fingerprint,
                payload: serde_json::json!("not a receipt"),
                expires_at: Utc::now() + Duration::hours(1),
            },
            None,
        )
        .await
        .unwrap();

    let err = harness
        .engine
        .charge(
            ChargeRequest::new(id, "image-gen").with_idempotency_key("req-1"),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CreditError::Storage(StoreError::Serialization(_))
    ));
    // A broken cache entry never falls through to a fresh execution,
    // and the failed attempt is audited like any other.
    assert_eq!(harness.balance(id).await, 10_000);
    let audits = harness.audits().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert!(audits[0].error.is_some());
}
