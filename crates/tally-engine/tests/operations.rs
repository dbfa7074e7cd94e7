//! Grant, refund, and history integration tests.

mod common;

use common::{vars, TestHarness};
use tally_core::{AuditStatus, EntryKind};
use tally_engine::{ChargeRequest, CreditError, CreditRequest};
use tally_store::LedgerQuery;

// ============================================================================
// Grants
// ============================================================================

#[tokio::test]
async fn grant_adds_credits() {
    let harness = TestHarness::new();
    let id = harness.seed_account(0).await;

    let receipt = harness
        .engine
        .grant(CreditRequest::new(id, "signup-bonus", 5_000), None)
        .await
        .unwrap();

    assert_eq!(receipt.kind, EntryKind::Grant);
    assert_eq!(receipt.amount_cents, 5_000);
    assert_eq!(receipt.balance_after_cents, 5_000);
    assert_eq!(receipt.cost, None);
    assert_eq!(harness.balance(id).await, 5_000);

    let audits = harness.audits().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Success);
    assert_eq!(audits[0].amount_cents, Some(5_000));
}

#[tokio::test]
async fn grant_action_needs_no_pricing() {
    let harness = TestHarness::new();
    let id = harness.seed_account(0).await;

    // "promo" has no pricing spec entry; grants carry explicit amounts.
    let receipt = harness
        .engine
        .grant(CreditRequest::new(id, "promo", 250), None)
        .await
        .unwrap();
    assert_eq!(receipt.amount_cents, 250);
}

#[tokio::test]
async fn negative_grant_is_rejected() {
    let harness = TestHarness::new();
    let id = harness.seed_account(1_000).await;

    let err = harness
        .engine
        .grant(CreditRequest::new(id, "signup-bonus", -500), None)
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::InvalidAmount { amount_cents: -500 }));
    assert_eq!(harness.balance(id).await, 1_000);

    let audits = harness.audits().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
}

#[tokio::test]
async fn grants_replay_under_a_key() {
    let harness = TestHarness::new();
    let id = harness.seed_account(0).await;
    let request = CreditRequest::new(id, "signup-bonus", 5_000).with_idempotency_key("grant-1");

    let first = harness.engine.grant(request.clone(), None).await.unwrap();
    let second = harness.engine.grant(request, None).await.unwrap();

    assert!(second.replayed);
    assert_eq!(second.entry_id, first.entry_id);
    assert_eq!(harness.balance(id).await, 5_000);
    assert_eq!(harness.ledger(id).await.len(), 1);
}

// ============================================================================
// Refunds
// ============================================================================

#[tokio::test]
async fn refund_restores_credits_as_its_own_kind() {
    let harness = TestHarness::new();
    let id = harness.seed_account(10_000).await;

    harness
        .engine
        .charge(ChargeRequest::new(id, "image-gen"), None)
        .await
        .unwrap();
    assert_eq!(harness.balance(id).await, 7_500);

    let receipt = harness
        .engine
        .refund(
            CreditRequest::new(id, "image-gen", 2_500)
                .with_metadata(serde_json::json!({ "reason": "generation failed" })),
            None,
        )
        .await
        .unwrap();

    assert_eq!(receipt.kind, EntryKind::Refund);
    assert_eq!(receipt.amount_cents, 2_500);
    assert_eq!(harness.balance(id).await, 10_000);

    let entries = harness.ledger(id).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, EntryKind::Refund);
    assert_eq!(entries[0].metadata["request"]["reason"], "generation failed");
}

#[tokio::test]
async fn refund_with_tier_requirement_is_gated() {
    let harness = TestHarness::new();
    let id = harness.seed_account(1_000).await;

    let err = harness
        .engine
        .refund(
            CreditRequest::new(id, "image-gen", 100).with_required_tier("premium"),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::MembershipDenied { .. }));
    assert_eq!(harness.balance(id).await, 1_000);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn history_is_newest_first() {
    let harness = TestHarness::new();
    let id = harness.seed_account(10_000).await;

    harness
        .engine
        .charge(
            ChargeRequest::new(id, "ai-completion").with_variables(vars(&[("token", 1000.0)])),
            None,
        )
        .await
        .unwrap();
    harness
        .engine
        .grant(CreditRequest::new(id, "signup-bonus", 500), None)
        .await
        .unwrap();
    harness
        .engine
        .charge(ChargeRequest::new(id, "image-gen"), None)
        .await
        .unwrap();

    let entries = harness
        .engine
        .history(&id, &LedgerQuery::default(), None)
        .await
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].action, "image-gen");
    assert_eq!(entries[1].action, "signup-bonus");
    assert_eq!(entries[2].action, "ai-completion");
}

#[tokio::test]
async fn history_filters_by_action_and_paginates() {
    let harness = TestHarness::new();
    let id = harness.seed_account(50_000).await;

    for _ in 0..3 {
        harness
            .engine
            .charge(ChargeRequest::new(id, "image-gen"), None)
            .await
            .unwrap();
    }
    harness
        .engine
        .grant(CreditRequest::new(id, "signup-bonus", 100), None)
        .await
        .unwrap();

    let query = LedgerQuery {
        action: Some("image-gen".into()),
        ..LedgerQuery::default()
    };
    let entries = harness.engine.history(&id, &query, None).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.action == "image-gen"));

    let query = LedgerQuery {
        limit: 2,
        offset: 1,
        ..LedgerQuery::default()
    };
    let entries = harness.engine.history(&id, &query, None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "image-gen");
}

#[tokio::test]
async fn history_of_a_fresh_account_is_empty() {
    let harness = TestHarness::new();
    let id = harness.seed_account(0).await;

    let entries = harness
        .engine
        .history(&id, &LedgerQuery::default(), None)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

// ============================================================================
// Account Lookup
// ============================================================================

#[tokio::test]
async fn account_lookup_round_trips() {
    let harness = TestHarness::new();
    let id = harness.seed_member(2_500, "premium").await;

    let account = harness.engine.account(&id, None).await.unwrap();
    assert_eq!(account.balance_cents, 2_500);
    assert_eq!(account.tier.as_deref(), Some("premium"));

    let missing = tally_core::AccountId::generate();
    let err = harness.engine.account(&missing, None).await.unwrap_err();
    assert!(matches!(err, CreditError::AccountNotFound { .. }));
}
