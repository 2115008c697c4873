mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use wallet_core::adapters::MemoryLedgerStore;
use wallet_core::domain::{TransactionStatus, VerificationOutcome};
use wallet_core::error::AppError;
use wallet_core::ports::LedgerStore;
use wallet_core::services::{ReconcileOutcome, ReconciliationEngine};

fn engine(store: Arc<dyn LedgerStore>, gateway: Arc<StubGateway>) -> ReconciliationEngine {
    ReconciliationEngine::new(store, gateway, PRIVATE_KEY.to_string())
}

#[tokio::test]
async fn test_complete_notification_credits_principal_only() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "103.00", "Complete"));

    let outcome = engine(store.clone(), gateway.clone())
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "103.00", "Complete"))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::Applied { status: TransactionStatus::Complete, .. }
    ));
    assert_eq!(balance(store.as_ref(), "alice").await, dec("100"));

    let stored = store.get_transaction(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Complete);
    assert!(stored.is_processed);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("gw-1"));

    let notification = store.find_notification("gw-1").await.unwrap().unwrap();
    assert!(notification.processed);
    assert_eq!(notification.final_status, Some(TransactionStatus::Complete));
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_delivery_is_acknowledged_without_second_credit() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "103.00", "Complete"));
    let engine = engine(store.clone(), gateway);
    let payload = signed_notification("gw-1", &tx.transaction_reference, "103.00", "Complete");

    engine.reconcile(&payload).await.unwrap();
    let second = engine.reconcile(&payload).await.unwrap();

    assert!(matches!(second, ReconcileOutcome::Duplicate));
    assert_eq!(second.message(), "Notification already processed");
    assert_eq!(balance(store.as_ref(), "alice").await, dec("100"));
}

#[tokio::test]
async fn test_repeated_deliveries_credit_exactly_once() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "50.00", "0").await;
    gateway.insert(gateway_tx("gw-7", &tx.transaction_reference, "50.00", "Complete"));
    let engine = Arc::new(engine(store.clone(), gateway));
    let payload = signed_notification("gw-7", &tx.transaction_reference, "50.00", "Complete");

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move { engine.reconcile(&payload).await }));
    }

    let mut applied = 0;
    for handle in handles {
        if let Ok(ReconcileOutcome::Applied { .. }) = handle.await.unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(balance(store.as_ref(), "alice").await, dec("50"));
}

#[tokio::test]
async fn test_amount_mismatch_leaves_everything_untouched() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;

    let err = engine(store.clone(), gateway.clone())
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "999.00", "Complete"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AmountMismatch));
    assert_eq!(balance(store.as_ref(), "alice").await, dec("0"));
    assert_eq!(
        store.get_transaction(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
    assert!(!store.find_notification("gw-1").await.unwrap().unwrap().processed);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);

    let logs = store.list_verification_logs(&tx.transaction_reference).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].outcome, VerificationOutcome::AmountMismatch);
}

#[tokio::test]
async fn test_tampered_notification_is_rejected() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;
    let mut payload = signed_notification("gw-1", &tx.transaction_reference, "103.00", "Complete");
    payload.amount = Some("1003.00".to_string());

    let err = engine(store.clone(), gateway)
        .reconcile(&payload)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidHash));
    assert!(store.find_notification("gw-1").await.unwrap().is_none());
    let logs = store.list_verification_logs(&tx.transaction_reference).await.unwrap();
    assert_eq!(logs[0].outcome, VerificationOutcome::InvalidHash);
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        ("Cancelled", TransactionStatus::Cancelled, true),
        ("ERROR", TransactionStatus::Error, true),
        ("Abandoned", TransactionStatus::Abandoned, true),
        ("pending", TransactionStatus::Pending, false),
        ("PendingInvestigation", TransactionStatus::PendingInvestigation, false),
    ];

    for (i, (gateway_status, expected, failed)) in cases.into_iter().enumerate() {
        let store = Arc::new(MemoryLedgerStore::new());
        let gateway = Arc::new(StubGateway::new());
        let tx = seed_deposit(store.as_ref(), "alice", "20.00", "0").await;
        let gw_id = format!("gw-{}", i);
        let payload = signed_notification(&gw_id, &tx.transaction_reference, "20.00", gateway_status);

        engine(store.clone(), gateway.clone())
            .reconcile(&payload)
            .await
            .unwrap();

        let stored = store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, expected, "gateway status {}", gateway_status);
        assert_eq!(stored.failed_at.is_some(), failed, "gateway status {}", gateway_status);
        assert!(!stored.is_processed);
        assert_eq!(balance(store.as_ref(), "alice").await, dec("0"));
        // Non-crediting outcomes never consult the gateway.
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_unrecognized_status_leaves_notification_unprocessed() {
    let store = Arc::new(MemoryLedgerStore::new());
    let tx = seed_deposit(store.as_ref(), "alice", "20.00", "0").await;

    let err = engine(store.clone(), Arc::new(StubGateway::new()))
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "20.00", "Refunded"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnrecognizedStatus(_)));
    assert!(!store.find_notification("gw-1").await.unwrap().unwrap().processed);
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let store = Arc::new(MemoryLedgerStore::new());

    let err = engine(store.clone(), Arc::new(StubGateway::new()))
        .reconcile(&signed_notification("gw-1", "no-such-ref", "20.00", "Complete"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::TransactionNotFound));
}

#[tokio::test]
async fn test_late_failure_after_completion_is_already_processed() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "20.00", "0").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "20.00", "Complete"));
    let engine = engine(store.clone(), gateway);

    engine
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "20.00", "Complete"))
        .await
        .unwrap();
    let err = engine
        .reconcile(&signed_notification("gw-2", &tx.transaction_reference, "20.00", "Cancelled"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyProcessed));
    assert_eq!(
        store.get_transaction(tx.id).await.unwrap().status,
        TransactionStatus::Complete
    );
    assert_eq!(balance(store.as_ref(), "alice").await, dec("20"));
    // The late notification is closed so retries skip it.
    let late = store.find_notification("gw-2").await.unwrap().unwrap();
    assert!(late.processed);
    assert_eq!(late.final_status, Some(TransactionStatus::Complete));
}

#[tokio::test]
async fn test_gateway_outage_defers_credit_until_retry() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "103.00", "Complete"));
    gateway.set_unavailable(true);
    let engine = engine(store.clone(), gateway.clone());

    let err = engine
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "103.00", "Complete"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GatewayUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(balance(store.as_ref(), "alice").await, dec("0"));

    gateway.set_unavailable(false);
    let report = engine.retry_unprocessed(10).await.unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(balance(store.as_ref(), "alice").await, dec("100"));
    assert!(store.list_unprocessed_notifications(10).await.unwrap().is_empty());

    let outcomes: Vec<_> = store
        .list_verification_logs(&tx.transaction_reference)
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.outcome)
        .collect();
    assert!(outcomes.contains(&VerificationOutcome::GatewayUnavailable));
    assert!(outcomes.contains(&VerificationOutcome::AppliedComplete));
}

#[tokio::test]
async fn test_parked_notifications_do_not_starve_retries() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let engine = engine(store.clone(), gateway.clone());

    for (i, amount) in ["999.00", "1.00"].into_iter().enumerate() {
        let bad = seed_deposit(store.as_ref(), "mallory", "10.00", "0").await;
        let err = engine
            .reconcile(&signed_notification(
                &format!("gw-bad-{}", i),
                &bad.transaction_reference,
                amount,
                "Complete",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AmountMismatch));
    }

    let tx = seed_deposit(store.as_ref(), "alice", "100.00", "3.00").await;
    gateway.insert(gateway_tx("gw-good", &tx.transaction_reference, "103.00", "Complete"));
    gateway.set_unavailable(true);
    engine
        .reconcile(&signed_notification("gw-good", &tx.transaction_reference, "103.00", "Complete"))
        .await
        .unwrap_err();
    gateway.set_unavailable(false);

    let report = engine.retry_unprocessed(2).await.unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(balance(store.as_ref(), "alice").await, dec("100"));

    let parked = store.find_notification("gw-bad-0").await.unwrap().unwrap();
    assert!(!parked.processed);
    assert!(parked.needs_review);
    assert_eq!(parked.review_reason.as_deref(), Some("amount mismatch"));
    assert!(store.list_unprocessed_notifications(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_transaction_is_parked_after_one_retry() {
    let store = Arc::new(MemoryLedgerStore::new());
    let engine = engine(store.clone(), Arc::new(StubGateway::new()));

    engine
        .reconcile(&signed_notification("gw-1", "no-such-ref", "20.00", "Complete"))
        .await
        .unwrap_err();
    assert!(!store.find_notification("gw-1").await.unwrap().unwrap().needs_review);

    let first = engine.retry_unprocessed(10).await.unwrap();
    let second = engine.retry_unprocessed(10).await.unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!(second.attempted, 0);
    assert!(store.find_notification("gw-1").await.unwrap().unwrap().needs_review);
}

#[tokio::test]
async fn test_gateway_disagreement_blocks_credit() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "20.00", "0").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "20.00", "Pending"));

    let err = engine(store.clone(), gateway)
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "20.00", "Complete"))
        .await
        .unwrap_err();

    match err {
        AppError::VerificationFailed(details) => {
            assert!(details.iter().any(|d| d.starts_with("status:")));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(balance(store.as_ref(), "alice").await, dec("0"));
}

#[tokio::test]
async fn test_verification_log_failure_does_not_block_credit() {
    let store = Arc::new(FaultyStore::new());
    store.fail_verification_log();
    let gateway = Arc::new(StubGateway::new());
    let tx = seed_deposit(store.as_ref(), "alice", "20.00", "0").await;
    gateway.insert(gateway_tx("gw-1", &tx.transaction_reference, "20.00", "Complete"));

    engine(store.clone(), gateway)
        .reconcile(&signed_notification("gw-1", &tx.transaction_reference, "20.00", "Complete"))
        .await
        .unwrap();

    assert_eq!(balance(store.as_ref(), "alice").await, dec("20"));
}
