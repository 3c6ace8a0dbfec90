//! Integration tests for the action executor against the in-memory action
//! service.

use fl_actions::{ActionError, ActionExecutor};
use fl_connectors::{ConnectorError, MockActionService};
use fl_core::{ActionRequest, ActionStatus};
use fl_observability::{MetricsSink, ACTIONS_EXECUTED_TOTAL, ACTION_BLOCKED_TOTAL};
use std::sync::Arc;
use tokio::task::JoinSet;

fn setup() -> (Arc<ActionExecutor>, Arc<MockActionService>, MetricsSink) {
    let service = Arc::new(MockActionService::new("actions"));
    let metrics = MetricsSink::new();
    let executor = Arc::new(ActionExecutor::new(service.clone(), metrics.clone()));
    (executor, service, metrics)
}

// ============================================================
// Idempotency
// ============================================================

#[tokio::test]
async fn test_same_key_yields_identical_result_and_single_effect() {
    let (executor, service, _) = setup();
    let request = ActionRequest::freeze_card("card_01", "123456");

    let first = executor.execute(&request).await.unwrap();
    let second = executor.execute(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status, ActionStatus::Frozen);
    assert_eq!(service.effect_count("card_01").await, 1);
}

#[tokio::test]
async fn test_concurrent_same_key_single_effect() {
    let (executor, service, _) = setup();
    let request = ActionRequest::open_dispute("txn_01001").with_amount(4999);

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let executor = Arc::clone(&executor);
        let request = request.clone();
        set.spawn(async move { executor.execute(&request).await });
    }

    let mut case_ids = Vec::new();
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap().unwrap();
        case_ids.push(result.case_id.unwrap());
    }

    case_ids.dedup();
    assert_eq!(case_ids.len(), 1);
    assert_eq!(service.effect_count("txn_01001").await, 1);
}

#[tokio::test]
async fn test_distinct_keys_are_distinct_attempts() {
    let (executor, service, _) = setup();

    executor
        .execute(&ActionRequest::open_dispute("txn_01001"))
        .await
        .unwrap();
    executor
        .execute(&ActionRequest::open_dispute("txn_01001"))
        .await
        .unwrap();

    assert_eq!(service.effect_count("txn_01001").await, 2);
}

#[tokio::test]
async fn test_conflict_returns_original_result() {
    let service = Arc::new(MockActionService::new("actions").with_conflict_on_replay());
    let executor = ActionExecutor::new(service.clone(), MetricsSink::new());
    let request = ActionRequest::open_dispute("txn_01001");

    let first = executor.execute(&request).await.unwrap();
    let replay = executor.execute(&request).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(replay.status, ActionStatus::CaseOpened);
    assert_eq!(service.effect_count("txn_01001").await, 1);
}

// ============================================================
// Outcome unknown
// ============================================================

#[tokio::test]
async fn test_timeout_after_send_is_outcome_unknown() {
    let (executor, service, _) = setup();
    service
        .fail_next_after_commit(ConnectorError::Timeout("read timed out".into()))
        .await;
    let request = ActionRequest::freeze_card("card_01", "123456");

    let err = executor.execute(&request).await.unwrap_err();
    assert_eq!(
        err,
        ActionError::OutcomeUnknown {
            key: request.idempotency_key.clone()
        }
    );

    let retry = executor.execute(&request).await.unwrap();
    assert_eq!(retry.status, ActionStatus::Frozen);
    assert_eq!(service.effect_count("card_01").await, 1);
}

#[tokio::test]
async fn test_service_error_is_reported() {
    let (executor, service, _) = setup();
    service
        .fail_next(ConnectorError::ServiceError("503".into()))
        .await;

    let err = executor
        .execute(&ActionRequest::open_dispute("txn_01001"))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::ServiceError(_)));
    assert_eq!(service.effect_count("txn_01001").await, 0);
}

// ============================================================
// Step-up
// ============================================================

#[tokio::test]
async fn test_invalid_otp_no_effect_and_new_key_succeeds() {
    let (executor, service, metrics) = setup();

    let rejected = ActionRequest::freeze_card("card_01", "000000");
    let err = executor.execute(&rejected).await.unwrap_err();
    assert_eq!(err, ActionError::InvalidOtp);
    assert_eq!(service.effect_count("card_01").await, 0);

    let accepted = ActionRequest::freeze_card("card_01", "123456");
    assert_ne!(accepted.idempotency_key, rejected.idempotency_key);
    let result = executor.execute(&accepted).await.unwrap();
    assert_eq!(result.status, ActionStatus::Frozen);
    assert_eq!(service.effect_count("card_01").await, 1);

    metrics.flush().await;
    let snapshot = metrics.snapshot().await;
    assert_eq!(
        snapshot.get(ACTION_BLOCKED_TOTAL, &[("policy", "invalid_otp")]),
        1
    );
    assert_eq!(
        snapshot.get(
            ACTIONS_EXECUTED_TOTAL,
            &[("action", "freeze_card"), ("status", "FROZEN")]
        ),
        1
    );
}

#[tokio::test]
async fn test_dispute_default_reason_code_and_case_id() {
    let (executor, _, _) = setup();

    let result = executor
        .execute(
            &ActionRequest::open_dispute("txn_01001")
                .with_amount(4999)
                .with_merchant("ACME"),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ActionStatus::CaseOpened);
    assert!(result.case_id.is_some());
}
