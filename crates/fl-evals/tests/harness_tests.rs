//! Integration tests for the evaluation harness against in-memory services.

use async_trait::async_trait;
use fl_actions::ActionExecutor;
use fl_connectors::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, DecisionService,
    MockActionService, MockDecisionService,
};
use fl_core::{RecommendedAction, RiskScore, TriageDecision, TriageRequest};
use fl_evals::{
    DirectoryFixtures, EvalCase, EvalReport, EvaluationHarness, ExpectedDecision, HarnessConfig,
    HarnessError, HarnessState, StaticFixtures, BURST_PROBE, LEAK_PROBE,
};
use fl_observability::MetricsSink;
use fl_triage::{TriageClient, TriageClientConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

/// Admits `limit` calls per window of Tokio time and rate limits the rest
/// until the window rolls over.
struct WindowedService {
    inner: MockDecisionService,
    limit: u64,
    window: Duration,
    current: Mutex<(Instant, u64)>,
    rejected: AtomicU64,
}

impl WindowedService {
    fn new(inner: MockDecisionService, limit: u64, window: Duration) -> Self {
        Self {
            inner,
            limit,
            window,
            current: Mutex::new((Instant::now(), 0)),
            rejected: AtomicU64::new(0),
        }
    }

    fn admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut current = self.current.lock().unwrap();
        if now >= current.0 + self.window {
            *current = (now, 0);
        }
        if current.1 < self.limit {
            current.1 += 1;
            Ok(())
        } else {
            Err(current.0 + self.window - now)
        }
    }
}

#[async_trait]
impl Connector for WindowedService {
    fn name(&self) -> &str {
        "windowed"
    }

    fn connector_type(&self) -> &str {
        "decision"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl DecisionService for WindowedService {
    async fn submit_triage(&self, request: &TriageRequest) -> ConnectorResult<TriageDecision> {
        if let Err(wait) = self.admit() {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(ConnectorError::RateLimited {
                retry_after_ms: Some(wait.as_millis().max(1) as u64),
            });
        }
        self.inner.submit_triage(request).await
    }
}

fn client_for(decisions: Arc<dyn DecisionService>, config: TriageClientConfig) -> Arc<TriageClient> {
    let executor = Arc::new(ActionExecutor::new(
        Arc::new(MockActionService::new("actions")),
        MetricsSink::new(),
    ));
    Arc::new(
        TriageClient::new(decisions, MetricsSink::new())
            .with_executor(executor)
            .with_config(config),
    )
}

async fn scripted_service() -> MockDecisionService {
    let service = MockDecisionService::new("decision");
    service
        .script(
            "txn_01001",
            TriageDecision::new(RiskScore::High, RecommendedAction::FreezeCard)
                .with_reasons(["card_lost"])
                .requiring_otp(),
        )
        .await;
    service
        .script(
            "txn_01003",
            TriageDecision::new(RiskScore::Low, RecommendedAction::ExplainDuplicate)
                .with_reasons(["preauth_capture"]),
        )
        .await;
    service
        .script(
            "txn_01010",
            TriageDecision::new(RiskScore::Low, RecommendedAction::ContactCustomer),
        )
        .await;
    service
}

fn case(id: &str, txn: &str, expected: ExpectedDecision) -> EvalCase {
    EvalCase {
        id: id.to_string(),
        description: format!("scenario {}", id),
        input: TriageRequest::new("cust_017", txn).with_message("please check this charge"),
        expected,
    }
}

fn golden_cases() -> Vec<EvalCase> {
    vec![
        case(
            "case_001",
            "txn_01001",
            ExpectedDecision {
                risk_score: Some(RiskScore::High),
                recommended_action: Some(RecommendedAction::FreezeCard),
                requires_otp: Some(true),
                ..Default::default()
            },
        ),
        case(
            "case_002",
            "txn_01003",
            ExpectedDecision {
                recommended_action: Some(RecommendedAction::ExplainDuplicate),
                reasons: Some(vec!["preauth_capture".to_string()]),
                ..Default::default()
            },
        ),
        case(
            "case_003",
            "txn_01010",
            ExpectedDecision {
                risk_score: Some(RiskScore::Low),
                ..Default::default()
            },
        ),
    ]
}

fn no_probes(case_delay_ms: u64) -> HarnessConfig {
    HarnessConfig {
        case_delay_ms,
        run_probes: false,
        ..Default::default()
    }
}

// ============================================================
// Full runs
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_full_run_passes_cases_and_probes() {
    let service = Arc::new(WindowedService::new(
        scripted_service().await,
        5,
        Duration::from_millis(1000),
    ));
    let client = client_for(service.clone(), TriageClientConfig::default());
    let mut harness = EvaluationHarness::new(client, StaticFixtures::new(golden_cases()));

    let report = harness.run().await.unwrap();

    assert_eq!(harness.state(), HarnessState::Done);
    assert_eq!(report.metrics.total_tests, 3);
    assert_eq!(report.metrics.passed_tests, 3);
    assert_eq!(report.summary.success_rate, 100.0);
    assert_eq!(report.metrics.confusion_matrix["high"], 1);
    assert_eq!(report.metrics.confusion_matrix["low"], 2);
    assert_eq!(report.metrics.policy_denials["otp_required"], 1);

    let burst = report.probes.iter().find(|p| p.name == BURST_PROBE).unwrap();
    assert!(burst.passed, "{}", burst.detail);
    assert!(service.rejected.load(Ordering::SeqCst) >= 1);

    let leak = report.probes.iter().find(|p| p.name == LEAK_PROBE).unwrap();
    assert!(leak.passed, "{}", leak.detail);
    assert!(report.all_passed());
}

#[tokio::test(start_paused = true)]
async fn test_state_history_walks_every_phase() {
    let service = Arc::new(scripted_service().await);
    let client = client_for(service, TriageClientConfig::default());
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(golden_cases())).with_config(no_probes(10));

    harness.run().await.unwrap();

    assert_eq!(
        harness.history(),
        &[
            HarnessState::Idle,
            HarnessState::LoadingCases,
            HarnessState::Running { index: 1, total: 3 },
            HarnessState::Running { index: 2, total: 3 },
            HarnessState::Running { index: 3, total: 3 },
            HarnessState::Aggregating,
            HarnessState::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_burst_without_backpressure_fails_probe() {
    let service = Arc::new(scripted_service().await);
    let client = client_for(service, TriageClientConfig::default());
    let mut harness = EvaluationHarness::new(client, StaticFixtures::new(golden_cases()))
        .with_config(HarnessConfig {
            case_delay_ms: 0,
            probe_delay_ms: 0,
            ..Default::default()
        });

    let report = harness.run().await.unwrap();

    let burst = report.probes.iter().find(|p| p.name == BURST_PROBE).unwrap();
    assert!(!burst.passed);
    assert!(burst.detail.starts_with("0 of 10"));
    assert!(!report.all_passed());
}

// ============================================================
// Ordering and pacing
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_cases_run_in_id_order_with_pacing() {
    let service = Arc::new(scripted_service().await);
    let client = client_for(service.clone(), TriageClientConfig::default());
    let mut cases = golden_cases();
    cases.reverse();
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(cases)).with_config(no_probes(2000));

    let started = Instant::now();
    harness.run().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(4000));
    let txns: Vec<String> = service
        .received()
        .await
        .into_iter()
        .filter_map(|r| r.suspect_txn_id)
        .collect();
    assert_eq!(txns, vec!["txn_01001", "txn_01003", "txn_01010"]);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_case_error_recorded_and_run_continues() {
    let service = Arc::new(scripted_service().await);
    service
        .fail_next(ConnectorError::ConnectionFailed("connection refused".to_string()))
        .await;
    let config = TriageClientConfig {
        fallback_on_error: false,
        ..Default::default()
    };
    let client = client_for(service, config);
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(golden_cases())).with_config(no_probes(0));

    let report = harness.run().await.unwrap();

    assert_eq!(report.metrics.total_tests, 3);
    assert_eq!(report.metrics.failed_tests, 1);
    let failed = &report.results[0];
    assert!(!failed.passed);
    assert!(failed.actual.is_none());
    assert!(failed.error.as_deref().unwrap().contains("connection refused"));
    assert!(report.results[1].passed);
    assert!(report.render_text().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_counted_in_rate() {
    let service = Arc::new(scripted_service().await);
    service
        .fail_next(ConnectorError::ServiceError("upstream 500".to_string()))
        .await;
    let client = client_for(service, TriageClientConfig::default());
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(golden_cases())).with_config(no_probes(0));

    let report = harness.run().await.unwrap();

    let fallback = &report.results[0];
    assert!(fallback.fallback_used);
    assert!(!fallback.passed);
    assert!(fallback.error.is_none());
    assert!(!fallback.mismatches.is_empty());
    assert!((report.metrics.fallback_rate - 1.0 / 3.0).abs() < 1e-9);
    assert!((report.summary.fallback_rate - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_mismatch_lists_fields() {
    let service = Arc::new(scripted_service().await);
    let client = client_for(service, TriageClientConfig::default());
    let wrong = case(
        "case_009",
        "txn_01003",
        ExpectedDecision {
            risk_score: Some(RiskScore::High),
            ..Default::default()
        },
    );
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(vec![wrong])).with_config(no_probes(0));

    let report = harness.run().await.unwrap();

    assert_eq!(
        report.results[0].mismatches,
        vec!["riskScore: expected high, got low".to_string()]
    );
}

#[tokio::test]
async fn test_fixture_failure_is_fatal() {
    let service = Arc::new(MockDecisionService::new("decision"));
    let client = client_for(service.clone(), TriageClientConfig::default());
    let mut harness = EvaluationHarness::new(client, DirectoryFixtures::new("/nonexistent/evals"));

    let err = harness.run().await.unwrap_err();

    assert!(matches!(err, HarnessError::Fixtures(_)));
    assert_eq!(harness.state(), HarnessState::Error);
    assert_eq!(
        harness.history(),
        &[HarnessState::Idle, HarnessState::LoadingCases, HarnessState::Error]
    );
    assert_eq!(service.call_count(), 0);
}

// ============================================================
// Report
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_report_round_trips_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("eval-report.json");
    let service = Arc::new(scripted_service().await);
    let client = client_for(service, TriageClientConfig::default());
    let mut harness =
        EvaluationHarness::new(client, StaticFixtures::new(golden_cases())).with_config(no_probes(0));

    let report = harness.run().await.unwrap();
    report.save(&path).await.unwrap();

    let loaded: EvalReport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.metrics, report.metrics);
    assert_eq!(loaded.results.len(), 3);
    assert_eq!(loaded.results[0].id, "case_001");
}
