//! In-process services for `fraudline eval --demo`.
//!
//! The decision service answers the golden fixtures under `fixtures/evals/`
//! and admits a handful of requests per second, so the burst probe sees
//! backpressure.

use fl_connectors::{MockActionService, MockDecisionService};
use fl_core::{RecommendedAction, RiskScore, TriageDecision};
use std::num::NonZeroU32;

const REQUESTS_PER_SECOND: u32 = 5;

fn scripted_decisions() -> Vec<(&'static str, TriageDecision)> {
    vec![
        (
            "txn_01001",
            TriageDecision::new(RiskScore::High, RecommendedAction::FreezeCard)
                .with_reasons(["card_lost", "unusual_location"])
                .requiring_otp()
                .with_card("card_017_1"),
        ),
        (
            "txn_01005",
            TriageDecision::new(RiskScore::High, RecommendedAction::OpenDispute)
                .with_reasons(["merchant_not_recognized", "no_prior_relationship"]),
        ),
        (
            "txn_01003",
            TriageDecision::new(RiskScore::Medium, RecommendedAction::ExplainDuplicate)
                .with_reasons(["duplicate_transaction", "preauth_capture"]),
        ),
        (
            "txn_01010",
            TriageDecision::new(RiskScore::Low, RecommendedAction::ContactCustomer)
                .with_reasons(["small_amount"]),
        ),
        (
            "txn_01020",
            TriageDecision::new(RiskScore::High, RecommendedAction::FreezeCard)
                .with_reasons(["geo_velocity"])
                .requiring_otp()
                .with_card("card_017_1"),
        ),
        (
            "txn_01030",
            TriageDecision::new(RiskScore::Medium, RecommendedAction::ContactCustomer)
                .with_reasons(["chargeback_history"]),
        ),
        (
            "txn_01040",
            TriageDecision::new(RiskScore::Medium, RecommendedAction::ContactCustomer)
                .with_reasons(["device_change", "new_login_location"]),
        ),
        (
            "txn_01050",
            TriageDecision::new(RiskScore::Low, RecommendedAction::ContactCustomer)
                .with_reasons(["merchant_descriptor_ambiguous"]),
        ),
        (
            "txn_01060",
            TriageDecision::new(RiskScore::High, RecommendedAction::FreezeCard)
                .with_reasons(["card_compromised", "foreign_transaction"])
                .requiring_otp()
                .with_card("card_080_1"),
        ),
        (
            "txn_01070",
            TriageDecision::new(RiskScore::Medium, RecommendedAction::ContactCustomer)
                .with_reasons(["customer_reported_issue"]),
        ),
        (
            "txn_01080",
            TriageDecision::new(RiskScore::Low, RecommendedAction::ExplainDuplicate)
                .with_reasons(["preauth_capture"]),
        ),
    ]
}

async fn scripted(service: MockDecisionService) -> MockDecisionService {
    for (txn, decision) in scripted_decisions() {
        service.script(txn, decision).await;
    }
    service
}

/// Decision service scripted for the bundled fixtures.
pub async fn decision_service() -> MockDecisionService {
    let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
    scripted(MockDecisionService::new("demo-decision").with_rate_limit_per_second(per_second)).await
}

pub fn action_service() -> MockActionService {
    MockActionService::new("demo-actions")
}
