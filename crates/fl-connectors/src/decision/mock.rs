//! Mock decision service for testing.

use crate::traits::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, DecisionService,
};
use async_trait::async_trait;
use fl_core::{RecommendedAction, RiskScore, TriageDecision, TriageRequest};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Scripted decision service.
///
/// Decisions are looked up by suspect transaction id, then alert type, then
/// customer id; unmatched requests get a medium-risk `contact_customer`
/// decision. Every request is recorded as received.
pub struct MockDecisionService {
    name: String,
    decisions: Arc<RwLock<HashMap<String, TriageDecision>>>,
    default_decision: TriageDecision,
    received: Arc<RwLock<Vec<TriageRequest>>>,
    failures: Arc<RwLock<VecDeque<ConnectorError>>>,
    allowance: Option<u64>,
    served: AtomicU64,
    retry_after_ms: Option<u64>,
    quota: Option<DefaultDirectRateLimiter>,
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl MockDecisionService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            decisions: Arc::new(RwLock::new(HashMap::new())),
            default_decision: TriageDecision::new(
                RiskScore::Medium,
                RecommendedAction::ContactCustomer,
            )
            .with_reasons(["needs_review"]),
            received: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(VecDeque::new())),
            allowance: None,
            served: AtomicU64::new(0),
            retry_after_ms: None,
            quota: None,
            latency: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Answers with a rate-limit signal once `limit` requests have been served.
    pub fn with_rate_limit_after(mut self, limit: u64, retry_after_ms: Option<u64>) -> Self {
        self.allowance = Some(limit);
        self.retry_after_ms = retry_after_ms;
        self
    }

    /// Answers with a rate-limit signal when more than `per_second` requests
    /// arrive within a second. The signal carries the time until the next
    /// request would be admitted.
    pub fn with_rate_limit_per_second(mut self, per_second: NonZeroU32) -> Self {
        self.quota = Some(RateLimiter::direct(Quota::per_second(per_second)));
        self
    }

    /// Delays every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Scripts the decision for a transaction id, alert type or customer id.
    pub async fn script(&self, key: &str, decision: TriageDecision) {
        self.decisions
            .write()
            .await
            .insert(key.to_string(), decision);
    }

    /// Makes the next call fail with `error`. Failures queue up in order.
    pub async fn fail_next(&self, error: ConnectorError) {
        self.failures.write().await.push_back(error);
    }

    /// Requests received so far, as transmitted.
    pub async fn received(&self) -> Vec<TriageRequest> {
        self.received.read().await.clone()
    }

    /// Number of calls that reached the service.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn lookup(&self, request: &TriageRequest) -> TriageDecision {
        let decisions = self.decisions.read().await;
        [
            request.suspect_txn_id.as_deref(),
            request.alert_type.as_deref(),
            Some(request.customer_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .find_map(|key| decisions.get(key).cloned())
        .unwrap_or_else(|| self.default_decision.clone())
    }
}

#[async_trait]
impl Connector for MockDecisionService {
    fn name(&self) -> &str {
        &self.name
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
impl DecisionService for MockDecisionService {
    async fn submit_triage(&self, request: &TriageRequest) -> ConnectorResult<TriageDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.write().await.push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(allowance) = self.allowance {
            if self.served.fetch_add(1, Ordering::SeqCst) >= allowance {
                return Err(ConnectorError::RateLimited {
                    retry_after_ms: self.retry_after_ms,
                });
            }
        }

        if let Some(quota) = &self.quota {
            if let Err(not_until) = quota.check() {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                return Err(ConnectorError::RateLimited {
                    retry_after_ms: Some(wait.as_millis().max(1) as u64),
                });
            }
        }

        if let Some(error) = self.failures.write().await.pop_front() {
            return Err(error);
        }

        Ok(self.lookup(request).await)
    }
}
