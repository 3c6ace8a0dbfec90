//! Mock action service for testing.
//!
//! Honors the idempotency contract: the first request for a key decides the
//! result, later requests with the same key get that result back (or an
//! idempotency conflict) and never repeat the effect.

use crate::traits::{
    ActionService, Connector, ConnectorError, ConnectorHealth, ConnectorResult, DisputeRequest,
};
use async_trait::async_trait;
use fl_core::{ActionResult, ActionStatus, ActionType, IdempotencyKey};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default OTP accepted by the mock.
pub const MOCK_VALID_OTP: &str = "123456";

enum InjectedFailure {
    /// Fail without recording anything.
    BeforeCommit(ConnectorError),
    /// Record the result and apply the effect, then fail.
    AfterCommit(ConnectorError),
}

/// In-memory action service.
pub struct MockActionService {
    name: String,
    results: Arc<RwLock<HashMap<IdempotencyKey, ActionResult>>>,
    valid_otps: Arc<RwLock<HashSet<String>>>,
    effects: Arc<RwLock<HashMap<String, u64>>>,
    failures: Arc<RwLock<VecDeque<InjectedFailure>>>,
    conflict_on_replay: bool,
    case_counter: AtomicU64,
    calls: AtomicU64,
}

impl MockActionService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Arc::new(RwLock::new(HashMap::new())),
            valid_otps: Arc::new(RwLock::new(HashSet::from([MOCK_VALID_OTP.to_string()]))),
            effects: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(VecDeque::new())),
            conflict_on_replay: false,
            case_counter: AtomicU64::new(1),
            calls: AtomicU64::new(0),
        }
    }

    /// Answers replayed keys with an idempotency conflict carrying no body.
    pub fn with_conflict_on_replay(mut self) -> Self {
        self.conflict_on_replay = true;
        self
    }

    pub async fn add_valid_otp(&self, otp: &str) {
        self.valid_otps.write().await.insert(otp.to_string());
    }

    /// Fails the next call before anything is recorded.
    pub async fn fail_next(&self, error: ConnectorError) {
        self.failures
            .write()
            .await
            .push_back(InjectedFailure::BeforeCommit(error));
    }

    /// Commits the next call, then fails it, as a timeout after the key
    /// reached the service would.
    pub async fn fail_next_after_commit(&self, error: ConnectorError) {
        self.failures
            .write()
            .await
            .push_back(InjectedFailure::AfterCommit(error));
    }

    /// Number of times the effect was applied to a subject.
    pub async fn effect_count(&self, subject_id: &str) -> u64 {
        self.effects
            .read()
            .await
            .get(subject_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls received, replays included.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_failure(&self) -> Option<InjectedFailure> {
        self.failures.write().await.pop_front()
    }

    /// Runs one action under the idempotency contract.
    ///
    /// `decide` returns the status and whether the effect is applied; it runs
    /// at most once per key.
    async fn perform<F>(
        &self,
        key: &IdempotencyKey,
        action_type: ActionType,
        subject_id: &str,
        decide: F,
    ) -> ConnectorResult<ActionResult>
    where
        F: FnOnce(&HashSet<String>) -> (ActionStatus, bool) + Send,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let after_commit = match self.next_failure().await {
            Some(InjectedFailure::BeforeCommit(e)) => return Err(e),
            Some(InjectedFailure::AfterCommit(e)) => Some(e),
            None => None,
        };

        let mut results = self.results.write().await;
        if let Some(original) = results.get(key) {
            if self.conflict_on_replay {
                return Err(ConnectorError::IdempotencyConflict {
                    key: key.clone(),
                    original: None,
                });
            }
            return Ok(original.clone());
        }

        let (status, effect) = decide(&*self.valid_otps.read().await);
        let mut result = ActionResult::new(action_type, status, key.clone());
        if effect {
            *self
                .effects
                .write()
                .await
                .entry(subject_id.to_string())
                .or_insert(0) += 1;
            if action_type == ActionType::OpenDispute {
                let n = self.case_counter.fetch_add(1, Ordering::SeqCst);
                result.case_id = Some(format!("CASE-{:08}", n));
            }
        }
        results.insert(key.clone(), result.clone());

        match after_commit {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}

#[async_trait]
impl Connector for MockActionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "action"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl ActionService for MockActionService {
    async fn freeze_card(
        &self,
        card_id: &str,
        otp: &str,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult> {
        self.perform(key, ActionType::FreezeCard, card_id, |valid| {
            if valid.contains(otp) {
                (ActionStatus::Frozen, true)
            } else {
                (ActionStatus::InvalidOtp, false)
            }
        })
        .await
    }

    async fn open_dispute(
        &self,
        dispute: &DisputeRequest,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult> {
        self.perform(key, ActionType::OpenDispute, &dispute.txn_id, |_| {
            (ActionStatus::CaseOpened, true)
        })
        .await
    }

    async fn fetch_result(&self, key: &IdempotencyKey) -> ConnectorResult<ActionResult> {
        self.results
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key(subject: &str) -> IdempotencyKey {
        IdempotencyKey::generate(ActionType::FreezeCard, subject, Utc::now())
    }

    fn dispute(txn: &str) -> DisputeRequest {
        DisputeRequest {
            txn_id: txn.to_string(),
            reason_code: "10.4".to_string(),
            amount: Some(4999),
            merchant: Some("ACME".to_string()),
        }
    }

    #[tokio::test]
    async fn test_replay_returns_original_without_effect() {
        let service = MockActionService::new("actions");
        let key = key("card_01");

        let first = service.freeze_card("card_01", "123456", &key).await.unwrap();
        let second = service.freeze_card("card_01", "123456", &key).await.unwrap();

        assert_eq!(first.status, ActionStatus::Frozen);
        assert_eq!(first, second);
        assert_eq!(service.effect_count("card_01").await, 1);
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_otp_has_no_effect() {
        let service = MockActionService::new("actions");
        let result = service
            .freeze_card("card_01", "000000", &key("card_01"))
            .await
            .unwrap();
        assert_eq!(result.status, ActionStatus::InvalidOtp);
        assert_eq!(service.effect_count("card_01").await, 0);
    }

    #[tokio::test]
    async fn test_dispute_gets_case_id() {
        let service = MockActionService::new("actions");
        let result = service
            .open_dispute(&dispute("txn_01001"), &key("txn_01001"))
            .await
            .unwrap();
        assert_eq!(result.status, ActionStatus::CaseOpened);
        assert_eq!(result.case_id.as_deref(), Some("CASE-00000001"));
    }

    #[tokio::test]
    async fn test_conflict_on_replay() {
        let service = MockActionService::new("actions").with_conflict_on_replay();
        let key = key("txn_01001");
        service.open_dispute(&dispute("txn_01001"), &key).await.unwrap();

        let err = service
            .open_dispute(&dispute("txn_01001"), &key)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::IdempotencyConflict { .. }));

        let original = service.fetch_result(&key).await.unwrap();
        assert_eq!(original.status, ActionStatus::CaseOpened);
        assert_eq!(service.effect_count("txn_01001").await, 1);
    }

    #[tokio::test]
    async fn test_failure_after_commit_keeps_effect() {
        let service = MockActionService::new("actions");
        service
            .fail_next_after_commit(ConnectorError::Timeout("read timed out".into()))
            .await;
        let key = key("card_01");

        let err = service
            .freeze_card("card_01", "123456", &key)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Timeout(_)));
        assert_eq!(service.effect_count("card_01").await, 1);

        let retry = service.freeze_card("card_01", "123456", &key).await.unwrap();
        assert_eq!(retry.status, ActionStatus::Frozen);
        assert_eq!(service.effect_count("card_01").await, 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown_key() {
        let service = MockActionService::new("actions");
        let err = service.fetch_result(&key("card_01")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound(_)));
    }
}
