//! Triage client.
//!
//! One [`TriageClient`] is shared by every caller that triages alerts. It
//! owns the rate-limit window, so a rate-limit answer seen by one caller
//! pauses all of them.

use crate::backoff::RateLimitGate;
use crate::config::TriageClientConfig;
use fl_actions::{ActionError, ActionExecutor};
use fl_connectors::{ConnectorError, DecisionService};
use fl_core::{
    mask_identifier, ActionRequest, ActionResult, ActionStatus, ActionType, RecommendedAction,
    TriageDecision, TriageOutcome, TriageRequest, TriageState, TriageWorkflow, WorkflowError,
};
use fl_observability::MetricsSink;
use fl_policy::{PolicyAnnotator, Redactor};
use moka::future::Cache as MokaCache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

/// Trace step recorded when sensitive data was found in a submission.
pub const PII_DETECTION_STEP: &str = "pii_detection";
/// Trace step recorded when that data was masked before transmission.
pub const REDACTION_APPLIED_STEP: &str = "redaction_applied";

/// Errors surfaced by [`TriageClient::submit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriageError {
    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

type PendingKey = (ActionType, String);

/// Submits triage requests and orchestrates the resulting actions.
pub struct TriageClient {
    decision: Arc<dyn DecisionService>,
    executor: Option<Arc<ActionExecutor>>,
    redactor: Redactor,
    annotator: PolicyAnnotator,
    metrics: MetricsSink,
    config: TriageClientConfig,
    gate: RateLimitGate,
    pending: MokaCache<PendingKey, ActionRequest>,
}

/// Actions whose outcome is unknown, kept until retried or expired.
fn pending_actions(config: &TriageClientConfig) -> MokaCache<PendingKey, ActionRequest> {
    MokaCache::builder()
        .time_to_live(config.pending_ttl())
        .max_capacity(config.max_pending_actions)
        .build()
}

impl TriageClient {
    /// Creates a client that only triages; decisions with a side effect are
    /// reported without being executed until an executor is attached.
    pub fn new(decision: Arc<dyn DecisionService>, metrics: MetricsSink) -> Self {
        let config = TriageClientConfig::default();
        Self {
            decision,
            executor: None,
            redactor: Redactor::new(),
            annotator: PolicyAnnotator::new(),
            metrics,
            gate: RateLimitGate::new(),
            pending: pending_actions(&config),
            config,
        }
    }

    pub fn with_executor(mut self, executor: Arc<ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_annotator(mut self, annotator: PolicyAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_config(mut self, config: TriageClientConfig) -> Self {
        self.pending = pending_actions(&config);
        self.config = config;
        self
    }

    pub fn config(&self) -> &TriageClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsSink {
        &self.metrics
    }

    /// Time left before submissions are accepted again, if rate limited.
    pub fn rate_limited_for(&self) -> Option<Duration> {
        self.gate.remaining()
    }

    /// Submits a triage request.
    ///
    /// Pass the operator's OTP when resubmitting after an outcome that was
    /// awaiting step-up. Rate limiting is reported as an error; any other
    /// service failure becomes a degraded outcome (unless
    /// `fallback_on_error` is off).
    #[instrument(
        skip_all,
        fields(customer = %mask_identifier(&request.customer_id), step_up = otp.is_some())
    )]
    pub async fn submit(
        &self,
        request: &TriageRequest,
        otp: Option<&str>,
    ) -> Result<TriageOutcome, TriageError> {
        let started = Instant::now();

        if let Some(remaining) = self.gate.remaining() {
            self.metrics.record_rate_limited();
            debug!(remaining_ms = remaining.as_millis() as u64, "Rejected by rate-limit gate");
            return Err(TriageError::RateLimited {
                retry_after_ms: remaining.as_millis() as u64,
            });
        }

        let mut workflow = TriageWorkflow::new();
        let (outgoing, pii_detected) = self.redactor.redact_request(request);
        if pii_detected {
            info!("Sensitive data masked before submission");
        }

        let answer = match timeout(self.config.timeout(), self.decision.submit_triage(&outgoing))
            .await
        {
            Ok(answer) => answer,
            Err(_) => Err(ConnectorError::Timeout(format!(
                "no decision within {:?}",
                self.config.timeout()
            ))),
        };

        let outcome = match answer {
            Ok(decision) => {
                self.resolve(decision, request, otp, pii_detected, &mut workflow)
                    .await?
            }
            Err(ConnectorError::RateLimited { retry_after_ms }) => {
                let window = retry_after_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| self.config.default_retry_after());
                self.gate.disable(window);
                return Err(TriageError::RateLimited {
                    retry_after_ms: window.as_millis() as u64,
                });
            }
            Err(e) => {
                warn!(error = %e, "Decision service failed");
                if !self.config.fallback_on_error {
                    return Err(TriageError::Network(e.to_string()));
                }
                self.metrics.record_fallback("triage");
                workflow.transition(TriageState::Error)?;
                let mut decision = TriageDecision::fallback();
                if pii_detected {
                    mark_redacted(&mut decision);
                }
                TriageOutcome::new(
                    decision,
                    workflow.state(),
                    "Decision service unavailable. Contact the customer and review manually.",
                )
            }
        };

        let outcome = self.annotate(outcome);
        self.metrics.record_triage_duration(started.elapsed());
        info!(
            state = %outcome.state,
            risk = %outcome.decision.risk_score,
            action = %outcome.decision.recommended_action,
            fallback = outcome.decision.fallback_used,
            "Triage complete"
        );
        Ok(outcome)
    }

    /// Like [`submit`](Self::submit), but never fails: a rate-limit or
    /// network error becomes a degraded outcome with guidance.
    pub async fn submit_with_guidance(
        &self,
        request: &TriageRequest,
        otp: Option<&str>,
    ) -> TriageOutcome {
        match self.submit(request, otp).await {
            Ok(outcome) => outcome,
            Err(TriageError::RateLimited { retry_after_ms }) => {
                let mut decision = TriageDecision::fallback();
                decision.reasons = vec![
                    "rate_limited".to_string(),
                    "manual_review_required".to_string(),
                ];
                self.annotate(TriageOutcome::new(
                    decision,
                    TriageState::Error,
                    format!(
                        "Decision service is busy, retry in {} ms. Contact the customer meanwhile.",
                        retry_after_ms
                    ),
                ))
            }
            Err(e) => {
                self.metrics.record_fallback("triage");
                self.annotate(TriageOutcome::new(
                    TriageDecision::fallback(),
                    TriageState::Error,
                    format!("Triage failed ({}). Contact the customer and review manually.", e),
                ))
            }
        }
    }

    /// Turns a raw decision into an outcome, running the action if due.
    async fn resolve(
        &self,
        mut decision: TriageDecision,
        request: &TriageRequest,
        otp: Option<&str>,
        pii_detected: bool,
        workflow: &mut TriageWorkflow,
    ) -> Result<TriageOutcome, TriageError> {
        let scrubbed = self.redactor.scrub_decision(&mut decision);
        if scrubbed > 0 {
            warn!(scrubbed, "Decision echoed sensitive data, masked");
        }
        if pii_detected || scrubbed > 0 {
            mark_redacted(&mut decision);
        }

        let otp = otp.filter(|otp| !otp.trim().is_empty());
        if decision.requires_otp && otp.is_none() {
            workflow.transition(TriageState::AwaitingStepUp)?;
            self.metrics.record_policy_denial("otp_required");
            let message = step_up_message(&decision.recommended_action);
            return Ok(TriageOutcome::new(decision, workflow.state(), message));
        }

        let (Some(action_type), Some(executor)) =
            (decision.recommended_action.side_effect(), &self.executor)
        else {
            workflow.transition(TriageState::Done)?;
            let message = guidance_message(&decision.recommended_action);
            return Ok(TriageOutcome::new(decision, workflow.state(), message));
        };

        let Some(subject) = action_subject(action_type, &decision, request) else {
            workflow.transition(TriageState::Done)?;
            let action_request = ActionRequest::new(action_type, "");
            let mut outcome = TriageOutcome::new(
                decision,
                workflow.state(),
                "Action blocked: no transaction to act on.",
            );
            outcome.action_result = Some(ActionResult::blocked(&action_request, "missing_subject"));
            return Ok(outcome);
        };

        let action_request = self
            .action_request(action_type, &subject, &decision, otp)
            .await;

        if action_type.requires_step_up() && action_request.otp.is_none() {
            workflow.transition(TriageState::AwaitingStepUp)?;
            self.metrics.record_policy_denial("otp_required");
            let message = step_up_message(&decision.recommended_action);
            return Ok(TriageOutcome::new(decision, workflow.state(), message));
        }

        workflow.transition(TriageState::Executing)?;
        let pending_key = (action_type, subject);
        let executed = executor.execute(&action_request).await;
        if !matches!(executed, Err(ActionError::OutcomeUnknown { .. })) {
            self.pending.invalidate(&pending_key).await;
        }

        let outcome = match executed {
            Ok(result) => {
                workflow.transition(TriageState::Done)?;
                let message = action_message(&result);
                let mut outcome = TriageOutcome::new(decision, workflow.state(), message);
                outcome.action_result = Some(result);
                outcome
            }
            Err(ActionError::InvalidOtp) => {
                workflow.transition(TriageState::AwaitingStepUp)?;
                let mut outcome = TriageOutcome::new(
                    decision,
                    workflow.state(),
                    "Invalid OTP. Request a new code and resubmit.",
                );
                outcome.action_result = Some(ActionResult::for_request(
                    &action_request,
                    ActionStatus::InvalidOtp,
                ));
                outcome
            }
            Err(ActionError::StepUpRequired(_)) => {
                workflow.transition(TriageState::AwaitingStepUp)?;
                let message = step_up_message(&decision.recommended_action);
                TriageOutcome::new(decision, workflow.state(), message)
            }
            Err(ActionError::OutcomeUnknown { key }) => {
                warn!(%key, "Action outcome unknown, keeping key for retry");
                self.pending
                    .insert(pending_key, action_request.clone())
                    .await;
                workflow.transition(TriageState::Error)?;
                let mut outcome = TriageOutcome::new(
                    decision,
                    workflow.state(),
                    "Action outcome unknown. Resubmit to retry safely.",
                );
                outcome.pending_idempotency_key = Some(key);
                outcome
            }
            Err(e @ (ActionError::InvalidReasonCode(_)
            | ActionError::InvalidParameters(_)
            | ActionError::NotSupported(_))) => {
                let rule = e.policy_label().unwrap_or("invalid_parameters");
                workflow.transition(TriageState::Done)?;
                let mut outcome = TriageOutcome::new(
                    decision,
                    workflow.state(),
                    format!("Action blocked: {}.", e),
                );
                outcome.action_result = Some(ActionResult::blocked(&action_request, rule));
                outcome
            }
            Err(e @ ActionError::ServiceError(_)) => {
                warn!(error = %e, "Action failed");
                workflow.transition(TriageState::Error)?;
                let mut outcome = TriageOutcome::new(
                    decision,
                    workflow.state(),
                    "Action service unavailable. Retry or escalate manually.",
                );
                outcome.action_result =
                    Some(ActionResult::for_request(&action_request, ActionStatus::Failed));
                outcome
            }
        };
        Ok(outcome)
    }

    /// Builds the action request, reusing the key of an attempt whose
    /// outcome is still unknown.
    async fn action_request(
        &self,
        action_type: ActionType,
        subject: &str,
        decision: &TriageDecision,
        otp: Option<&str>,
    ) -> ActionRequest {
        let pending = self
            .pending
            .get(&(action_type, subject.to_string()))
            .await;

        let mut request = match pending {
            Some(request) => {
                debug!(key = %request.idempotency_key, "Reusing key of unresolved attempt");
                request
            }
            None => {
                let mut request = ActionRequest::new(action_type, subject);
                request.reason_code = decision.reason_code.clone();
                request.amount = decision.dispute_amount;
                request.merchant = decision.merchant.clone();
                request
            }
        };
        if let Some(otp) = otp {
            request.otp = Some(otp.to_string());
        }
        request
    }

    /// Attaches policy annotations and masks the operator message, which
    /// can quote decision fields through action errors.
    fn annotate(&self, mut outcome: TriageOutcome) -> TriageOutcome {
        let (decision, citation) = self.annotator.annotate(&outcome.decision);
        outcome.decision = decision;
        outcome.citation = citation;
        let message = self.redactor.redact(&outcome.message);
        if message.pii_detected() {
            outcome.message = message.redacted_text;
        }
        outcome
    }
}

/// Prepends the redaction audit steps once.
fn mark_redacted(decision: &mut TriageDecision) {
    decision
        .trace_steps
        .retain(|step| step != PII_DETECTION_STEP && step != REDACTION_APPLIED_STEP);
    decision.trace_steps.splice(
        0..0,
        [
            PII_DETECTION_STEP.to_string(),
            REDACTION_APPLIED_STEP.to_string(),
        ],
    );
    decision.pii_detected = true;
}

/// The card to freeze or the transaction to dispute.
///
/// A freeze without a card id from the service targets the customer, whose
/// active card the action service resolves.
fn action_subject(
    action_type: ActionType,
    decision: &TriageDecision,
    request: &TriageRequest,
) -> Option<String> {
    match action_type {
        ActionType::FreezeCard => Some(
            decision
                .card_id
                .clone()
                .unwrap_or_else(|| request.customer_id.clone()),
        ),
        ActionType::OpenDispute => request.suspect_txn_id.clone(),
    }
}

fn step_up_message(action: &RecommendedAction) -> String {
    match action {
        RecommendedAction::FreezeCard => {
            "OTP verification required to freeze the card.".to_string()
        }
        _ => "OTP verification required for this action.".to_string(),
    }
}

fn guidance_message(action: &RecommendedAction) -> String {
    match action {
        RecommendedAction::ContactCustomer => {
            "Contact the customer to verify the transaction.".to_string()
        }
        RecommendedAction::ExplainDuplicate => {
            "Explain the preauthorization hold to the customer.".to_string()
        }
        RecommendedAction::FreezeCard => "Freeze the card once the customer confirms.".to_string(),
        RecommendedAction::OpenDispute => "Open a dispute for the transaction.".to_string(),
        other => format!("Recommended action: {}.", other),
    }
}

fn action_message(result: &ActionResult) -> String {
    match (result.status, result.case_id.as_deref()) {
        (ActionStatus::Frozen, _) => "Card frozen successfully".to_string(),
        (ActionStatus::CaseOpened, Some(case_id)) => format!("Dispute opened: case {}", case_id),
        (status, _) => format!("Action finished with status {}", status),
    }
}
