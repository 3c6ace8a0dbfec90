//! Action executor.
//!
//! Runs one remedial action per call. Duplicate effects are prevented by the
//! service's idempotency contract, not by local locking: the executor may be
//! called concurrently for the same card or transaction.

use crate::registry::{ActionError, ActionRegistry};
use fl_connectors::{ActionService, ConnectorError};
use fl_core::{mask_identifier, ActionRequest, ActionResult, IdempotencyKey};
use fl_observability::MetricsSink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Upper bound on one action call, retries inside the connector included.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes remedial actions idempotently and with step-up enforcement.
pub struct ActionExecutor {
    registry: ActionRegistry,
    service: Arc<dyn ActionService>,
    metrics: MetricsSink,
    timeout: Duration,
}

impl ActionExecutor {
    /// Creates an executor with the default actions.
    pub fn new(service: Arc<dyn ActionService>, metrics: MetricsSink) -> Self {
        Self::with_registry(ActionRegistry::with_defaults(), service, metrics)
    }

    pub fn with_registry(
        registry: ActionRegistry,
        service: Arc<dyn ActionService>,
        metrics: MetricsSink,
    ) -> Self {
        Self {
            registry,
            service,
            metrics,
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Executes an action.
    ///
    /// Validation failures are reported before anything is sent. Once the
    /// request has been sent, a timeout is reported as
    /// [`ActionError::OutcomeUnknown`]: the caller must retry with the same
    /// key rather than assume nothing happened.
    #[instrument(
        skip_all,
        fields(
            action = %request.action_type,
            subject = %mask_identifier(&request.subject_id),
            key = %request.idempotency_key
        )
    )]
    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ActionError> {
        let action = self
            .registry
            .get(request.action_type)
            .ok_or_else(|| ActionError::NotSupported(request.action_type.to_string()))?;

        if let Err(e) = action.validate(request) {
            self.record_denial(&e);
            return Err(e);
        }

        let answer = tokio::time::timeout(
            self.timeout,
            action.perform(self.service.as_ref(), request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ConnectorError::Timeout(format!(
                "no answer within {:?}",
                self.timeout
            )))
        });

        let result = match answer {
            Ok(result) => result,
            Err(e) => self.recover(request, e).await?,
        };

        self.metrics
            .record_action_executed(request.action_type.as_str(), &result.status.to_string());

        let result = action.interpret(result).map_err(|e| {
            self.record_denial(&e);
            e
        })?;

        if request.action_type.requires_step_up() && result.status.is_success() {
            self.metrics.record_policy_gated_approval("otp_required");
        }

        info!(status = %result.status, "Action completed");
        Ok(result)
    }

    /// Maps a failed call to a result or a typed error.
    async fn recover(
        &self,
        request: &ActionRequest,
        error: ConnectorError,
    ) -> Result<ActionResult, ActionError> {
        match error {
            ConnectorError::IdempotencyConflict {
                original: Some(original),
                ..
            } => {
                debug!("Key already used, returning original result");
                Ok(*original)
            }
            ConnectorError::IdempotencyConflict { key, original: None } => {
                debug!("Key already used, fetching original result");
                self.fetch_original(key).await
            }
            ConnectorError::Timeout(message) => {
                warn!(%message, "Action timed out after the key was sent");
                Err(ActionError::OutcomeUnknown {
                    key: request.idempotency_key.clone(),
                })
            }
            ConnectorError::InvalidRequest(message) => Err(ActionError::InvalidParameters(message)),
            other => Err(ActionError::ServiceError(other.to_string())),
        }
    }

    async fn fetch_original(&self, key: IdempotencyKey) -> Result<ActionResult, ActionError> {
        match self.service.fetch_result(&key).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(error = %e, "Original result unavailable");
                Err(ActionError::OutcomeUnknown { key })
            }
        }
    }

    fn record_denial(&self, error: &ActionError) {
        if let Some(label) = error.policy_label() {
            self.metrics.record_policy_denial(label);
        }
    }
}
