//! Freeze card action.
//!
//! Freezing a card is gated by step-up authentication: the request must carry
//! an OTP, and the service verifies it before anything happens.

use crate::registry::{ActionError, RemedialAction};
use async_trait::async_trait;
use fl_connectors::{ActionService, ConnectorResult};
use fl_core::{mask_identifier, ActionRequest, ActionResult, ActionStatus, ActionType};
use tracing::{info, warn};

/// Action to freeze a payment card.
pub struct FreezeCardAction;

impl FreezeCardAction {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FreezeCardAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemedialAction for FreezeCardAction {
    fn action_type(&self) -> ActionType {
        ActionType::FreezeCard
    }

    fn description(&self) -> &str {
        "Freezes a card after step-up verification"
    }

    fn validate(&self, request: &ActionRequest) -> Result<(), ActionError> {
        if request.subject_id.trim().is_empty() {
            return Err(ActionError::InvalidParameters(
                "freeze_card requires a card id".to_string(),
            ));
        }
        match request.otp.as_deref() {
            Some(otp) if !otp.trim().is_empty() => Ok(()),
            _ => Err(ActionError::StepUpRequired(ActionType::FreezeCard)),
        }
    }

    async fn perform(
        &self,
        service: &dyn ActionService,
        request: &ActionRequest,
    ) -> ConnectorResult<ActionResult> {
        let otp = request.otp.as_deref().unwrap_or_default();
        info!(card = %mask_identifier(&request.subject_id), "Freezing card");
        service
            .freeze_card(&request.subject_id, otp, &request.idempotency_key)
            .await
    }

    fn interpret(&self, result: ActionResult) -> Result<ActionResult, ActionError> {
        if result.status == ActionStatus::InvalidOtp {
            warn!(key = %result.idempotency_key, "OTP rejected, card not frozen");
            return Err(ActionError::InvalidOtp);
        }
        Ok(result)
    }
}
