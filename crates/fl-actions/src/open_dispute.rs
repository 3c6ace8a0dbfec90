//! Open dispute action.

use crate::registry::{ActionError, RemedialAction};
use async_trait::async_trait;
use fl_connectors::{ActionService, ConnectorError, ConnectorResult, DisputeRequest};
use fl_core::{
    is_valid_reason_code, ActionRequest, ActionResult, ActionType, DEFAULT_REASON_CODE,
};
use tracing::info;

/// Action to open a chargeback dispute for a transaction.
///
/// The reason code defaults to `10.4` (unauthorized transaction).
pub struct OpenDisputeAction;

impl OpenDisputeAction {
    pub fn new() -> Self {
        Self
    }

    fn reason_code(request: &ActionRequest) -> &str {
        request
            .reason_code
            .as_deref()
            .unwrap_or(DEFAULT_REASON_CODE)
    }
}

impl Default for OpenDisputeAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemedialAction for OpenDisputeAction {
    fn action_type(&self) -> ActionType {
        ActionType::OpenDispute
    }

    fn description(&self) -> &str {
        "Opens a dispute case for a transaction"
    }

    fn validate(&self, request: &ActionRequest) -> Result<(), ActionError> {
        if request.subject_id.trim().is_empty() {
            return Err(ActionError::InvalidParameters(
                "open_dispute requires a transaction id".to_string(),
            ));
        }
        let code = Self::reason_code(request);
        if !is_valid_reason_code(code) {
            return Err(ActionError::InvalidReasonCode(code.to_string()));
        }
        if matches!(request.amount, Some(amount) if amount < 0) {
            return Err(ActionError::InvalidParameters(
                "dispute amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    async fn perform(
        &self,
        service: &dyn ActionService,
        request: &ActionRequest,
    ) -> ConnectorResult<ActionResult> {
        let dispute = DisputeRequest {
            txn_id: request.subject_id.clone(),
            reason_code: Self::reason_code(request).to_string(),
            amount: request.amount,
            merchant: request.merchant.clone(),
        };
        info!(txn = %dispute.txn_id, reason_code = %dispute.reason_code, "Opening dispute");
        let result = service
            .open_dispute(&dispute, &request.idempotency_key)
            .await?;
        if result.status.is_success() && result.case_id.is_none() {
            return Err(ConnectorError::InvalidResponse(
                "Dispute opened without a case id".to_string(),
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reason_code() {
        let request = ActionRequest::open_dispute("txn_01001");
        assert_eq!(OpenDisputeAction::reason_code(&request), "10.4");
        assert!(OpenDisputeAction::new().validate(&request).is_ok());
    }

    #[test]
    fn test_invalid_reason_code() {
        let request = ActionRequest::open_dispute("txn_01001").with_reason_code("99.9");
        assert_eq!(
            OpenDisputeAction::new().validate(&request),
            Err(ActionError::InvalidReasonCode("99.9".to_string()))
        );
    }

    #[test]
    fn test_negative_amount() {
        let request = ActionRequest::open_dispute("txn_01001").with_amount(-1);
        assert!(matches!(
            OpenDisputeAction::new().validate(&request),
            Err(ActionError::InvalidParameters(_))
        ));
    }
}
