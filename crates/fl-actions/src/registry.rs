//! Action registry for Fraudline.
//!
//! This module provides the remedial action trait and the registry the
//! executor dispatches through.

use async_trait::async_trait;
use fl_connectors::{ActionService, ConnectorResult};
use fl_core::{ActionRequest, ActionResult, ActionType, IdempotencyKey};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::freeze_card::FreezeCardAction;
use crate::open_dispute::OpenDisputeAction;

/// Errors that can occur during action execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Step-up authentication required for {0}")]
    StepUpRequired(ActionType),

    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Action not supported: {0}")]
    NotSupported(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    /// The key reached the service but no answer came back. The effect may
    /// have happened; retry with the same key.
    #[error("Outcome unknown for {key}, retry with the same key")]
    OutcomeUnknown { key: IdempotencyKey },
}

impl ActionError {
    /// Label of the policy that refused the action, if any.
    pub fn policy_label(&self) -> Option<&'static str> {
        match self {
            ActionError::InvalidOtp => Some("invalid_otp"),
            ActionError::StepUpRequired(_) => Some("otp_required"),
            ActionError::InvalidReasonCode(_) => Some("invalid_reason_code"),
            _ => None,
        }
    }
}

/// A remedial action the executor can run.
#[async_trait]
pub trait RemedialAction: Send + Sync {
    /// Returns the action type this implementation handles.
    fn action_type(&self) -> ActionType;

    /// Returns the action description.
    fn description(&self) -> &str;

    /// Checks the request before anything is sent.
    fn validate(&self, request: &ActionRequest) -> Result<(), ActionError> {
        if request.subject_id.trim().is_empty() {
            return Err(ActionError::InvalidParameters(format!(
                "{} requires a subject id",
                self.action_type()
            )));
        }
        Ok(())
    }

    /// Sends the request to the action service.
    async fn perform(
        &self,
        service: &dyn ActionService,
        request: &ActionRequest,
    ) -> ConnectorResult<ActionResult>;

    /// Turns a service answer into the executor's result.
    fn interpret(&self, result: ActionResult) -> Result<ActionResult, ActionError> {
        Ok(result)
    }
}

/// Registry of remedial actions keyed by type.
pub struct ActionRegistry {
    actions: HashMap<ActionType, Arc<dyn RemedialAction>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Creates a registry with `freeze_card` and `open_dispute`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FreezeCardAction::new()));
        registry.register(Arc::new(OpenDisputeAction::new()));
        registry
    }

    pub fn register(&mut self, action: Arc<dyn RemedialAction>) {
        info!(action = %action.action_type(), "Registering action");
        self.actions.insert(action.action_type(), action);
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn RemedialAction>> {
        self.actions.get(&action_type).cloned()
    }

    /// Lists registered action types, sorted by name.
    pub fn list(&self) -> Vec<ActionType> {
        let mut types: Vec<ActionType> = self.actions.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ActionRegistry::with_defaults();
        assert_eq!(
            registry.list(),
            vec![ActionType::FreezeCard, ActionType::OpenDispute]
        );
        assert!(registry.get(ActionType::FreezeCard).is_some());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ActionRegistry::new();
        assert!(registry.get(ActionType::OpenDispute).is_none());
    }

    #[test]
    fn test_policy_labels() {
        assert_eq!(ActionError::InvalidOtp.policy_label(), Some("invalid_otp"));
        assert_eq!(
            ActionError::StepUpRequired(ActionType::FreezeCard).policy_label(),
            Some("otp_required")
        );
        assert_eq!(
            ActionError::ServiceError("down".into()).policy_label(),
            None
        );
    }
}
