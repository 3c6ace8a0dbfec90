//! # fl-core
//!
//! Core data models for Fraudline.
//!
//! This crate provides the triage request/decision/outcome types exchanged
//! with the risk-decision service, the remedial action model used by the
//! action executor, alert summaries, and the triage workflow state machine.

pub mod action;
pub mod alert;
pub mod triage;
pub mod workflow;

pub use action::{
    is_valid_reason_code, ActionRequest, ActionResult, ActionStatus, ActionType, IdempotencyKey,
    DEFAULT_REASON_CODE, VALID_REASON_CODES,
};
pub use alert::{AlertStatus, AlertSummary};
pub use triage::{
    mask_identifier, KbCitation, RecommendedAction, RiskScore, TriageDecision, TriageOutcome,
    TriageRequest,
};
pub use workflow::{StateTransition, TriageState, TriageWorkflow, WorkflowError};
