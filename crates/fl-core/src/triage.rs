//! Triage data models.
//!
//! A [`TriageRequest`] is what an operator submits for a flagged transaction,
//! a [`TriageDecision`] is what the risk-decision service answers, and a
//! [`TriageOutcome`] is the annotated, possibly action-augmented result handed
//! back to the caller.

use crate::action::{ActionResult, ActionStatus, ActionType, IdempotencyKey};
use crate::workflow::TriageState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk classification returned by the decision service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskScore {
    /// Low risk, usually explanation only.
    Low,
    /// Medium risk, contact the customer.
    Medium,
    /// High risk, remedial action recommended.
    High,
}

impl RiskScore {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskScore::Low => "low",
            RiskScore::Medium => "medium",
            RiskScore::High => "high",
        }
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskScore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskScore::Low),
            "medium" => Ok(RiskScore::Medium),
            "high" => Ok(RiskScore::High),
            _ => Err(format!("Unknown risk score: {}", s)),
        }
    }
}

/// Action recommended by the decision service.
///
/// The vocabulary is open-ended: values the client does not know about are
/// kept verbatim in [`RecommendedAction::Other`] and treated like
/// `contact_customer` (no side effect, no annotation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecommendedAction {
    /// Reach out to the customer (the default branch).
    #[default]
    ContactCustomer,
    /// Freeze the customer's card. Requires step-up.
    FreezeCard,
    /// Open a chargeback dispute for the suspect transaction.
    OpenDispute,
    /// Explain a duplicate/preauthorization charge.
    ExplainDuplicate,
    /// Any action outside the known vocabulary.
    Other(String),
}

impl RecommendedAction {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            RecommendedAction::ContactCustomer => "contact_customer",
            RecommendedAction::FreezeCard => "freeze_card",
            RecommendedAction::OpenDispute => "open_dispute",
            RecommendedAction::ExplainDuplicate => "explain_duplicate",
            RecommendedAction::Other(name) => name,
        }
    }

    /// Returns the remedial action this recommendation implies, if any.
    pub fn side_effect(&self) -> Option<ActionType> {
        match self {
            RecommendedAction::FreezeCard => Some(ActionType::FreezeCard),
            RecommendedAction::OpenDispute => Some(ActionType::OpenDispute),
            _ => None,
        }
    }
}

impl From<String> for RecommendedAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "contact_customer" => RecommendedAction::ContactCustomer,
            "freeze_card" => RecommendedAction::FreezeCard,
            "open_dispute" => RecommendedAction::OpenDispute,
            "explain_duplicate" => RecommendedAction::ExplainDuplicate,
            _ => RecommendedAction::Other(value),
        }
    }
}

impl From<&str> for RecommendedAction {
    fn from(value: &str) -> Self {
        RecommendedAction::from(value.to_string())
    }
}

impl From<RecommendedAction> for String {
    fn from(value: RecommendedAction) -> Self {
        match value {
            RecommendedAction::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A triage request submitted for a flagged transaction.
///
/// `user_message` is free text typed by the operator or customer and must be
/// redacted before it leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageRequest {
    /// Customer the alert belongs to.
    pub customer_id: String,
    /// Transaction under suspicion (absent for knowledge-base questions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_txn_id: Option<String>,
    /// Alert classification, e.g. `card_lost` or `duplicate_charge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    /// Free-text message.
    #[serde(default)]
    pub user_message: String,
}

impl TriageRequest {
    /// Creates a request for a customer and suspect transaction.
    pub fn new(customer_id: impl Into<String>, suspect_txn_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            suspect_txn_id: Some(suspect_txn_id.into()),
            alert_type: None,
            user_message: String::new(),
        }
    }

    /// Sets the alert type.
    pub fn with_alert_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = Some(alert_type.into());
        self
    }

    /// Sets the free-text message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }
}

/// Decision returned by the risk-decision service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageDecision {
    /// Risk classification.
    pub risk_score: RiskScore,
    /// Recommended remedial action.
    pub recommended_action: RecommendedAction,
    /// Reasons behind the decision (compared as a set).
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Whether the recommended action needs step-up authentication.
    #[serde(default, rename = "requiresOTP")]
    pub requires_otp: bool,
    /// Whether a degraded fallback produced this decision.
    #[serde(default)]
    pub fallback_used: bool,
    /// Ordered audit-step names.
    #[serde(default)]
    pub trace_steps: Vec<String>,
    /// Whether sensitive data was detected in the request.
    #[serde(default)]
    pub pii_detected: bool,
    /// Dispute reason code (network chargeback code, e.g. `10.4`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    /// Card to act upon for `freeze_card`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    /// Disputed amount in minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_amount: Option<i64>,
    /// Merchant of the suspect transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
}

impl TriageDecision {
    /// Creates a decision with no reasons and no step-up.
    pub fn new(risk_score: RiskScore, recommended_action: impl Into<RecommendedAction>) -> Self {
        Self {
            risk_score,
            recommended_action: recommended_action.into(),
            reasons: Vec::new(),
            requires_otp: false,
            fallback_used: false,
            trace_steps: Vec::new(),
            pii_detected: false,
            reason_code: None,
            card_id: None,
            dispute_amount: None,
            merchant: None,
        }
    }

    /// The degraded decision substituted when the service is unavailable.
    ///
    /// Always medium risk with `contact_customer`, so an operator has
    /// actionable guidance.
    pub fn fallback() -> Self {
        Self {
            reasons: vec![
                "system_error".to_string(),
                "manual_review_required".to_string(),
            ],
            fallback_used: true,
            ..Self::new(RiskScore::Medium, RecommendedAction::ContactCustomer)
        }
    }

    /// Adds reasons.
    pub fn with_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons.extend(reasons.into_iter().map(Into::into));
        self
    }

    /// Marks the decision as requiring step-up authentication.
    pub fn requiring_otp(mut self) -> Self {
        self.requires_otp = true;
        self
    }

    /// Sets the card to act upon.
    pub fn with_card(mut self, card_id: impl Into<String>) -> Self {
        self.card_id = Some(card_id.into());
        self
    }

    /// Sets the dispute reason code.
    pub fn with_reason_code(mut self, code: impl Into<String>) -> Self {
        self.reason_code = Some(code.into());
        self
    }

    /// Returns true if the decision carries the given reason.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }
}

/// Knowledge-base citation attached by the policy annotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbCitation {
    /// Article title.
    pub title: String,
    /// Stable anchor of the article.
    pub anchor: String,
    /// Excerpt shown to the operator.
    pub content: String,
}

impl KbCitation {
    /// Creates a citation.
    pub fn new(
        title: impl Into<String>,
        anchor: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            anchor: anchor.into(),
            content: content.into(),
        }
    }
}

/// Final object returned to the caller of a triage submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageOutcome {
    /// The (possibly downgraded) decision.
    #[serde(flatten)]
    pub decision: TriageDecision,
    /// Where the triage workflow stopped.
    pub state: TriageState,
    /// Result of the remedial action, if one was executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResult>,
    /// Knowledge-base citation, if the annotator attached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<KbCitation>,
    /// Operator-facing message.
    pub message: String,
    /// Key of an action whose outcome is unknown; retries reuse it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_idempotency_key: Option<IdempotencyKey>,
}

impl TriageOutcome {
    /// Creates an outcome with no action result or citation.
    pub fn new(decision: TriageDecision, state: TriageState, message: impl Into<String>) -> Self {
        Self {
            decision,
            state,
            action_result: None,
            citation: None,
            message: message.into(),
            pending_idempotency_key: None,
        }
    }

    /// Returns true if the operator must supply an OTP and resubmit.
    pub fn is_awaiting_step_up(&self) -> bool {
        self.state == TriageState::AwaitingStepUp
    }

    /// Returns the policy rule that denied or held back the action, if any.
    pub fn policy_denial(&self) -> Option<&str> {
        match self.action_result.as_ref() {
            Some(result) if result.status == ActionStatus::InvalidOtp => Some("invalid_otp"),
            Some(result) if result.status == ActionStatus::Blocked => Some(
                result
                    .violations
                    .first()
                    .map(String::as_str)
                    .unwrap_or("action_blocked"),
            ),
            _ if self.state == TriageState::AwaitingStepUp => Some("otp_required"),
            _ => None,
        }
    }
}

/// Creates a log-safe version of an identifier.
///
/// Keeps the first and last two characters, e.g. `cust_017` becomes `cu***17`.
pub fn mask_identifier(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() < 4 {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_roundtrip() {
        assert_eq!("HIGH".parse::<RiskScore>().unwrap(), RiskScore::High);
        assert_eq!(RiskScore::Medium.to_string(), "medium");
        assert!("severe".parse::<RiskScore>().is_err());
    }

    #[test]
    fn test_recommended_action_open_vocabulary() {
        let action: RecommendedAction = serde_json::from_str("\"escalate_to_fraud_ops\"").unwrap();
        assert_eq!(
            action,
            RecommendedAction::Other("escalate_to_fraud_ops".to_string())
        );
        assert_eq!(action.side_effect(), None);
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            "\"escalate_to_fraud_ops\""
        );

        let freeze: RecommendedAction = serde_json::from_str("\"freeze_card\"").unwrap();
        assert_eq!(freeze.side_effect(), Some(ActionType::FreezeCard));
        assert_eq!(RecommendedAction::default(), RecommendedAction::ContactCustomer);
    }

    #[test]
    fn test_decision_wire_format() {
        let json = r#"{
            "riskScore": "high",
            "recommendedAction": "freeze_card",
            "reasons": ["geo_velocity_violation"],
            "requiresOTP": true,
            "traceSteps": ["getProfile", "riskSignals"]
        }"#;
        let decision: TriageDecision = serde_json::from_str(json).unwrap();
        assert_eq!(decision.risk_score, RiskScore::High);
        assert!(decision.requires_otp);
        assert!(!decision.fallback_used);
        assert!(decision.has_reason("geo_velocity_violation"));
        assert_eq!(decision.trace_steps.len(), 2);

        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["requiresOTP"], serde_json::json!(true));
        assert!(value.get("reasonCode").is_none());
    }

    #[test]
    fn test_fallback_decision() {
        let decision = TriageDecision::fallback();
        assert_eq!(decision.risk_score, RiskScore::Medium);
        assert_eq!(
            decision.recommended_action,
            RecommendedAction::ContactCustomer
        );
        assert!(decision.fallback_used);
        assert!(decision.has_reason("manual_review_required"));
    }

    #[test]
    fn test_outcome_flattens_decision() {
        let outcome = TriageOutcome::new(
            TriageDecision::new(RiskScore::Low, "explain_duplicate"),
            TriageState::Done,
            "Explained",
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["riskScore"], "low");
        assert_eq!(value["state"], "DONE");
        assert_eq!(value["message"], "Explained");

        let back: TriageOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_policy_denial_for_awaiting_step_up() {
        let outcome = TriageOutcome::new(
            TriageDecision::new(RiskScore::High, "freeze_card").requiring_otp(),
            TriageState::AwaitingStepUp,
            "OTP required",
        );
        assert!(outcome.is_awaiting_step_up());
        assert_eq!(outcome.policy_denial(), Some("otp_required"));

        let done = TriageOutcome::new(
            TriageDecision::new(RiskScore::Low, "explain_duplicate"),
            TriageState::Done,
            "",
        );
        assert_eq!(done.policy_denial(), None);
    }

    #[test]
    fn test_mask_identifier() {
        assert_eq!(mask_identifier("cust_017"), "cu***17");
        assert_eq!(mask_identifier("abc"), "****");
        assert_eq!(mask_identifier(""), "****");
    }
}
