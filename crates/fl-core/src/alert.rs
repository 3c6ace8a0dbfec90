//! Fraud alert summaries as listed by an alert source.

use crate::triage::{RiskScore, TriageRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a fraud alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    InReview,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::InReview => "in_review",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// A flagged transaction awaiting triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub id: String,
    pub customer_id: String,
    pub suspect_txn_id: String,
    pub alert_type: String,
    pub status: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,
    pub created_at: DateTime<Utc>,
}

impl AlertSummary {
    /// Builds the triage request an operator would submit for this alert.
    pub fn to_triage_request(&self, user_message: impl Into<String>) -> TriageRequest {
        TriageRequest::new(&self.customer_id, &self.suspect_txn_id)
            .with_alert_type(&self.alert_type)
            .with_message(user_message)
    }
}
