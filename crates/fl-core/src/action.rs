//! Remedial action models.
//!
//! Every side-effecting call carries an [`IdempotencyKey`]. Retries of the
//! same logical attempt reuse the key; a new logical attempt (for example a
//! resubmission with a corrected OTP) generates a fresh one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reason code used when a dispute is opened without one (unauthorized transaction).
pub const DEFAULT_REASON_CODE: &str = "10.4";

/// Fraud chargeback reason codes a dispute may be opened with.
pub const VALID_REASON_CODES: &[&str] = &["10.4", "10.5", "10.6", "10.7", "10.8"];

/// Returns true if `code` is an accepted dispute reason code.
pub fn is_valid_reason_code(code: &str) -> bool {
    VALID_REASON_CODES.contains(&code)
}

/// Side-effecting actions the executor can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Freeze a card. Gated by step-up authentication.
    FreezeCard,
    /// Open a chargeback dispute for a transaction.
    OpenDispute,
}

impl ActionType {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::FreezeCard => "freeze_card",
            ActionType::OpenDispute => "open_dispute",
        }
    }

    /// Returns true if the action needs a one-time passcode.
    pub fn requires_step_up(&self) -> bool {
        matches!(self, ActionType::FreezeCard)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque key that makes an action safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Generates a key for a new logical attempt.
    ///
    /// The key embeds the action, the subject and the request time; the
    /// random suffix keeps two attempts within the same millisecond distinct.
    pub fn generate(action_type: ActionType, subject_id: &str, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}:{}:{}:{}",
            action_type.as_str(),
            subject_id,
            at.timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    /// Wraps a key received from elsewhere (e.g. a service response).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to perform a remedial action.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Which action to perform.
    pub action_type: ActionType,
    /// Card id for `freeze_card`, transaction id for `open_dispute`.
    pub subject_id: String,
    /// One-time passcode for step-up authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    /// Key identifying this logical attempt.
    pub idempotency_key: IdempotencyKey,
    /// Dispute reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    /// Disputed amount in minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Merchant of the disputed transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    /// When the attempt was created.
    pub requested_at: DateTime<Utc>,
}

impl ActionRequest {
    /// Creates a request for a fresh logical attempt.
    pub fn new(action_type: ActionType, subject_id: impl Into<String>) -> Self {
        let subject_id = subject_id.into();
        let requested_at = Utc::now();
        Self {
            idempotency_key: IdempotencyKey::generate(action_type, &subject_id, requested_at),
            action_type,
            subject_id,
            otp: None,
            reason_code: None,
            amount: None,
            merchant: None,
            requested_at,
        }
    }

    /// Creates a freeze request for a card.
    pub fn freeze_card(card_id: impl Into<String>, otp: impl Into<String>) -> Self {
        Self::new(ActionType::FreezeCard, card_id).with_otp(otp)
    }

    /// Creates a dispute request for a transaction.
    pub fn open_dispute(txn_id: impl Into<String>) -> Self {
        Self::new(ActionType::OpenDispute, txn_id)
    }

    /// Sets the one-time passcode.
    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    /// Sets the dispute reason code.
    pub fn with_reason_code(mut self, code: impl Into<String>) -> Self {
        self.reason_code = Some(code.into());
        self
    }

    /// Sets the disputed amount.
    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the merchant.
    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    /// Replaces the idempotency key, used when retrying an attempt whose
    /// outcome is unknown.
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = key;
        self
    }
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("action_type", &self.action_type)
            .field("subject_id", &self.subject_id)
            .field("otp", &self.otp.as_ref().map(|_| "[REDACTED]"))
            .field("idempotency_key", &self.idempotency_key)
            .field("reason_code", &self.reason_code)
            .field("amount", &self.amount)
            .field("merchant", &self.merchant)
            .field("requested_at", &self.requested_at)
            .finish()
    }
}

/// Status reported by the action service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    /// The card is frozen.
    Frozen,
    /// The supplied OTP was rejected; nothing happened.
    InvalidOtp,
    /// A dispute case was opened.
    CaseOpened,
    /// The service is waiting for an OTP.
    PendingOtp,
    /// The action was refused by policy.
    Blocked,
    /// The action failed.
    Failed,
    /// The action was accepted and is still being processed.
    InProgress,
}

impl ActionStatus {
    /// Returns true if the side effect happened.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Frozen | ActionStatus::CaseOpened)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Frozen => "FROZEN",
            ActionStatus::InvalidOtp => "INVALID_OTP",
            ActionStatus::CaseOpened => "CASE_OPENED",
            ActionStatus::PendingOtp => "PENDING_OTP",
            ActionStatus::Blocked => "BLOCKED",
            ActionStatus::Failed => "FAILED",
            ActionStatus::InProgress => "IN_PROGRESS",
        };
        f.write_str(s)
    }
}

/// Result of a remedial action.
///
/// Repeating a request with the same idempotency key yields an identical
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Which action ran.
    pub action_type: ActionType,
    /// Final status.
    pub status: ActionStatus,
    /// Dispute case id for `open_dispute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    /// Key of the attempt this result belongs to.
    pub idempotency_key: IdempotencyKey,
    /// Policy rules that blocked the action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl ActionResult {
    /// Creates a result.
    pub fn new(
        action_type: ActionType,
        status: ActionStatus,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            action_type,
            status,
            case_id: None,
            idempotency_key,
            violations: Vec::new(),
        }
    }

    /// Creates a result for an attempt.
    pub fn for_request(request: &ActionRequest, status: ActionStatus) -> Self {
        Self::new(request.action_type, status, request.idempotency_key.clone())
    }

    /// Creates a blocked result naming the violated policy rule.
    pub fn blocked(request: &ActionRequest, rule: impl Into<String>) -> Self {
        let mut result = Self::for_request(request, ActionStatus::Blocked);
        result.violations.push(rule.into());
        result
    }

    /// Sets the dispute case id.
    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }
}
