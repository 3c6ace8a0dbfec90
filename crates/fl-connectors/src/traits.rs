//! Connector trait definitions for Fraudline.
//!
//! These traits are the boundary contracts with the external collaborators:
//! the risk-decision service, the remedial action service and the alert
//! queue. Everything behind them is transport-specific.

use crate::secure_string::SecureString;
use async_trait::async_trait;
use fl_core::{ActionResult, AlertStatus, AlertSummary, IdempotencyKey, TriageDecision, TriageRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The key was already used. `original` carries the first result when the
    /// service includes it.
    #[error("Idempotency key already used: {key}")]
    IdempotencyConflict {
        key: IdempotencyKey,
        original: Option<Box<ActionResult>>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed(_)
                | ConnectorError::Timeout(_)
                | ConnectorError::ServiceError(_)
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    Healthy,
    Degraded(String),
    Unhealthy(String),
    Unknown,
}

/// Configuration for an HTTP connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name, used in logs.
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

impl ConnectorConfig {
    /// Creates a configuration with defaults and no authentication.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth: AuthConfig::None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            headers: HashMap::new(),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    /// API key sent in a header.
    ApiKey {
        key: SecureString,
        #[serde(default = "default_api_key_header")]
        header_name: String,
    },
    BearerToken { token: SecureString },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

impl AuthConfig {
    /// API key auth with the default `X-API-Key` header.
    pub fn api_key(key: impl Into<SecureString>) -> Self {
        AuthConfig::ApiKey {
            key: key.into(),
            header_name: default_api_key_header(),
        }
    }
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the connector type (`decision`, `action` or `alerts`).
    fn connector_type(&self) -> &str;

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth>;

    async fn test_connection(&self) -> ConnectorResult<bool>;
}

/// The external risk-decision service.
#[async_trait]
pub trait DecisionService: Connector {
    /// Submits an (already redacted) triage request.
    ///
    /// A rate-limit answer is reported as [`ConnectorError::RateLimited`].
    async fn submit_triage(&self, request: &TriageRequest) -> ConnectorResult<TriageDecision>;
}

/// Dispute details sent to the action service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub txn_id: String,
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
}

/// The external remedial action service.
///
/// The service is contracted to return the original result for a repeated
/// idempotency key rather than performing the action again.
#[async_trait]
pub trait ActionService: Connector {
    /// Freezes a card. Answers `FROZEN` or `INVALID_OTP`.
    async fn freeze_card(
        &self,
        card_id: &str,
        otp: &str,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult>;

    /// Opens a dispute. Answers `CASE_OPENED` with a case id.
    async fn open_dispute(
        &self,
        dispute: &DisputeRequest,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult>;

    /// Looks up the result recorded for a key.
    async fn fetch_result(&self, key: &IdempotencyKey) -> ConnectorResult<ActionResult>;
}

/// The queue of fraud alerts awaiting triage.
#[async_trait]
pub trait AlertSource: Connector {
    /// Lists alerts, newest first, optionally filtered by status.
    async fn list_alerts(&self, status: Option<AlertStatus>) -> ConnectorResult<Vec<AlertSummary>>;
}
