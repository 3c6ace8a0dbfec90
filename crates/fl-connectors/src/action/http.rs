//! Action service over JSON/HTTP.
//!
//! Every action request carries its idempotency key in the
//! `Idempotency-Key` header. A 409 answer means the key was already used;
//! its body, when present, is the original result.

use crate::http::{HttpClient, IDEMPOTENCY_KEY_HEADER};
use crate::traits::{
    ActionService, Connector, ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult,
    DisputeRequest,
};
use async_trait::async_trait;
use fl_core::{mask_identifier, ActionResult, ActionStatus, ActionType, IdempotencyKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const FREEZE_CARD_PATH: &str = "/api/actions/freeze-card";
const OPEN_DISPUTE_PATH: &str = "/api/actions/open-dispute";
const RESULTS_PATH: &str = "/api/actions/results";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FreezeCardBody<'a> {
    card_id: &'a str,
    otp: &'a str,
}

/// Answer of an action endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionResponse {
    status: ActionStatus,
    #[serde(default)]
    case_id: Option<String>,
}

impl ActionResponse {
    fn into_result(self, action_type: ActionType, key: &IdempotencyKey) -> ActionResult {
        let mut result = ActionResult::new(action_type, self.status, key.clone());
        result.case_id = self.case_id;
        result
    }
}

/// Client for the remedial action service.
pub struct HttpActionService {
    name: String,
    client: HttpClient,
}

impl HttpActionService {
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Ok(Self {
            name: config.name.clone(),
            client: HttpClient::new(config)?,
        })
    }

    async fn post_action<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        action_type: ActionType,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult> {
        let headers = [(IDEMPOTENCY_KEY_HEADER, key.as_str())];
        match self
            .client
            .post_json_with_headers::<T, ActionResponse>(path, body, &headers)
            .await
        {
            Ok(response) => Ok(response.into_result(action_type, key)),
            Err(ConnectorError::Conflict(body)) => Err(ConnectorError::IdempotencyConflict {
                key: key.clone(),
                original: serde_json::from_str::<ActionResult>(&body).ok().map(Box::new),
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Connector for HttpActionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "action"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self
            .client
            .get_json::<serde_json::Value>("/api/health", &[])
            .await
        {
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(matches!(self.health_check().await?, ConnectorHealth::Healthy))
    }
}

#[async_trait]
impl ActionService for HttpActionService {
    #[instrument(skip_all, fields(card = %mask_identifier(card_id), key = %key))]
    async fn freeze_card(
        &self,
        card_id: &str,
        otp: &str,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult> {
        let body = FreezeCardBody { card_id, otp };
        let result = self
            .post_action(FREEZE_CARD_PATH, &body, ActionType::FreezeCard, key)
            .await?;
        debug!(status = %result.status, "Freeze answered");
        Ok(result)
    }

    #[instrument(skip_all, fields(txn = %dispute.txn_id, key = %key))]
    async fn open_dispute(
        &self,
        dispute: &DisputeRequest,
        key: &IdempotencyKey,
    ) -> ConnectorResult<ActionResult> {
        let result = self
            .post_action(OPEN_DISPUTE_PATH, dispute, ActionType::OpenDispute, key)
            .await?;
        if result.status.is_success() && result.case_id.is_none() {
            return Err(ConnectorError::InvalidResponse(
                "Dispute answer carries no case id".to_string(),
            ));
        }
        Ok(result)
    }

    async fn fetch_result(&self, key: &IdempotencyKey) -> ConnectorResult<ActionResult> {
        let path = format!("{}/{}", RESULTS_PATH, key.as_str());
        self.client.get_json(&path, &[]).await
    }
}
