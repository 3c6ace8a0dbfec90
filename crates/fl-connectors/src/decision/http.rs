//! Decision service over JSON/HTTP.

use crate::http::{HttpClient, RateLimitConfig};
use crate::traits::{
    Connector, ConnectorConfig, ConnectorHealth, ConnectorResult, DecisionService,
};
use async_trait::async_trait;
use fl_core::{mask_identifier, TriageDecision, TriageRequest};
use serde::Deserialize;
use tracing::{debug, instrument};

const TRIAGE_PATH: &str = "/api/triage";
const HEALTH_PATH: &str = "/api/health";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

/// Client for the risk-decision service's triage endpoint.
pub struct HttpDecisionService {
    name: String,
    client: HttpClient,
}

impl HttpDecisionService {
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_rate_limit(config, None)
    }

    pub fn with_rate_limit(
        config: ConnectorConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> ConnectorResult<Self> {
        Ok(Self {
            name: config.name.clone(),
            client: HttpClient::with_rate_limit(config, rate_limit)?,
        })
    }
}

#[async_trait]
impl Connector for HttpDecisionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "decision"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.client.get_json::<HealthResponse>(HEALTH_PATH, &[]).await {
            Ok(h) if h.status.eq_ignore_ascii_case("up") || h.status.is_empty() => {
                Ok(ConnectorHealth::Healthy)
            }
            Ok(h) => Ok(ConnectorHealth::Degraded(h.status)),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(matches!(self.health_check().await?, ConnectorHealth::Healthy))
    }
}

#[async_trait]
impl DecisionService for HttpDecisionService {
    #[instrument(skip(self, request), fields(customer = %mask_identifier(&request.customer_id)))]
    async fn submit_triage(&self, request: &TriageRequest) -> ConnectorResult<TriageDecision> {
        let decision: TriageDecision = self.client.post_json(TRIAGE_PATH, request).await?;
        debug!(
            risk = %decision.risk_score,
            action = %decision.recommended_action,
            "Decision received"
        );
        Ok(decision)
    }
}
