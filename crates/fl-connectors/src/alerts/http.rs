//! Alert queue over JSON/HTTP.

use crate::http::HttpClient;
use crate::traits::{AlertSource, Connector, ConnectorConfig, ConnectorHealth, ConnectorResult};
use async_trait::async_trait;
use fl_core::{AlertStatus, AlertSummary};
use tracing::{debug, instrument};

const ALERTS_PATH: &str = "/api/alerts";

/// Read-only client for the alert queue.
pub struct HttpAlertSource {
    name: String,
    client: HttpClient,
}

impl HttpAlertSource {
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Ok(Self {
            name: config.name.clone(),
            client: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl Connector for HttpAlertSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "alerts"
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
impl AlertSource for HttpAlertSource {
    #[instrument(skip(self))]
    async fn list_alerts(&self, status: Option<AlertStatus>) -> ConnectorResult<Vec<AlertSummary>> {
        let query: Vec<(&str, &str)> = status
            .iter()
            .map(|s| ("status", s.as_str()))
            .collect();
        let alerts: Vec<AlertSummary> = self.client.get_json(ALERTS_PATH, &query).await?;
        debug!(count = alerts.len(), "Alerts listed");
        Ok(alerts)
    }
}
