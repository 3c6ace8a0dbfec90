//! Mock alert source for testing.

use crate::traits::{AlertSource, Connector, ConnectorError, ConnectorHealth, ConnectorResult};
use async_trait::async_trait;
use fl_core::{AlertStatus, AlertSummary};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory alert queue.
pub struct MockAlertSource {
    name: String,
    alerts: Arc<RwLock<Vec<AlertSummary>>>,
    failures: Arc<RwLock<VecDeque<ConnectorError>>>,
    calls: AtomicU64,
}

impl MockAlertSource {
    pub fn new(name: &str) -> Self {
        Self::with_alerts(name, Vec::new())
    }

    pub fn with_alerts(name: &str, alerts: Vec<AlertSummary>) -> Self {
        Self {
            name: name.to_string(),
            alerts: Arc::new(RwLock::new(alerts)),
            failures: Arc::new(RwLock::new(VecDeque::new())),
            calls: AtomicU64::new(0),
        }
    }

    pub async fn add_alert(&self, alert: AlertSummary) {
        self.alerts.write().await.push(alert);
    }

    /// Makes the next call fail with `error`.
    pub async fn fail_next(&self, error: ConnectorError) {
        self.failures.write().await.push_back(error);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockAlertSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "alerts"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl AlertSource for MockAlertSource {
    async fn list_alerts(&self, status: Option<AlertStatus>) -> ConnectorResult<Vec<AlertSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.write().await.pop_front() {
            return Err(error);
        }

        let mut alerts: Vec<AlertSummary> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}
