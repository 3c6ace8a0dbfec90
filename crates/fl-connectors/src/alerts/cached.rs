//! Cached alert queue.
//!
//! Alert listings are read far more often than they change. The cache is an
//! explicit dependency of whoever lists alerts, configured by a
//! [`QueryCachePolicy`], rather than process-wide state.

use crate::traits::{AlertSource, Connector, ConnectorHealth, ConnectorResult};
use async_trait::async_trait;
use fl_core::{AlertStatus, AlertSummary};
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Staleness and retry parameters for cached queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCachePolicy {
    /// How long a listing is served from cache.
    #[serde(with = "duration_ms", rename = "stale_after_ms")]
    pub stale_after: Duration,
    /// Additional attempts after a failed fetch.
    pub retries: u32,
    #[serde(with = "duration_ms", rename = "retry_delay_ms")]
    pub retry_delay: Duration,
    /// Maximum number of cached listings.
    pub capacity: u64,
}

impl Default for QueryCachePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_millis(500),
            capacity: 16,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Wraps an [`AlertSource`] with a TTL cache and bounded retries.
pub struct CachedAlertSource<S> {
    inner: S,
    cache: MokaCache<String, Vec<AlertSummary>>,
    policy: QueryCachePolicy,
}

impl<S: AlertSource> CachedAlertSource<S> {
    pub fn new(inner: S, policy: QueryCachePolicy) -> Self {
        let cache = MokaCache::builder()
            .time_to_live(policy.stale_after)
            .max_capacity(policy.capacity)
            .build();
        Self {
            inner,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> &QueryCachePolicy {
        &self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every cached listing.
    pub async fn invalidate(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    async fn fetch_with_retry(
        &self,
        status: Option<AlertStatus>,
    ) -> ConnectorResult<Vec<AlertSummary>> {
        let mut attempt = 0;
        loop {
            match self.inner.list_alerts(status).await {
                Ok(alerts) => return Ok(alerts),
                Err(e) if attempt < self.policy.retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Alert listing failed, retrying");
                    sleep(self.policy.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cache_key(status: Option<AlertStatus>) -> String {
    status.map_or("all", |s| s.as_str()).to_string()
}

#[async_trait]
impl<S: AlertSource> Connector for CachedAlertSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn connector_type(&self) -> &str {
        self.inner.connector_type()
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        self.inner.health_check().await
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        self.inner.test_connection().await
    }
}

#[async_trait]
impl<S: AlertSource> AlertSource for CachedAlertSource<S> {
    async fn list_alerts(&self, status: Option<AlertStatus>) -> ConnectorResult<Vec<AlertSummary>> {
        let key = cache_key(status);
        if let Some(alerts) = self.cache.get(&key).await {
            debug!(key = %key, "Alert listing served from cache");
            return Ok(alerts);
        }

        let alerts = self.fetch_with_retry(status).await?;
        self.cache.insert(key, alerts.clone()).await;
        Ok(alerts)
    }
}
