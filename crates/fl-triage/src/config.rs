//! Triage client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`TriageClient`](crate::TriageClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageClientConfig {
    /// Upper bound on one decision-service call, in seconds.
    pub timeout_secs: u64,
    /// Rate-limit window applied when the service gives no retry-after.
    pub default_retry_after_ms: u64,
    /// Answer service failures with a degraded outcome instead of an error.
    pub fallback_on_error: bool,
    /// How long the key of an action with an unknown outcome is kept for
    /// retry, in milliseconds.
    pub pending_ttl_ms: u64,
    /// Most unresolved actions tracked at once.
    pub max_pending_actions: u64,
}

impl Default for TriageClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            default_retry_after_ms: 2000,
            fallback_on_error: true,
            pending_ttl_ms: 300_000,
            max_pending_actions: 1024,
        }
    }
}

impl TriageClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TriageClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.default_retry_after(), Duration::from_millis(2000));
        assert!(config.fallback_on_error);
        assert_eq!(config.pending_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_pending_actions, 1024);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: TriageClientConfig = serde_yaml::from_str("timeout_secs: 3").unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.default_retry_after_ms, 2000);
        assert!(config.fallback_on_error);
    }
}
