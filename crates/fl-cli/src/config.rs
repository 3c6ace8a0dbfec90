//! Configuration loading for the Fraudline CLI.

use anyhow::{Context, Result};
use fl_connectors::{AuthConfig, ConnectorConfig, QueryCachePolicy};
use fl_evals::HarnessConfig;
use fl_observability::LoggingSettings;
use fl_triage::TriageClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Decision, action and alert service endpoint.
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub triage: TriageClientConfig,

    #[serde(default)]
    pub evals: EvalsConfig,

    /// Alert queue caching.
    #[serde(default)]
    pub alerts: QueryCachePolicy,

    /// Optional policy file (redaction and annotation rules).
    #[serde(default)]
    pub policy_file: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();
        if !config.service.api_key.is_empty() {
            config.service.api_key = REDACTED.to_string();
        }
        config
    }
}

/// Remote service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as `X-API-Key`. Empty for none.
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Retries for transient failures.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout: default_timeout(),
            retries: default_retries(),
        }
    }
}

impl ServiceConfig {
    /// Connector settings for one of the remote services.
    pub fn connector(&self, name: &str) -> ConnectorConfig {
        let mut config = ConnectorConfig::new(name, &self.base_url);
        config.timeout_secs = self.timeout;
        config.max_retries = self.retries;
        if !self.api_key.is_empty() {
            config = config.with_auth(AuthConfig::api_key(self.api_key.as_str()));
        }
        config
    }
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalsConfig {
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,

    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    #[serde(default)]
    pub harness: HarnessConfig,
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("fixtures/evals")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("eval-report.json")
}

impl Default for EvalsConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
            report_path: default_report_path(),
            harness: HarnessConfig::default(),
        }
    }
}
