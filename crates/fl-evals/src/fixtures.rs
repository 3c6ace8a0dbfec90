//! Golden evaluation cases.
//!
//! A case file is JSON:
//!
//! ```json
//! {
//!   "description": "Lost card triggers a freeze",
//!   "input": { "customerId": "cust_017", "suspectTxnId": "txn_01001", "userMessage": "I lost my card" },
//!   "expected": { "riskScore": "high", "recommendedAction": "freeze_card", "requiresOTP": true }
//! }
//! ```
//!
//! The case id defaults to the file stem.

use async_trait::async_trait;
use fl_core::{RecommendedAction, RiskScore, TriageRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors loading a fixture set. Fatal to a harness run.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read fixtures from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fixture {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Duplicate case id: {0}")]
    DuplicateId(String),

    #[error("No evaluation cases found")]
    Empty,
}

/// Expected fields of a decision. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<RecommendedAction>,
    #[serde(
        default,
        rename = "requiresOTP",
        skip_serializing_if = "Option::is_none"
    )]
    pub requires_otp: Option<bool>,
    /// Reasons that must all be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
}

/// One golden scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalCase {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub input: TriageRequest,
    #[serde(default)]
    pub expected: ExpectedDecision,
}

/// Where evaluation cases come from.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Loads every case, sorted by id.
    async fn load_cases(&self) -> Result<Vec<EvalCase>, FixtureError>;
}

/// Sorts by id and rejects empty sets and duplicate ids.
fn finalize(mut cases: Vec<EvalCase>) -> Result<Vec<EvalCase>, FixtureError> {
    if cases.is_empty() {
        return Err(FixtureError::Empty);
    }
    cases.sort_by(|a, b| a.id.cmp(&b.id));
    let mut seen = HashSet::new();
    for case in &cases {
        if !seen.insert(case.id.as_str()) {
            return Err(FixtureError::DuplicateId(case.id.clone()));
        }
    }
    Ok(cases)
}

/// Cases held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticFixtures {
    cases: Vec<EvalCase>,
}

impl StaticFixtures {
    pub fn new(cases: Vec<EvalCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl FixtureSource for StaticFixtures {
    async fn load_cases(&self) -> Result<Vec<EvalCase>, FixtureError> {
        finalize(self.cases.clone())
    }
}

/// Cases read from the `*.json` files of a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFixtures {
    dir: PathBuf,
}

impl DirectoryFixtures {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FixtureSource for DirectoryFixtures {
    async fn load_cases(&self) -> Result<Vec<EvalCase>, FixtureError> {
        let io_error = |source| FixtureError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut cases = Vec::with_capacity(files.len());
        for path in files {
            let file = path.display().to_string();
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| FixtureError::Io {
                    path: path.clone(),
                    source,
                })?;
            let mut case: EvalCase =
                serde_json::from_str(&content).map_err(|e| FixtureError::Parse {
                    file: file.clone(),
                    message: e.to_string(),
                })?;
            if case.id.is_empty() {
                case.id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            debug!(id = %case.id, file = %file, "Loaded case");
            cases.push(case);
        }

        let cases = finalize(cases)?;
        info!(count = cases.len(), dir = %self.dir.display(), "Loaded evaluation cases");
        Ok(cases)
    }
}
