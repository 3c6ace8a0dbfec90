//! Evaluation harness.
//!
//! A run walks `Idle -> LoadingCases -> Running(1..n) -> Probing ->
//! Aggregating -> Done`. Cases run strictly in order with a pacing delay
//! between them; the probes run once, after the last case. A fixture-load
//! failure ends the run in `Error`. Any other failure is recorded on its
//! case and the run continues.

use crate::fixtures::{EvalCase, FixtureError, FixtureSource};
use crate::matching::{mismatches, ActualDecision};
use crate::metrics::AggregateMetrics;
use crate::probes::{burst_probe, leak_probe, ProbeResult};
use crate::report::EvalReport;
use fl_triage::TriageClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Harness lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HarnessState {
    Idle,
    LoadingCases,
    /// Running case `index` (1-based) of `total`.
    Running { index: usize, total: usize },
    Probing,
    Aggregating,
    Done,
    Error,
}

impl HarnessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HarnessState::Done | HarnessState::Error)
    }

    pub fn can_transition(from: HarnessState, to: HarnessState) -> bool {
        use HarnessState::*;
        match (from, to) {
            (Idle, LoadingCases) => true,
            (LoadingCases, Running { index: 1, total }) => total > 0,
            (Running { index, total }, Running { index: next, total: t }) => {
                t == total && next == index + 1 && next <= total
            }
            (Running { index, total }, Probing | Aggregating) => index == total,
            (Probing, Aggregating) => true,
            (Aggregating, Done) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessState::Idle => write!(f, "idle"),
            HarnessState::LoadingCases => write!(f, "loading_cases"),
            HarnessState::Running { index, total } => write!(f, "running({}/{})", index, total),
            HarnessState::Probing => write!(f, "probing"),
            HarnessState::Aggregating => write!(f, "aggregating"),
            HarnessState::Done => write!(f, "done"),
            HarnessState::Error => write!(f, "error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Fixtures(#[from] FixtureError),

    #[error("Invalid harness transition from {from} to {to}")]
    InvalidTransition { from: HarnessState, to: HarnessState },
}

/// Harness pacing and probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Pause between golden cases.
    pub case_delay_ms: u64,
    /// Pause before each probe.
    pub probe_delay_ms: u64,
    /// Concurrent submissions in the burst probe.
    pub burst_size: usize,
    /// Synthetic card number embedded by the leak probe.
    pub leak_pan: String,
    pub run_probes: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            case_delay_ms: 2000,
            probe_delay_ms: 3000,
            burst_size: 10,
            leak_pan: "4111111111111111".to_string(),
            run_probes: true,
        }
    }
}

/// Outcome of one golden case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub id: String,
    pub description: String,
    pub passed: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<ActualDecision>,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_denial: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replays golden cases and probes against a [`TriageClient`].
pub struct EvaluationHarness {
    client: Arc<TriageClient>,
    fixtures: Box<dyn FixtureSource>,
    config: HarnessConfig,
    state: HarnessState,
    history: Vec<HarnessState>,
}

impl EvaluationHarness {
    pub fn new(client: Arc<TriageClient>, fixtures: impl FixtureSource + 'static) -> Self {
        Self {
            client,
            fixtures: Box::new(fixtures),
            config: HarnessConfig::default(),
            state: HarnessState::Idle,
            history: vec![HarnessState::Idle],
        }
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[HarnessState] {
        &self.history
    }

    fn transition(&mut self, to: HarnessState) -> Result<(), HarnessError> {
        let from = self.state;
        if !HarnessState::can_transition(from, to) {
            return Err(HarnessError::InvalidTransition { from, to });
        }
        debug!(%from, %to, "Harness state transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Runs the whole evaluation.
    ///
    /// Only a fixture-load failure is returned as an error.
    #[instrument(skip_all)]
    pub async fn run(&mut self) -> Result<EvalReport, HarnessError> {
        self.transition(HarnessState::LoadingCases)?;
        let loaded = self.fixtures.load_cases().await.and_then(|cases| {
            if cases.is_empty() {
                Err(FixtureError::Empty)
            } else {
                Ok(cases)
            }
        });
        let cases = match loaded {
            Ok(cases) => cases,
            Err(e) => {
                error!(error = %e, "Failed to load evaluation cases");
                self.transition(HarnessState::Error)?;
                return Err(e.into());
            }
        };

        let total = cases.len();
        info!(total, "Running evaluation cases");
        let mut results = Vec::with_capacity(total);
        for (i, case) in cases.iter().enumerate() {
            self.transition(HarnessState::Running {
                index: i + 1,
                total,
            })?;
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.case_delay_ms)).await;
            }
            results.push(self.run_case(case).await);
        }

        let probes = if self.config.run_probes {
            self.transition(HarnessState::Probing)?;
            self.run_probes(&cases[0]).await
        } else {
            Vec::new()
        };

        self.transition(HarnessState::Aggregating)?;
        let metrics = AggregateMetrics::from_results(&results);
        let report = EvalReport::new(metrics, results, probes);
        self.transition(HarnessState::Done)?;

        info!(
            passed = report.metrics.passed_tests,
            total = report.metrics.total_tests,
            "Evaluation finished"
        );
        Ok(report)
    }

    /// Submits one case and compares the decision.
    #[instrument(skip_all, fields(case = %case.id))]
    pub async fn run_case(&self, case: &EvalCase) -> EvalResult {
        let started = Instant::now();
        let submitted = self.client.submit(&case.input, None).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match submitted {
            Ok(outcome) => {
                let actual = ActualDecision::from(&outcome.decision);
                let found = mismatches(&case.expected, &actual);
                let passed = found.is_empty();
                if passed {
                    debug!(latency_ms, "Case passed");
                } else {
                    info!(latency_ms, mismatches = ?found, "Case failed");
                }
                EvalResult {
                    id: case.id.clone(),
                    description: case.description.clone(),
                    passed,
                    latency_ms,
                    fallback_used: actual.fallback_used,
                    actual: Some(actual),
                    policy_denial: outcome.policy_denial().map(str::to_string),
                    mismatches: found,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, latency_ms, "Case errored");
                EvalResult {
                    id: case.id.clone(),
                    description: case.description.clone(),
                    passed: false,
                    latency_ms,
                    actual: None,
                    fallback_used: false,
                    policy_denial: None,
                    mismatches: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_probes(&self, burst_case: &EvalCase) -> Vec<ProbeResult> {
        let probe_delay = Duration::from_millis(self.config.probe_delay_ms);

        tokio::time::sleep(probe_delay).await;
        let burst = burst_probe(
            Arc::clone(&self.client),
            burst_case.input.clone(),
            self.config.burst_size,
        )
        .await;

        // The burst usually leaves the client rate limited.
        let wait = probe_delay + self.client.rate_limited_for().unwrap_or_default();
        tokio::time::sleep(wait).await;
        let leak = leak_probe(&self.client, &self.config.leak_pan).await;

        vec![burst, leak]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_must_advance_by_one() {
        let first = HarnessState::Running { index: 1, total: 3 };
        let second = HarnessState::Running { index: 2, total: 3 };
        let third = HarnessState::Running { index: 3, total: 3 };

        assert!(HarnessState::can_transition(HarnessState::LoadingCases, first));
        assert!(HarnessState::can_transition(first, second));
        assert!(!HarnessState::can_transition(first, third));
        assert!(!HarnessState::can_transition(second, HarnessState::Probing));
        assert!(HarnessState::can_transition(third, HarnessState::Probing));
        assert!(HarnessState::can_transition(third, HarnessState::Aggregating));
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!HarnessState::can_transition(HarnessState::Done, HarnessState::Error));
        assert!(!HarnessState::can_transition(HarnessState::Error, HarnessState::Idle));
        assert!(HarnessState::can_transition(HarnessState::LoadingCases, HarnessState::Error));
        assert!(!HarnessState::can_transition(
            HarnessState::Idle,
            HarnessState::Running { index: 1, total: 1 }
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.case_delay_ms, 2000);
        assert_eq!(config.probe_delay_ms, 3000);
        assert_eq!(config.burst_size, 10);
        assert_eq!(config.leak_pan, "4111111111111111");
        assert!(config.run_probes);
    }
}
