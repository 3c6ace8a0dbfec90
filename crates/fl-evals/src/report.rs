//! Evaluation report.

use crate::harness::EvalResult;
use crate::metrics::AggregateMetrics;
use crate::probes::ProbeResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Headline numbers, as percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalReport {
    pub timestamp: DateTime<Utc>,
    pub metrics: AggregateMetrics,
    pub results: Vec<EvalResult>,
    pub probes: Vec<ProbeResult>,
    pub summary: ReportSummary,
}

impl EvalReport {
    pub fn new(metrics: AggregateMetrics, results: Vec<EvalResult>, probes: Vec<ProbeResult>) -> Self {
        let summary = ReportSummary {
            success_rate: metrics.success_rate(),
            fallback_rate: metrics.fallback_rate * 100.0,
            avg_latency_ms: metrics.avg_latency_ms,
        };
        Self {
            timestamp: Utc::now(),
            metrics,
            results,
            probes,
            summary,
        }
    }

    /// True when every case and every probe passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed) && self.probes.iter().all(|p| p.passed)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &EvalResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Writes the report as pretty-printed JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), "Evaluation report saved");
        Ok(())
    }

    /// Renders a plain-text summary.
    pub fn render_text(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();

        let _ = writeln!(out, "Evaluation report ({})", self.timestamp.to_rfc3339());
        let _ = writeln!(
            out,
            "Task success rate: {:.1}% ({}/{})",
            self.summary.success_rate, m.passed_tests, m.total_tests
        );
        let _ = writeln!(out, "Fallback rate:     {:.1}%", self.summary.fallback_rate);
        let _ = writeln!(out, "Avg latency:       {:.0} ms", m.avg_latency_ms);
        let _ = writeln!(
            out,
            "Latency p50/p95:   {} ms / {} ms",
            m.p50_latency_ms, m.p95_latency_ms
        );

        let _ = writeln!(out, "\nRisk score distribution:");
        for (risk, count) in &m.confusion_matrix {
            let _ = writeln!(out, "  {:<8} {}", risk, count);
        }

        if !m.policy_denials.is_empty() {
            let _ = writeln!(out, "\nPolicy denials:");
            for (label, count) in &m.policy_denials {
                let _ = writeln!(out, "  {:<20} {}", label, count);
            }
        }

        if !self.probes.is_empty() {
            let _ = writeln!(out, "\nProbes:");
            for probe in &self.probes {
                let status = if probe.passed { "PASS" } else { "FAIL" };
                let _ = writeln!(out, "  [{}] {}: {}", status, probe.name, probe.detail);
            }
        }

        let failed: Vec<&EvalResult> = self.failed_cases().collect();
        if !failed.is_empty() {
            let _ = writeln!(out, "\nFailed cases:");
            for result in failed {
                let _ = writeln!(out, "  {} {}", result.id, result.description);
                if let Some(error) = &result.error {
                    let _ = writeln!(out, "    error: {}", error);
                }
                for mismatch in &result.mismatches {
                    let _ = writeln!(out, "    {}", mismatch);
                }
            }
        }

        out
    }
}
