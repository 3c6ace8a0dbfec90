//! Aggregate evaluation metrics.

use crate::harness::EvalResult;
use fl_core::RiskScore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nearest-rank percentile of an ascending slice.
///
/// Uses index `floor(p * n)`, clamped to `n - 1`. Returns `None` for an
/// empty slice.
pub fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Metrics derived once from a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// Fraction of cases answered by the fallback path, in `0.0..=1.0`.
    pub fallback_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    /// Count of actual risk scores, keyed `low`/`medium`/`high`.
    pub confusion_matrix: BTreeMap<String, usize>,
    /// Count of observed policy-denial labels.
    pub policy_denials: BTreeMap<String, usize>,
}

impl AggregateMetrics {
    pub fn from_results(results: &[EvalResult]) -> Self {
        let total_tests = results.len();
        let passed_tests = results.iter().filter(|r| r.passed).count();
        let fallbacks = results.iter().filter(|r| r.fallback_used).count();

        let mut latencies: Vec<u64> = results.iter().map(|r| r.latency_ms).collect();
        latencies.sort_unstable();

        let (fallback_rate, avg_latency_ms) = if total_tests == 0 {
            (0.0, 0.0)
        } else {
            (
                fallbacks as f64 / total_tests as f64,
                latencies.iter().sum::<u64>() as f64 / total_tests as f64,
            )
        };

        let mut confusion_matrix: BTreeMap<String, usize> =
            [RiskScore::Low, RiskScore::Medium, RiskScore::High]
                .iter()
                .map(|risk| (risk.as_str().to_string(), 0))
                .collect();
        let mut policy_denials = BTreeMap::new();

        for result in results {
            if let Some(actual) = &result.actual {
                *confusion_matrix
                    .entry(actual.risk_score.as_str().to_string())
                    .or_insert(0) += 1;
            }
            if let Some(label) = &result.policy_denial {
                *policy_denials.entry(label.clone()).or_insert(0) += 1;
            }
        }

        Self {
            total_tests,
            passed_tests,
            failed_tests: total_tests - passed_tests,
            fallback_rate,
            avg_latency_ms,
            p50_latency_ms: percentile(&latencies, 0.50).unwrap_or(0),
            p95_latency_ms: percentile(&latencies, 0.95).unwrap_or(0),
            confusion_matrix,
            policy_denials,
        }
    }

    /// Share of passed cases, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.passed_tests as f64 / self.total_tests as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::ActualDecision;
    use fl_core::RecommendedAction;

    fn result(id: &str, passed: bool, latency_ms: u64, risk: Option<RiskScore>) -> EvalResult {
        EvalResult {
            id: id.to_string(),
            description: String::new(),
            passed,
            latency_ms,
            actual: risk.map(|risk_score| ActualDecision {
                risk_score,
                recommended_action: RecommendedAction::ContactCustomer,
                requires_otp: false,
                reasons: Vec::new(),
                fallback_used: false,
            }),
            fallback_used: false,
            policy_denial: None,
            mismatches: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted = [10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 0.50), Some(30));
        assert_eq!(percentile(&sorted, 0.95), Some(50));
        assert_eq!(percentile(&sorted, 1.0), Some(50));
        assert_eq!(percentile(&sorted, 0.0), Some(10));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_aggregate_counts() {
        let mut fallback = result("c3", false, 30, Some(RiskScore::Medium));
        fallback.fallback_used = true;
        let mut denied = result("c4", true, 40, Some(RiskScore::High));
        denied.policy_denial = Some("otp_required".to_string());

        let results = vec![
            result("c1", true, 10, Some(RiskScore::Low)),
            result("c2", false, 20, None),
            fallback,
            denied,
            result("c5", true, 50, Some(RiskScore::High)),
        ];
        let metrics = AggregateMetrics::from_results(&results);

        assert_eq!(metrics.total_tests, 5);
        assert_eq!(metrics.passed_tests, 3);
        assert_eq!(metrics.failed_tests, 2);
        assert!((metrics.fallback_rate - 0.2).abs() < f64::EPSILON);
        assert!((metrics.avg_latency_ms - 30.0).abs() < f64::EPSILON);
        assert_eq!(metrics.p50_latency_ms, 30);
        assert_eq!(metrics.p95_latency_ms, 50);
        assert_eq!(metrics.confusion_matrix["low"], 1);
        assert_eq!(metrics.confusion_matrix["medium"], 1);
        assert_eq!(metrics.confusion_matrix["high"], 2);
        assert_eq!(metrics.policy_denials["otp_required"], 1);
        assert!((metrics.success_rate() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run() {
        let metrics = AggregateMetrics::from_results(&[]);
        assert_eq!(metrics.total_tests, 0);
        assert_eq!(metrics.fallback_rate, 0.0);
        assert_eq!(metrics.p50_latency_ms, 0);
        assert_eq!(metrics.confusion_matrix.len(), 3);
    }
}
