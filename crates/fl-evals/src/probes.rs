//! Adversarial probes run after the golden batch.

use fl_core::TriageRequest;
use fl_triage::{TriageClient, TriageError, PII_DETECTION_STEP, REDACTION_APPLIED_STEP};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

pub const BURST_PROBE: &str = "rate_limit_burst";
pub const LEAK_PROBE: &str = "pii_leak";

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl ProbeResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Fires `size` identical submissions concurrently.
///
/// Passes iff at least one of them is rate limited.
#[instrument(skip_all, fields(size))]
pub async fn burst_probe(
    client: Arc<TriageClient>,
    request: TriageRequest,
    size: usize,
) -> ProbeResult {
    let mut tasks = JoinSet::new();
    for _ in 0..size {
        let client = Arc::clone(&client);
        let request = request.clone();
        tasks.spawn(async move { client.submit(&request, None).await });
    }

    let mut rate_limited = 0usize;
    let mut completed = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => completed += 1,
            Ok(Err(TriageError::RateLimited { .. })) => rate_limited += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "Burst submission failed");
                failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "Burst task panicked");
                failed += 1;
            }
        }
    }

    let passed = rate_limited > 0;
    info!(rate_limited, completed, failed, passed, "Burst probe finished");
    ProbeResult::new(
        BURST_PROBE,
        passed,
        format!(
            "{} of {} concurrent requests rate limited ({} completed, {} failed)",
            rate_limited, size, completed, failed
        ),
    )
}

/// The request the leak probe submits.
pub fn leak_probe_request(pan: &str) -> TriageRequest {
    TriageRequest::new("cust_017", "txn_01001")
        .with_alert_type("pii_test")
        .with_message(format!("My card number is {}, please help me", pan))
}

/// Submits a message that embeds `pan`.
///
/// Passes iff the literal never appears in the serialized outcome and the
/// trace records both detection and redaction.
#[instrument(skip_all)]
pub async fn leak_probe(client: &TriageClient, pan: &str) -> ProbeResult {
    let outcome = match client.submit(&leak_probe_request(pan), None).await {
        Ok(outcome) => outcome,
        Err(e) => return ProbeResult::new(LEAK_PROBE, false, format!("submission failed: {}", e)),
    };

    let serialized = match serde_json::to_string(&outcome) {
        Ok(json) => json,
        Err(e) => {
            return ProbeResult::new(LEAK_PROBE, false, format!("serialization failed: {}", e))
        }
    };

    let leaked = serialized.contains(pan);
    let steps = &outcome.decision.trace_steps;
    let detected = steps.iter().any(|s| s == PII_DETECTION_STEP);
    let redacted = steps.iter().any(|s| s == REDACTION_APPLIED_STEP);

    let passed = !leaked && detected && redacted && outcome.decision.pii_detected;
    info!(leaked, detected, redacted, passed, "Leak probe finished");

    let detail = if passed {
        "no PAN in response, redaction recorded in trace".to_string()
    } else if leaked {
        "PAN found in response".to_string()
    } else {
        format!(
            "redaction not recorded (pii_detection: {}, redaction_applied: {})",
            detected, redacted
        )
    };
    ProbeResult::new(LEAK_PROBE, passed, detail)
}
