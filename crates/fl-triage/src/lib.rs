//! # fl-triage
//!
//! The triage client: submits alerts to the risk-decision service and turns
//! its answer into an actionable [`TriageOutcome`](fl_core::TriageOutcome).
//!
//! A submission is redacted before it leaves the process, gated by the
//! shared rate-limit window, held for step-up when the decision needs an OTP,
//! executed through the action executor when the decision has a side effect,
//! and finally annotated by the policy annotator.

pub mod backoff;
pub mod client;
pub mod config;

pub use backoff::RateLimitGate;
pub use client::{TriageClient, TriageError, PII_DETECTION_STEP, REDACTION_APPLIED_STEP};
pub use config::TriageClientConfig;
