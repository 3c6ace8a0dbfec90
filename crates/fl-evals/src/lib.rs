//! # fl-evals
//!
//! Evaluation harness for Fraudline.
//!
//! The harness replays golden triage cases through a
//! [`TriageClient`](fl_triage::TriageClient) strictly in order, runs the
//! burst and leak probes once the batch is done, and aggregates the results
//! into an [`EvalReport`].

pub mod fixtures;
pub mod harness;
pub mod matching;
pub mod metrics;
pub mod probes;
pub mod report;

pub use fixtures::{
    DirectoryFixtures, EvalCase, ExpectedDecision, FixtureError, FixtureSource, StaticFixtures,
};
pub use harness::{EvalResult, EvaluationHarness, HarnessConfig, HarnessError, HarnessState};
pub use matching::{mismatches, ActualDecision};
pub use self::metrics::{percentile, AggregateMetrics};
pub use probes::{burst_probe, leak_probe, leak_probe_request, ProbeResult, BURST_PROBE, LEAK_PROBE};
pub use report::{EvalReport, ReportError, ReportSummary};
