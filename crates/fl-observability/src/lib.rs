//! # fl-observability
//!
//! Logging and metrics infrastructure for Fraudline.
//!
//! This crate provides structured logging with tracing and the best-effort
//! [`MetricsSink`] used to count fallbacks, policy denials and executed
//! actions.

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, init_logging_with_config, LoggingConfig, LoggingSettings};
pub use self::metrics::{
    MetricEvent, MetricsBackend, MetricsError, MetricsSink, MetricsSnapshot, RecorderBackend,
    ACTIONS_EXECUTED_TOTAL, ACTION_BLOCKED_TOTAL, AGENT_FALLBACK_TOTAL, DEFAULT_QUEUE_CAPACITY,
    POLICY_GATED_APPROVED_TOTAL, RATE_LIMIT_BLOCK_TOTAL, TRIAGE_DURATION_SECONDS,
};
