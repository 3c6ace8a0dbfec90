//! Best-effort metrics sink for Fraudline.
//!
//! Recording a metric never blocks and never fails from the caller's point
//! of view. Events go into a bounded queue drained by a background worker;
//! when the queue is full the event is dropped.

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram, Label};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub const AGENT_FALLBACK_TOTAL: &str = "fl_agent_fallback_total";
pub const ACTION_BLOCKED_TOTAL: &str = "fl_action_blocked_total";
pub const POLICY_GATED_APPROVED_TOTAL: &str = "fl_policy_gated_action_approved_total";
pub const RATE_LIMIT_BLOCK_TOTAL: &str = "fl_rate_limit_block_total";
pub const ACTIONS_EXECUTED_TOTAL: &str = "fl_actions_executed_total";
pub const TRIAGE_DURATION_SECONDS: &str = "fl_triage_duration_seconds";

/// Errors a metrics backend may report. The sink logs and drops them.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// A single metric observation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Counter {
        name: &'static str,
        labels: Vec<(&'static str, String)>,
    },
    Histogram {
        name: &'static str,
        value: f64,
    },
}

impl MetricEvent {
    pub fn counter(name: &'static str, labels: Vec<(&'static str, String)>) -> Self {
        MetricEvent::Counter { name, labels }
    }

    /// Key under which the event is tallied, e.g. `name{policy="otp_required"}`.
    pub fn key(&self) -> String {
        match self {
            MetricEvent::Counter { name, labels } => series_key(name, labels),
            MetricEvent::Histogram { name, .. } => (*name).to_string(),
        }
    }
}

fn series_key<K: AsRef<str>, V: AsRef<str>>(name: &str, labels: &[(K, V)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let labels: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k.as_ref(), v.as_ref()))
        .collect();
    format!("{}{{{}}}", name, labels.join(","))
}

/// Destination for metric events.
#[async_trait]
pub trait MetricsBackend: Send + Sync + 'static {
    async fn record(&self, event: &MetricEvent) -> Result<(), MetricsError>;
}

/// Backend that forwards events to the global `metrics` recorder.
pub struct RecorderBackend;

impl RecorderBackend {
    pub fn new() -> Self {
        Self::register_metrics();
        Self
    }

    fn register_metrics() {
        describe_counter!(
            AGENT_FALLBACK_TOTAL,
            "Triage submissions answered with a degraded fallback decision"
        );
        describe_counter!(
            ACTION_BLOCKED_TOTAL,
            "Remedial actions held back or refused by policy"
        );
        describe_counter!(
            POLICY_GATED_APPROVED_TOTAL,
            "Remedial actions that passed a policy gate such as step-up"
        );
        describe_counter!(
            RATE_LIMIT_BLOCK_TOTAL,
            "Triage submissions rejected by the rate-limit gate"
        );
        describe_counter!(ACTIONS_EXECUTED_TOTAL, "Remedial actions executed");
        describe_histogram!(
            TRIAGE_DURATION_SECONDS,
            "Wall-clock duration of a triage submission"
        );
    }
}

impl Default for RecorderBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsBackend for RecorderBackend {
    async fn record(&self, event: &MetricEvent) -> Result<(), MetricsError> {
        match event {
            MetricEvent::Counter { name, labels } => {
                let labels: Vec<Label> = labels
                    .iter()
                    .map(|(k, v)| Label::new(*k, v.clone()))
                    .collect();
                counter!(*name, labels).increment(1);
            }
            MetricEvent::Histogram { name, value } => {
                histogram!(*name).record(*value);
            }
        }
        Ok(())
    }
}

/// Point-in-time view of everything the sink has applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub series: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Count for one labelled series.
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.series
            .get(&series_key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// Count across every label combination of a metric.
    pub fn total(&self, name: &str) -> u64 {
        self.series
            .iter()
            .filter(|(key, _)| {
                key.as_str() == name
                    || key
                        .strip_prefix(name)
                        .is_some_and(|rest| rest.starts_with('{'))
            })
            .map(|(_, count)| count)
            .sum()
    }
}

enum SinkMessage {
    Event(MetricEvent),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable handle to the metrics queue.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<SinkMessage>,
    tally: Arc<RwLock<BTreeMap<String, u64>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for MetricsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsSink")
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

impl MetricsSink {
    /// Creates a sink backed by the global `metrics` recorder.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(RecorderBackend::new()), DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a sink with a custom backend and queue capacity.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let tally = Arc::new(RwLock::new(BTreeMap::new()));
        let handle = tokio::spawn(run_worker(rx, backend, Arc::clone(&tally)));

        Self {
            tx,
            tally,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queues an event. Drops it if the queue is full or closed.
    pub fn emit(&self, event: MetricEvent) {
        if let Err(e) = self.tx.try_send(SinkMessage::Event(event)) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "sink closed",
            };
            debug!(reason, "Dropped metric event");
        }
    }

    /// Increments a counter with arbitrary labels.
    pub fn increment(&self, name: &'static str, labels: Vec<(&'static str, String)>) {
        self.emit(MetricEvent::counter(name, labels));
    }

    /// A degraded fallback answered a triage submission.
    pub fn record_fallback(&self, tool: &str) {
        self.increment(AGENT_FALLBACK_TOTAL, vec![("tool", tool.to_string())]);
    }

    /// A policy held back or refused an action.
    pub fn record_policy_denial(&self, policy: &str) {
        self.increment(ACTION_BLOCKED_TOTAL, vec![("policy", policy.to_string())]);
    }

    /// An action passed a policy gate.
    pub fn record_policy_gated_approval(&self, policy: &str) {
        self.increment(
            POLICY_GATED_APPROVED_TOTAL,
            vec![("policy", policy.to_string())],
        );
    }

    /// The rate-limit gate rejected a submission.
    pub fn record_rate_limited(&self) {
        self.increment(RATE_LIMIT_BLOCK_TOTAL, Vec::new());
    }

    pub fn record_action_executed(&self, action: &str, status: &str) {
        self.increment(
            ACTIONS_EXECUTED_TOTAL,
            vec![("action", action.to_string()), ("status", status.to_string())],
        );
    }

    pub fn record_triage_duration(&self, duration: Duration) {
        self.emit(MetricEvent::Histogram {
            name: TRIAGE_DURATION_SECONDS,
            value: duration.as_secs_f64(),
        });
    }

    /// Waits until every event queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SinkMessage::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Returns the tally of applied events.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            series: self.tally.read().await.clone(),
        }
    }

    /// Drains the queue and stops the worker. Later events are dropped.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SinkMessage::Shutdown).await;
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                debug!(error = %e, "Metrics worker ended abnormally");
            }
        }
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<SinkMessage>,
    backend: Arc<dyn MetricsBackend>,
    tally: Arc<RwLock<BTreeMap<String, u64>>>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Event(event) => {
                *tally.write().await.entry(event.key()).or_insert(0) += 1;
                if let Err(e) = backend.record(&event).await {
                    debug!(error = %e, metric = %event.key(), "Metrics backend rejected event");
                }
            }
            SinkMessage::Flush(done) => {
                let _ = done.send(());
            }
            SinkMessage::Shutdown => break,
        }
    }
    rx.close();
}
