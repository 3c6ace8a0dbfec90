//! Rate-limit backoff.
//!
//! After the decision service answers with a rate-limit signal, every caller
//! of the same client fails fast until the window has passed. The window is
//! one shared "disabled until" instant; a reactivation task clears it when it
//! elapses and is aborted when the gate is dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct GateState {
    disabled_until: Option<Instant>,
    reactivation: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared rate-limit window.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    state: Arc<Mutex<GateState>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left in the current window, or `None` if calls may proceed.
    pub fn remaining(&self) -> Option<Duration> {
        let mut state = lock(&self.state);
        let until = state.disabled_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            state.disabled_until = None;
            None
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.remaining().is_some()
    }

    /// Closes the gate for `window`. A later deadline never shortens an
    /// earlier one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn disable(&self, window: Duration) {
        let until = Instant::now() + window;
        let mut state = lock(&self.state);
        if matches!(state.disabled_until, Some(current) if current >= until) {
            return;
        }

        state.disabled_until = Some(until);
        if let Some(previous) = state.reactivation.take() {
            previous.abort();
        }
        state.reactivation = Some(tokio::spawn(reactivate(
            Arc::downgrade(&self.state),
            until,
        )));
        info!(window_ms = window.as_millis() as u64, "Rate limited, submissions paused");
    }

    /// Reopens the gate and cancels the pending reactivation.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.disabled_until = None;
        if let Some(handle) = state.reactivation.take() {
            handle.abort();
        }
    }

    /// Returns true while a reactivation task is pending.
    pub fn has_pending_reactivation(&self) -> bool {
        lock(&self.state)
            .reactivation
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn reactivate(state: Weak<Mutex<GateState>>, until: Instant) {
    sleep_until(until).await;
    if let Some(shared) = state.upgrade() {
        let mut state = lock(&shared);
        if state.disabled_until == Some(until) {
            state.disabled_until = None;
            state.reactivation = None;
            debug!("Rate-limit window elapsed, submissions resumed");
        }
    }
}

impl Drop for RateLimitGate {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.state).reactivation.take() {
            handle.abort();
        }
    }
}
