//! Triage workflow state machine.
//!
//! A triage submission moves through these states:
//!
//! ```text
//! Idle -> AwaitingStepUp            (step-up required, no OTP supplied)
//! Idle -> Executing -> Done         (action executed)
//! Idle -> Done                      (no side effect, or degraded fallback)
//! AwaitingStepUp -> Executing       (operator supplied an OTP)
//! Executing -> AwaitingStepUp       (OTP rejected, prompt again)
//! any non-terminal -> Error
//! ```
//!
//! `Done` and `Error` are terminal for a submission; an operator starts over
//! with a new submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// State of a triage submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageState {
    /// Nothing submitted yet.
    Idle,
    /// An OTP is needed before the action can run.
    AwaitingStepUp,
    /// The remedial action is running.
    Executing,
    /// Triage finished.
    Done,
    /// Triage failed.
    Error,
}

impl TriageState {
    /// Returns true for states a submission cannot leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriageState::Done | TriageState::Error)
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriageState::Idle => "IDLE",
            TriageState::AwaitingStepUp => "AWAITING_STEP_UP",
            TriageState::Executing => "EXECUTING",
            TriageState::Done => "DONE",
            TriageState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Errors raised by the workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: TriageState, to: TriageState },
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TriageState,
    pub to: TriageState,
    pub at: DateTime<Utc>,
}

/// Allowed transitions, enumerated.
const TRANSITIONS: &[(TriageState, TriageState)] = &[
    (TriageState::Idle, TriageState::AwaitingStepUp),
    (TriageState::Idle, TriageState::Executing),
    (TriageState::Idle, TriageState::Done),
    (TriageState::Idle, TriageState::Error),
    (TriageState::AwaitingStepUp, TriageState::Executing),
    (TriageState::AwaitingStepUp, TriageState::Error),
    (TriageState::Executing, TriageState::AwaitingStepUp),
    (TriageState::Executing, TriageState::Done),
    (TriageState::Executing, TriageState::Error),
];

/// Tracks the state of one triage submission.
#[derive(Debug, Clone)]
pub struct TriageWorkflow {
    state: TriageState,
    history: Vec<StateTransition>,
}

impl Default for TriageWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl TriageWorkflow {
    /// Creates a workflow in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: TriageState::Idle,
            history: Vec::new(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> TriageState {
        self.state
    }

    /// Returns the recorded transitions, oldest first.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Returns true if the transition is allowed.
    pub fn can_transition(from: TriageState, to: TriageState) -> bool {
        TRANSITIONS.iter().any(|&(f, t)| f == from && t == to)
    }

    /// Moves to a new state.
    pub fn transition(&mut self, to: TriageState) -> Result<(), WorkflowError> {
        let from = self.state;
        if !Self::can_transition(from, to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }

        debug!(%from, %to, "Triage state transition");
        self.history.push(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_up_path() {
        let mut workflow = TriageWorkflow::new();
        workflow.transition(TriageState::AwaitingStepUp).unwrap();
        workflow.transition(TriageState::Executing).unwrap();
        workflow.transition(TriageState::Done).unwrap();

        assert_eq!(workflow.state(), TriageState::Done);
        assert!(workflow.state().is_terminal());
        assert_eq!(workflow.history().len(), 3);
        assert_eq!(workflow.history()[0].from, TriageState::Idle);
    }

    #[test]
    fn test_invalid_otp_returns_to_step_up() {
        let mut workflow = TriageWorkflow::new();
        workflow.transition(TriageState::Executing).unwrap();
        workflow.transition(TriageState::AwaitingStepUp).unwrap();
        assert_eq!(workflow.state(), TriageState::AwaitingStepUp);
    }

    #[test]
    fn test_terminal_states_cannot_be_left() {
        let mut workflow = TriageWorkflow::new();
        workflow.transition(TriageState::Done).unwrap();

        let err = workflow.transition(TriageState::Executing).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                from: TriageState::Done,
                to: TriageState::Executing,
            }
        );
        assert_eq!(workflow.state(), TriageState::Done);
    }

    #[test]
    fn test_cannot_skip_to_done_from_step_up() {
        assert!(!TriageWorkflow::can_transition(
            TriageState::AwaitingStepUp,
            TriageState::Done
        ));
        assert!(TriageWorkflow::can_transition(
            TriageState::Executing,
            TriageState::Error
        ));
    }
}
