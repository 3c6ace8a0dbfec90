//! # fl-actions
//!
//! Remedial actions for Fraudline.
//!
//! The [`ActionExecutor`] runs a single action against the action service
//! under two guarantees: a step-up gated action never runs without an OTP,
//! and a repeated idempotency key never applies the effect twice.
//!
//! Available actions:
//! - `freeze_card`: freezes a card, requires step-up authentication
//! - `open_dispute`: opens a chargeback dispute for a transaction

pub mod executor;
pub mod freeze_card;
pub mod open_dispute;
pub mod registry;

pub use executor::{ActionExecutor, DEFAULT_ACTION_TIMEOUT};
pub use freeze_card::FreezeCardAction;
pub use open_dispute::OpenDisputeAction;
pub use registry::{ActionError, ActionRegistry, RemedialAction};
