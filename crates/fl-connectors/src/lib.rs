//! # fl-connectors
//!
//! Connectors for the services Fraudline orchestrates: the risk-decision
//! service, the remedial action service and the alert queue.
//!
//! Each service has a trait in [`traits`], a JSON/HTTP binding and an
//! in-memory mock used by tests and the demo evaluation target.

pub mod action;
pub mod alerts;
pub mod decision;
pub mod http;
pub mod secure_string;
#[cfg(test)]
mod testing;
pub mod traits;

pub use secure_string::SecureString;

pub use traits::{
    ActionService, AlertSource, AuthConfig, Connector, ConnectorConfig, ConnectorError,
    ConnectorHealth, ConnectorResult, DecisionService, DisputeRequest,
};

pub use action::{HttpActionService, MockActionService};
pub use alerts::{CachedAlertSource, HttpAlertSource, MockAlertSource, QueryCachePolicy};
pub use decision::{HttpDecisionService, MockDecisionService};
pub use http::{HttpClient, RateLimitConfig};
