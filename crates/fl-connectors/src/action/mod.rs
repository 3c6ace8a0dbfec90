//! Remedial action service connectors.

mod http;
mod mock;

pub use http::HttpActionService;
pub use mock::MockActionService;
