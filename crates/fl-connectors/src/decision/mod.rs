//! Risk-decision service connectors.

mod http;
mod mock;

pub use http::HttpDecisionService;
pub use mock::MockDecisionService;
