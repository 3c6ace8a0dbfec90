//! Fraud alert queue connectors.

mod cached;
mod http;
mod mock;

pub use cached::{CachedAlertSource, QueryCachePolicy};
pub use http::HttpAlertSource;
pub use mock::MockAlertSource;
