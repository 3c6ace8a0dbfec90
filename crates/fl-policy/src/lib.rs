//! # fl-policy
//!
//! Privacy and annotation policy for Fraudline.
//!
//! This crate provides the [`Redactor`] that masks card numbers in free text,
//! the table-driven [`PolicyAnnotator`] that finalizes risk decisions, and
//! the YAML policy configuration that customizes both.

pub mod annotator;
pub mod config;
pub mod redaction;

pub use annotator::{default_rules, AnnotationRule, PolicyAnnotator};
pub use config::{load_policy, parse_policy, PolicyConfig, PolicyConfigError, RedactionSettings};
pub use fl_core::mask_identifier;
pub use redaction::{RedactionError, RedactionResult, RedactionRule, Redactor, DEFAULT_MASK};
