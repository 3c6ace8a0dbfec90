//! Policy configuration loading.
//!
//! The policy file controls the redaction mask, additional redaction
//! patterns and the annotation table. `${VAR}` references are replaced with
//! environment variables before parsing.

use crate::annotator::{default_rules, AnnotationRule, PolicyAnnotator};
use crate::redaction::{RedactionError, Redactor, DEFAULT_MASK};
use fl_core::is_valid_reason_code;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Errors that can occur when loading policy configuration.
#[derive(Error, Debug)]
pub enum PolicyConfigError {
    #[error("Failed to read policy file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML policy: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

impl From<RedactionError> for PolicyConfigError {
    fn from(err: RedactionError) -> Self {
        PolicyConfigError::InvalidValue(err.to_string())
    }
}

/// Redaction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSettings {
    /// Mask substituted for each match.
    #[serde(default = "default_mask")]
    pub mask: String,
    /// Regex patterns applied after the card-number rule.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

fn default_mask() -> String {
    DEFAULT_MASK.to_string()
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            mask: default_mask(),
            extra_patterns: Vec::new(),
        }
    }
}

/// Root policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub redaction: RedactionSettings,
    /// Annotation table; the built-in table is used when empty.
    #[serde(default)]
    pub annotations: Vec<AnnotationRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            redaction: RedactionSettings::default(),
            annotations: default_rules(),
        }
    }
}

impl PolicyConfig {
    /// Builds the redactor described by this configuration.
    pub fn redactor(&self) -> Result<Redactor, PolicyConfigError> {
        let patterns: Vec<&str> = self
            .redaction
            .extra_patterns
            .iter()
            .map(String::as_str)
            .collect();
        Ok(Redactor::from_patterns(&patterns)?.with_mask(&self.redaction.mask))
    }

    /// Builds the annotator described by this configuration.
    pub fn annotator(&self) -> PolicyAnnotator {
        if self.annotations.is_empty() {
            PolicyAnnotator::new()
        } else {
            PolicyAnnotator::from_rules(self.annotations.clone())
        }
    }
}

/// Replaces `${VAR}` references with environment values.
fn substitute_env_vars(input: &str) -> Result<String, PolicyConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
        PolicyConfigError::InvalidRegex {
            pattern: "env var reference".to_string(),
            message: e.to_string(),
        }
    })?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(PolicyConfigError::EnvVarNotFound(missing.join(", ")));
    }
    Ok(result.into_owned())
}

fn validate_config(config: &PolicyConfig) -> Result<(), PolicyConfigError> {
    if config.redaction.mask.is_empty() {
        return Err(PolicyConfigError::InvalidValue(
            "redaction.mask must not be empty".to_string(),
        ));
    }
    if config.redaction.mask.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyConfigError::InvalidValue(
            "redaction.mask must not contain digits".to_string(),
        ));
    }

    for pattern in &config.redaction.extra_patterns {
        Regex::new(pattern).map_err(|e| PolicyConfigError::InvalidRegex {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }

    for rule in &config.annotations {
        if rule.action.is_empty() {
            return Err(PolicyConfigError::InvalidValue(
                "annotations[].action must not be empty".to_string(),
            ));
        }
        if let Some(code) = &rule.default_reason_code {
            if !is_valid_reason_code(code) {
                return Err(PolicyConfigError::InvalidValue(format!(
                    "annotations[{}].default_reason_code '{}' is not a valid reason code",
                    rule.action, code
                )));
            }
        }
    }

    Ok(())
}

/// Parses and validates policy configuration from YAML text.
pub fn parse_policy(content: &str) -> Result<PolicyConfig, PolicyConfigError> {
    let content = substitute_env_vars(content)?;
    let config: PolicyConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads and validates policy configuration from a YAML file.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use fl_policy::config::load_policy;
///
/// let policy = load_policy(Path::new("config/policy.yaml")).unwrap();
/// let annotator = policy.annotator();
/// ```
pub fn load_policy(path: &Path) -> Result<PolicyConfig, PolicyConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_policy(&content)?;

    info!(
        path = %path.display(),
        annotations = config.annotations.len(),
        extra_patterns = config.redaction.extra_patterns.len(),
        "Loaded policy configuration"
    );
    Ok(config)
}
