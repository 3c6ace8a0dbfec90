//! Sensitive-data redaction for Fraudline.
//!
//! Free text typed by operators or customers is scanned before it leaves the
//! client, and strings returned by the decision service are scanned again
//! before they reach the caller. The built-in rule masks any run of sixteen
//! consecutive digits (a primary account number); more rules can be added as
//! regular expressions.

use fl_core::{RecommendedAction, TriageDecision, TriageRequest};
use regex::Regex;
use thiserror::Error;

/// Fixed-length mask substituted for each match.
pub const DEFAULT_MASK: &str = "****REDACTED****";

/// Length of the digit run treated as a card number.
pub const PAN_DIGITS: usize = 16;

/// Errors that can occur while building a redactor.
#[derive(Error, Debug)]
pub enum RedactionError {
    #[error("Invalid redaction pattern: {0}")]
    InvalidPattern(String),
}

/// Result of a redaction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    /// The text with sensitive data masked.
    pub redacted_text: String,
    /// Number of masked matches.
    pub redaction_count: usize,
}

impl RedactionResult {
    /// Returns true if anything was masked.
    pub fn pii_detected(&self) -> bool {
        self.redaction_count > 0
    }
}

/// A single detection rule.
#[derive(Debug, Clone)]
pub enum RedactionRule {
    /// Every complete run of `len` ASCII digits.
    DigitRun { len: usize },
    /// Any match of a regular expression.
    Pattern(Regex),
}

impl RedactionRule {
    fn apply(&self, text: &str, mask: &str) -> (String, usize) {
        match self {
            RedactionRule::DigitRun { len } => mask_digit_runs(text, *len, mask),
            RedactionRule::Pattern(re) => {
                let count = re.find_iter(text).count();
                if count == 0 {
                    return (text.to_string(), 0);
                }
                (re.replace_all(text, mask).into_owned(), count)
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            RedactionRule::DigitRun { len } => mask_digit_runs(text, *len, "").1 > 0,
            RedactionRule::Pattern(re) => re.is_match(text),
        }
    }
}

/// Masks each complete chunk of `len` consecutive digits, left to right.
fn mask_digit_runs(text: &str, len: usize, mask: &str) -> (String, usize) {
    if len == 0 {
        return (text.to_string(), 0);
    }

    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    let mut count = 0usize;

    let flush = |run: &mut String, out: &mut String, count: &mut usize| {
        let chunks = run.len() / len;
        for _ in 0..chunks {
            out.push_str(mask);
        }
        out.push_str(&run[chunks * len..]);
        *count += chunks;
        run.clear();
    };

    for c in text.chars() {
        if c.is_ascii_digit() {
            run.push(c);
        } else {
            flush(&mut run, &mut out, &mut count);
            out.push(c);
        }
    }
    flush(&mut run, &mut out, &mut count);

    (out, count)
}

/// Masks sensitive substrings in free text.
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
    mask: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Redactor {
    /// Creates a redactor with the card-number rule and the default mask.
    pub fn new() -> Self {
        Self {
            rules: vec![RedactionRule::DigitRun { len: PAN_DIGITS }],
            mask: DEFAULT_MASK.to_string(),
        }
    }

    /// Creates a redactor with the card-number rule plus extra regex patterns.
    pub fn from_patterns(patterns: &[&str]) -> Result<Self, RedactionError> {
        patterns
            .iter()
            .try_fold(Self::new(), |redactor, pattern| redactor.with_pattern(pattern))
    }

    /// Adds a regex rule.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, RedactionError> {
        let re = Regex::new(pattern).map_err(|e| RedactionError::InvalidPattern(e.to_string()))?;
        self.rules.push(RedactionRule::Pattern(re));
        Ok(self)
    }

    /// Adds a rule.
    pub fn with_rule(mut self, rule: RedactionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Sets the mask text.
    pub fn with_mask(mut self, mask: &str) -> Self {
        self.mask = mask.to_string();
        self
    }

    /// Returns the mask text.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Masks every rule match in `text`.
    pub fn redact(&self, text: &str) -> RedactionResult {
        let mut redacted_text = text.to_string();
        let mut redaction_count = 0usize;

        for rule in &self.rules {
            let (next, count) = rule.apply(&redacted_text, &self.mask);
            redacted_text = next;
            redaction_count += count;
        }

        RedactionResult {
            redacted_text,
            redaction_count,
        }
    }

    /// Checks if text contains sensitive data without redacting.
    pub fn contains_pii(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(text))
    }

    /// Returns a copy of the request with its free-text fields masked, and
    /// whether anything was masked.
    pub fn redact_request(&self, request: &TriageRequest) -> (TriageRequest, bool) {
        let message = self.redact(&request.user_message);
        let alert_type = request.alert_type.as_deref().map(|t| self.redact(t));

        let detected = message.pii_detected()
            || alert_type.as_ref().is_some_and(RedactionResult::pii_detected);

        let redacted = TriageRequest {
            customer_id: request.customer_id.clone(),
            suspect_txn_id: request.suspect_txn_id.clone(),
            alert_type: alert_type.map(|r| r.redacted_text),
            user_message: message.redacted_text,
        };
        (redacted, detected)
    }

    /// Masks every string field of a decision in place.
    ///
    /// Returns the number of matches masked. Identifiers are scrubbed too,
    /// since the card id becomes an action subject and part of its
    /// idempotency key.
    pub fn scrub_decision(&self, decision: &mut TriageDecision) -> usize {
        let mut count = 0usize;
        let mut scrub = |value: &mut String| {
            let result = self.redact(value);
            if result.pii_detected() {
                count += result.redaction_count;
                *value = result.redacted_text;
            }
        };

        decision.reasons.iter_mut().for_each(&mut scrub);
        decision.trace_steps.iter_mut().for_each(&mut scrub);
        for field in [
            decision.merchant.as_mut(),
            decision.reason_code.as_mut(),
            decision.card_id.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            scrub(field);
        }
        if let RecommendedAction::Other(action) = &mut decision.recommended_action {
            scrub(action);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_core::RiskScore;

    #[test]
    fn test_masks_card_number() {
        let redactor = Redactor::new();
        let result = redactor.redact("My card number is 4111111111111111, please help me");

        assert_eq!(
            result.redacted_text,
            "My card number is ****REDACTED****, please help me"
        );
        assert_eq!(result.redaction_count, 1);
        assert!(result.pii_detected());
    }

    #[test]
    fn test_mask_is_fixed_length() {
        assert_eq!(DEFAULT_MASK.len(), PAN_DIGITS);
    }

    #[test]
    fn test_short_digit_runs_untouched() {
        let redactor = Redactor::new();
        let result = redactor.redact("txn 01001 for 1500 cents, otp 123456");
        assert_eq!(result.redacted_text, "txn 01001 for 1500 cents, otp 123456");
        assert!(!result.pii_detected());
    }

    #[test]
    fn test_long_runs_masked_in_chunks() {
        let redactor = Redactor::new();
        let result = redactor.redact("41111111111111112");
        assert_eq!(result.redacted_text, "****REDACTED****2");
        assert_eq!(result.redaction_count, 1);

        let result = redactor.redact(&"1".repeat(32));
        assert_eq!(result.redaction_count, 2);
        assert!(!result.redacted_text.contains('1'));
    }

    #[test]
    fn test_separated_groups_not_a_run() {
        let redactor = Redactor::new();
        assert!(!redactor.contains_pii("4111 1111 1111 1111"));
        assert!(redactor.contains_pii("card:4111111111111111"));
    }

    #[test]
    fn test_extra_patterns() {
        let redactor =
            Redactor::from_patterns(&[r"\b\d{3}-\d{2}-\d{4}\b"]).unwrap().with_mask("[PII]");
        let result = redactor.redact("ssn 123-45-6789 card 4111111111111111");
        assert_eq!(result.redacted_text, "ssn [PII] card [PII]");
        assert_eq!(result.redaction_count, 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let result = Redactor::from_patterns(&["[unclosed"]);
        assert!(matches!(result, Err(RedactionError::InvalidPattern(_))));
    }

    #[test]
    fn test_redact_request() {
        let redactor = Redactor::new();
        let request = TriageRequest::new("cust_017", "txn_01001")
            .with_message("My card number is 4111111111111111, please help me");

        let (redacted, detected) = redactor.redact_request(&request);
        assert!(detected);
        assert!(!redacted.user_message.contains("4111111111111111"));
        assert_eq!(redacted.customer_id, "cust_017");

        let clean = TriageRequest::new("cust_017", "txn_01001").with_message("card stolen");
        let (same, detected) = redactor.redact_request(&clean);
        assert!(!detected);
        assert_eq!(same, clean);
    }

    #[test]
    fn test_scrub_decision() {
        let redactor = Redactor::new();
        let mut decision = TriageDecision::new(RiskScore::High, "open_dispute")
            .with_reasons(["echo:4111111111111111", "unauthorized_transaction"]);
        decision.merchant = Some("Shop 4111111111111111".to_string());

        let count = redactor.scrub_decision(&mut decision);
        assert_eq!(count, 2);
        assert!(!serde_json::to_string(&decision)
            .unwrap()
            .contains("4111111111111111"));
        assert!(decision.has_reason("unauthorized_transaction"));
    }

    #[test]
    fn test_scrub_decision_covers_identifiers_and_unknown_action() {
        let pan = "4111111111111111";
        let redactor = Redactor::new();
        let mut decision = TriageDecision::new(RiskScore::High, format!("escalate_{}", pan))
            .with_card(pan)
            .with_reason_code(pan);

        let count = redactor.scrub_decision(&mut decision);

        assert_eq!(count, 3);
        assert!(!serde_json::to_string(&decision).unwrap().contains(pan));
        assert_eq!(decision.card_id.as_deref(), Some(DEFAULT_MASK));
        assert_eq!(decision.reason_code.as_deref(), Some(DEFAULT_MASK));
        assert_eq!(
            decision.recommended_action,
            RecommendedAction::Other(format!("escalate_{}", DEFAULT_MASK))
        );
    }
}
