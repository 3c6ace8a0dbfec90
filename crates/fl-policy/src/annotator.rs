//! Table-driven post-processing of risk decisions.
//!
//! The annotator is the only place a risk score may be downgraded. It never
//! performs I/O and gives the same answer for the same decision.

use fl_core::{KbCitation, RecommendedAction, RiskScore, TriageDecision, DEFAULT_REASON_CODE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Annotation applied to decisions recommending a given action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRule {
    /// Recommended action this rule applies to.
    pub action: String,
    /// Risk score to downgrade to.
    #[serde(default)]
    pub downgrade_to: Option<RiskScore>,
    /// Citation to attach.
    #[serde(default)]
    pub citation: Option<KbCitation>,
    /// Reason code assigned when the decision carries none.
    #[serde(default)]
    pub default_reason_code: Option<String>,
}

impl AnnotationRule {
    /// Creates an empty rule for an action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            downgrade_to: None,
            citation: None,
            default_reason_code: None,
        }
    }

    pub fn with_downgrade(mut self, risk: RiskScore) -> Self {
        self.downgrade_to = Some(risk);
        self
    }

    pub fn with_citation(mut self, citation: KbCitation) -> Self {
        self.citation = Some(citation);
        self
    }

    pub fn with_default_reason_code(mut self, code: impl Into<String>) -> Self {
        self.default_reason_code = Some(code.into());
        self
    }
}

/// Built-in annotation table.
pub fn default_rules() -> Vec<AnnotationRule> {
    vec![
        AnnotationRule::new(RecommendedAction::OpenDispute.as_str())
            .with_citation(KbCitation::new(
                "How Disputes Work",
                "kb_disputes",
                "Unauthorized transactions are disputed under reason code 10.4. \
                 The card network reviews the claim and the customer receives a \
                 provisional credit while the case is open.",
            ))
            .with_default_reason_code(DEFAULT_REASON_CODE),
        AnnotationRule::new(RecommendedAction::ExplainDuplicate.as_str())
            .with_downgrade(RiskScore::Low)
            .with_citation(KbCitation::new(
                "Understanding Preauthorization Holds",
                "kb_preauth",
                "This appears to be a preauthorization followed by capture. \
                 The first charge will be released within 1-3 business days.",
            )),
    ]
}

/// Applies the annotation table to decisions.
#[derive(Debug, Clone)]
pub struct PolicyAnnotator {
    rules: HashMap<String, AnnotationRule>,
}

impl Default for PolicyAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyAnnotator {
    /// Creates an annotator with the built-in table.
    pub fn new() -> Self {
        Self::from_rules(default_rules())
    }

    /// Creates an annotator from a table. Later rules for the same action win.
    pub fn from_rules(rules: impl IntoIterator<Item = AnnotationRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| (rule.action.clone(), rule))
                .collect(),
        }
    }

    /// Returns the rule for an action, if any.
    pub fn rule_for(&self, action: &RecommendedAction) -> Option<&AnnotationRule> {
        self.rules.get(action.as_str())
    }

    /// Annotates a decision.
    ///
    /// Actions without a rule pass through unchanged with no citation.
    pub fn annotate(&self, decision: &TriageDecision) -> (TriageDecision, Option<KbCitation>) {
        let mut annotated = decision.clone();
        let Some(rule) = self.rule_for(&decision.recommended_action) else {
            return (annotated, None);
        };

        if let Some(risk) = rule.downgrade_to {
            annotated.risk_score = annotated.risk_score.min(risk);
        }
        if annotated.reason_code.is_none() {
            annotated.reason_code = rule.default_reason_code.clone();
        }

        (annotated, rule.citation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_duplicate_downgrades_and_cites() {
        let annotator = PolicyAnnotator::new();
        let decision = TriageDecision::new(RiskScore::Medium, "explain_duplicate")
            .with_reasons(["duplicate_transaction", "preauth_capture"]);

        let (annotated, citation) = annotator.annotate(&decision);
        assert_eq!(annotated.risk_score, RiskScore::Low);
        assert_eq!(annotated.reasons, decision.reasons);
        let citation = citation.unwrap();
        assert_eq!(citation.anchor, "kb_preauth");
        assert_eq!(citation.title, "Understanding Preauthorization Holds");
    }

    #[test]
    fn test_open_dispute_cites_and_assigns_reason_code() {
        let annotator = PolicyAnnotator::new();
        let decision = TriageDecision::new(RiskScore::High, "open_dispute");

        let (annotated, citation) = annotator.annotate(&decision);
        assert_eq!(annotated.risk_score, RiskScore::High);
        assert_eq!(annotated.reason_code.as_deref(), Some("10.4"));
        assert_eq!(citation.unwrap().anchor, "kb_disputes");
    }

    #[test]
    fn test_supplied_reason_code_kept() {
        let annotator = PolicyAnnotator::new();
        let decision = TriageDecision::new(RiskScore::High, "open_dispute").with_reason_code("10.5");
        let (annotated, _) = annotator.annotate(&decision);
        assert_eq!(annotated.reason_code.as_deref(), Some("10.5"));
    }

    #[test]
    fn test_other_actions_unchanged() {
        let annotator = PolicyAnnotator::new();
        for action in ["freeze_card", "contact_customer", "escalate_to_fraud_ops"] {
            let decision = TriageDecision::new(RiskScore::High, action).requiring_otp();
            let (annotated, citation) = annotator.annotate(&decision);
            assert_eq!(annotated, decision);
            assert!(citation.is_none());
        }
    }

    #[test]
    fn test_annotate_is_deterministic() {
        let annotator = PolicyAnnotator::new();
        let decision = TriageDecision::new(RiskScore::High, "explain_duplicate");
        assert_eq!(annotator.annotate(&decision), annotator.annotate(&decision));
    }

    #[test]
    fn test_downgrade_never_raises_risk() {
        let annotator = PolicyAnnotator::from_rules([
            AnnotationRule::new("contact_customer").with_downgrade(RiskScore::Medium)
        ]);
        let decision = TriageDecision::new(RiskScore::Low, "contact_customer");
        let (annotated, _) = annotator.annotate(&decision);
        assert_eq!(annotated.risk_score, RiskScore::Low);
    }
}
