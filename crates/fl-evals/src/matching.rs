//! Subset matching of actual decisions against expected ones.

use crate::fixtures::ExpectedDecision;
use fl_core::{RecommendedAction, RiskScore, TriageDecision};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The fields of a decision that evaluation compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualDecision {
    pub risk_score: RiskScore,
    pub recommended_action: RecommendedAction,
    #[serde(rename = "requiresOTP")]
    pub requires_otp: bool,
    pub reasons: Vec<String>,
    pub fallback_used: bool,
}

impl From<&TriageDecision> for ActualDecision {
    fn from(decision: &TriageDecision) -> Self {
        Self {
            risk_score: decision.risk_score,
            recommended_action: decision.recommended_action.clone(),
            requires_otp: decision.requires_otp,
            reasons: decision.reasons.clone(),
            fallback_used: decision.fallback_used,
        }
    }
}

/// Lists every constrained field whose actual value differs.
///
/// Reasons are compared as a set: every expected reason must be present,
/// extra reasons are fine.
pub fn mismatches(expected: &ExpectedDecision, actual: &ActualDecision) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(risk) = expected.risk_score {
        if risk != actual.risk_score {
            out.push(format!(
                "riskScore: expected {}, got {}",
                risk, actual.risk_score
            ));
        }
    }
    if let Some(action) = &expected.recommended_action {
        if action != &actual.recommended_action {
            out.push(format!(
                "recommendedAction: expected {}, got {}",
                action.as_str(),
                actual.recommended_action.as_str()
            ));
        }
    }
    if let Some(otp) = expected.requires_otp {
        if otp != actual.requires_otp {
            out.push(format!(
                "requiresOTP: expected {}, got {}",
                otp, actual.requires_otp
            ));
        }
    }
    if let Some(fallback) = expected.fallback_used {
        if fallback != actual.fallback_used {
            out.push(format!(
                "fallbackUsed: expected {}, got {}",
                fallback, actual.fallback_used
            ));
        }
    }
    if let Some(reasons) = &expected.reasons {
        let present: HashSet<&str> = actual.reasons.iter().map(String::as_str).collect();
        let missing: Vec<&str> = reasons
            .iter()
            .map(String::as_str)
            .filter(|reason| !present.contains(reason))
            .collect();
        if !missing.is_empty() {
            out.push(format!("reasons: missing {}", missing.join(", ")));
        }
    }

    out
}

impl ExpectedDecision {
    /// Returns true if `actual` satisfies every constrained field.
    pub fn matches(&self, actual: &ActualDecision) -> bool {
        mismatches(self, actual).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actual() -> ActualDecision {
        let decision = TriageDecision::new(RiskScore::High, RecommendedAction::FreezeCard)
            .with_reasons(["card_lost", "geo_velocity"])
            .requiring_otp();
        ActualDecision::from(&decision)
    }

    #[test]
    fn test_unconstrained_matches_anything() {
        assert!(ExpectedDecision::default().matches(&actual()));
    }

    #[test]
    fn test_reasons_are_subset_and_order_free() {
        let expected = ExpectedDecision {
            reasons: Some(vec!["geo_velocity".to_string()]),
            ..Default::default()
        };
        assert!(expected.matches(&actual()));

        let expected = ExpectedDecision {
            reasons: Some(vec!["geo_velocity".to_string(), "chargeback_history".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            mismatches(&expected, &actual()),
            vec!["reasons: missing chargeback_history".to_string()]
        );
    }

    #[test]
    fn test_each_field_reported() {
        let expected = ExpectedDecision {
            risk_score: Some(RiskScore::Low),
            recommended_action: Some(RecommendedAction::ContactCustomer),
            requires_otp: Some(false),
            reasons: None,
            fallback_used: Some(true),
        };

        let found = mismatches(&expected, &actual());
        assert_eq!(found.len(), 4);
        assert!(found[0].starts_with("riskScore"));
        assert!(found[1].contains("freeze_card"));
    }
}
