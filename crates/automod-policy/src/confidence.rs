// confidence.rs — Weighted confidence and the critical-condition veto.
//
//   confidence = Σ weight(passed) / Σ weight(all)
//   matched    = no critical condition failed AND confidence ≥ threshold
//
// Conditions without an explicit weight get an equal share (1/N). Any
// condition whose effective weight is 1 or more is critical.

use serde::{Deserialize, Serialize};

/// Default confidence a policy needs before it counts as matched.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Weight at or above which a condition is critical.
pub const CRITICAL_WEIGHT: f64 = 1.0;

/// One condition's contribution: whether it held and its declared weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub weight: Option<f64>,
}

/// The aggregate match decision for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub confidence: f64,
    pub matched: bool,
    /// A critical condition evaluated false and vetoed the match.
    pub vetoed: bool,
}

impl Confidence {
    pub const NONE: Confidence = Confidence {
        confidence: 0.0,
        matched: false,
        vetoed: false,
    };
}

/// Combine per-condition outcomes into a confidence score and match decision.
pub fn aggregate(outcomes: &[ConditionOutcome], threshold: f64) -> Confidence {
    if outcomes.is_empty() {
        return Confidence::NONE;
    }

    let default_weight = 1.0 / outcomes.len() as f64;
    let mut total = 0.0;
    let mut passed = 0.0;
    let mut vetoed = false;

    for outcome in outcomes {
        let weight = outcome.weight.unwrap_or(default_weight);
        total += weight;
        if outcome.passed {
            passed += weight;
        } else if weight >= CRITICAL_WEIGHT {
            vetoed = true;
        }
    }

    let confidence = if total > 0.0 { passed / total } else { 0.0 };

    Confidence {
        confidence,
        matched: !vetoed && confidence >= threshold,
        vetoed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(passed: bool, weight: Option<f64>) -> ConditionOutcome {
        ConditionOutcome { passed, weight }
    }

    #[test]
    fn zero_conditions_never_match() {
        let c = aggregate(&[], DEFAULT_MATCH_THRESHOLD);
        assert_eq!(c.confidence, 0.0);
        assert!(!c.matched);
    }

    #[test]
    fn failed_critical_condition_vetoes_match() {
        let c = aggregate(
            &[o(false, Some(1.0)), o(true, Some(0.5))],
            DEFAULT_MATCH_THRESHOLD,
        );
        assert!((c.confidence - 1.0 / 3.0).abs() < 1e-9);
        assert!(c.vetoed);
        assert!(!c.matched);
    }

    #[test]
    fn veto_applies_even_when_score_clears_threshold() {
        let c = aggregate(
            &[o(false, Some(1.0)), o(true, Some(5.0))],
            DEFAULT_MATCH_THRESHOLD,
        );
        assert!(c.confidence > DEFAULT_MATCH_THRESHOLD);
        assert!(!c.matched);
    }

    #[test]
    fn weighted_pass_fraction() {
        let c = aggregate(
            &[o(true, Some(0.8)), o(true, Some(0.6))],
            DEFAULT_MATCH_THRESHOLD,
        );
        assert_eq!(c.confidence, 1.0);
        assert!(c.matched);
    }

    #[test]
    fn unweighted_conditions_share_equally() {
        let c = aggregate(
            &[o(true, None), o(true, None), o(false, None)],
            DEFAULT_MATCH_THRESHOLD,
        );
        assert!((c.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!(!c.matched);
        assert!(!c.vetoed);
    }

    #[test]
    fn threshold_is_inclusive() {
        let c = aggregate(&[o(true, Some(0.7)), o(false, Some(0.3))], 0.7);
        assert!(c.matched);
    }
}
