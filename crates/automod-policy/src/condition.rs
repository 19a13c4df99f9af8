// condition.rs — Conditions and operator semantics.
//
// A condition names a field path, an operator, and a literal. Field paths
// are resolved elsewhere (the engine's ContextResolver); this module only
// decides, given an already-resolved value, whether the predicate holds.
//
// Evaluation is pure: no clocks, no I/O. An `Unresolved` value never
// satisfies a condition, negated or not.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PolicyError;

/// What a condition is about. Used for display and grouping only; the
/// field path decides what is actually read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    #[default]
    Content,
    User,
    Server,
    Ai,
    Attachment,
    Custom,
}

/// Comparison operators available to policy authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    Matches,
    GreaterThan,
    LessThan,
    InRange,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::Matches => "matches",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::InRange => "in_range",
        }
    }

    /// Apply this operator to a literal and a resolved value.
    ///
    /// Returns an error only when the *literal* is malformed for the
    /// operator. Resolved values of the wrong shape evaluate to `false`.
    pub fn apply(&self, literal: &Value, value: &Value) -> Result<bool, PolicyError> {
        match self {
            Operator::Equals => Ok(values_equal(literal, value)),
            Operator::NotEquals => Ok(!values_equal(literal, value)),
            Operator::Contains => Ok(match (value, literal) {
                (Value::String(haystack), Value::String(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            }),
            Operator::Matches => {
                let pattern = literal.as_str().ok_or_else(|| PolicyError::InvalidLiteral {
                    operator: self.as_str().to_string(),
                    reason: "pattern must be a string".to_string(),
                })?;
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|e| PolicyError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(match value {
                    Value::String(s) => regex.is_match(s),
                    Value::Number(n) => regex.is_match(&n.to_string()),
                    Value::Bool(b) => regex.is_match(&b.to_string()),
                    _ => false,
                })
            }
            Operator::GreaterThan => Ok(match (as_number(value), as_number(literal)) {
                (Some(v), Some(l)) => v > l,
                _ => false,
            }),
            Operator::LessThan => Ok(match (as_number(value), as_number(literal)) {
                (Some(v), Some(l)) => v < l,
                _ => false,
            }),
            Operator::InRange => {
                let (min, max) = range_bounds(literal).ok_or_else(|| {
                    PolicyError::InvalidLiteral {
                        operator: self.as_str().to_string(),
                        reason: "expected {min, max} or [min, max] with numeric bounds"
                            .to_string(),
                    }
                })?;
                Ok(as_number(value).is_some_and(|v| min <= v && v <= max))
            }
        }
    }
}

/// A value produced by resolving a field path.
///
/// `Unresolved` is distinct from a legitimate `false`, `0`, or `null`: it
/// means the path had a missing link or a collaborator failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Unresolved,
    Value(Value),
}

impl Resolved {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolved::Value(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::Unresolved => None,
        }
    }
}

impl From<Option<Value>> for Resolved {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Resolved::Unresolved, Resolved::Value)
    }
}

/// A single testable predicate over the resolved event context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    #[serde(rename = "type", default)]
    pub kind: ConditionKind,

    pub operator: Operator,

    /// Dot-separated field path (e.g. `content`, `ai.toxicity.score`).
    pub field: String,

    /// Literal the resolved value is compared against.
    #[serde(default)]
    pub value: Value,

    /// Contribution to confidence. `None` means an equal share (1/N).
    /// A weight of 1 or more marks the condition as critical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            kind: ConditionKind::default(),
            operator,
            field: field.into(),
            value,
            weight: None,
            negate: false,
        }
    }

    pub fn of_kind(mut self, kind: ConditionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Decide this condition against a resolved value.
    pub fn evaluate(&self, resolved: &Resolved) -> Result<bool, PolicyError> {
        let Resolved::Value(value) = resolved else {
            return Ok(false);
        };
        let outcome = self.operator.apply(&self.value, value)?;
        Ok(outcome != self.negate)
    }
}

/// Strict equality, except that numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric coercion: numbers as-is, strings by float parse, everything else fails.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn range_bounds(literal: &Value) -> Option<(f64, f64)> {
    match literal {
        Value::Object(map) => Some((as_number(map.get("min")?)?, as_number(map.get("max")?)?)),
        Value::Array(items) if items.len() == 2 => {
            Some((as_number(&items[0])?, as_number(&items[1])?))
        }
        _ => None,
    }
}
