// result.rs — Per-policy execution results.

use serde::{Deserialize, Serialize};

use automod_policy::ActionType;

use crate::escalation::Severity;

/// Terminal state of one policy evaluation.
///
/// ```text
/// Pending → ExemptionChecked ─ exempt ─→ Skipped
///                            └ clear ──→ ConditionsEvaluated ─→ NotMatched
///                                                            └→ ActionsExecuting ─→ Completed | Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Skipped,
    NotMatched,
    Completed,
    Errored,
}

/// Outcome of evaluating one policy against one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub policy_id: String,
    pub policy_name: String,
    pub priority: u8,
    pub status: ExecutionStatus,
    pub matched: bool,
    /// One boolean per condition, in declared order.
    pub condition_results: Vec<bool>,
    pub confidence: f64,
    /// Actions whose effects were accepted by the effect channel.
    pub actions_executed: Vec<ActionType>,
    /// Escalation tier, for policies that escalate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn dispatched_blocking_action(&self) -> bool {
        self.actions_executed.iter().any(ActionType::is_blocking)
    }
}
