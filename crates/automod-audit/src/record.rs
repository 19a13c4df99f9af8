// record.rs — Audit record data model.
//
// One record per evaluated policy per event. Records are written after the
// fact and never updated; `previous_hash` is filled in by the log at append
// time to link each line to the one before it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single audit record — one line in a server's JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub record_id: Uuid,

    pub timestamp: DateTime<Utc>,

    /// Server the event belonged to. `None` goes to the global log.
    pub server_id: Option<String>,

    pub policy_id: String,

    pub policy_name: String,

    /// The user whose event was judged.
    pub user_id: String,

    pub matched: bool,

    pub confidence: f64,

    /// Wire names of the actions that were actually dispatched.
    #[serde(default)]
    pub actions_executed: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    pub elapsed_ms: u64,

    /// Hash of the previous line in the same log. `None` for the first line.
    #[serde(default)]
    pub previous_hash: Option<String>,
}

impl AuditRecord {
    pub fn new(policy_id: impl Into<String>, policy_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            server_id: None,
            policy_id: policy_id.into(),
            policy_name: policy_name.into(),
            user_id: user_id.into(),
            matched: false,
            confidence: 0.0,
            actions_executed: Vec::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
            previous_hash: None,
        }
    }

    pub fn with_server(mut self, server_id: Option<String>) -> Self {
        self.server_id = server_id;
        self
    }

    pub fn with_outcome(mut self, matched: bool, confidence: f64) -> Self {
        self.matched = matched;
        self.confidence = confidence;
        self
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions_executed = actions;
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_omitted_when_empty() {
        let record = AuditRecord::new("p1", "Spam", "u1");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"errors\""));
        assert!(json.contains("\"policy_id\":\"p1\""));
    }

    #[test]
    fn builder_sets_outcome() {
        let record = AuditRecord::new("p1", "Spam", "u1")
            .with_server(Some("s1".to_string()))
            .with_outcome(true, 0.9)
            .with_actions(vec!["delete_message".to_string()])
            .with_elapsed_ms(12);
        assert!(record.matched);
        assert_eq!(record.server_id.as_deref(), Some("s1"));
        assert_eq!(record.actions_executed, vec!["delete_message"]);
        assert_eq!(record.elapsed_ms, 12);
    }
}
