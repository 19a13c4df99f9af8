// action.rs — Enforcement actions a policy can request.
//
// Each action kind carries only the parameters it needs. Dispatch matches
// on `ActionKind` exhaustively, so a new kind does not compile until every
// dispatcher handles it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;

/// The fixed set of action types, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DeleteMessage,
    WarnUser,
    TimeoutUser,
    KickUser,
    BanUser,
    AddRole,
    RemoveRole,
    Quarantine,
    Flag,
    NotifyModerators,
    SendDm,
    LogEvent,
    CustomWebhook,
}

impl ActionType {
    /// Blocking actions stop lower-priority policies from running for the event.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ActionType::DeleteMessage | ActionType::BanUser | ActionType::KickUser
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::DeleteMessage => "delete_message",
            ActionType::WarnUser => "warn_user",
            ActionType::TimeoutUser => "timeout_user",
            ActionType::KickUser => "kick_user",
            ActionType::BanUser => "ban_user",
            ActionType::AddRole => "add_role",
            ActionType::RemoveRole => "remove_role",
            ActionType::Quarantine => "quarantine",
            ActionType::Flag => "flag",
            ActionType::NotifyModerators => "notify_moderators",
            ActionType::SendDm => "send_dm",
            ActionType::LogEvent => "log_event",
            ActionType::CustomWebhook => "custom_webhook",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action with its type-specific parameters.
///
/// Serialized with a `type` tag: `{"type": "timeout_user", "duration_secs": 300}`.
/// Optional parameters fall back to dispatcher defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    DeleteMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    WarnUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TimeoutUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    KickUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    BanUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Days of message history to purge alongside the ban.
        #[serde(default)]
        delete_message_days: u8,
    },
    AddRole {
        role_id: String,
    },
    RemoveRole {
        role_id: String,
    },
    Quarantine {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Flag {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    NotifyModerators {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SendDm {
        message: String,
    },
    LogEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    CustomWebhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::DeleteMessage { .. } => ActionType::DeleteMessage,
            ActionKind::WarnUser { .. } => ActionType::WarnUser,
            ActionKind::TimeoutUser { .. } => ActionType::TimeoutUser,
            ActionKind::KickUser { .. } => ActionType::KickUser,
            ActionKind::BanUser { .. } => ActionType::BanUser,
            ActionKind::AddRole { .. } => ActionType::AddRole,
            ActionKind::RemoveRole { .. } => ActionType::RemoveRole,
            ActionKind::Quarantine { .. } => ActionType::Quarantine,
            ActionKind::Flag { .. } => ActionType::Flag,
            ActionKind::NotifyModerators { .. } => ActionType::NotifyModerators,
            ActionKind::SendDm { .. } => ActionType::SendDm,
            ActionKind::LogEvent { .. } => ActionType::LogEvent,
            ActionKind::CustomWebhook { .. } => ActionType::CustomWebhook,
        }
    }
}

/// A policy action: what to do, when to skip it, and how long to wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,

    /// Gating sub-conditions. All must hold or only this action is skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Wait this long before dispatching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            conditions: Vec::new(),
            delay_ms: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Action::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blocking_set_is_delete_ban_kick() {
        let blocking: Vec<_> = [
            ActionType::DeleteMessage,
            ActionType::WarnUser,
            ActionType::TimeoutUser,
            ActionType::KickUser,
            ActionType::BanUser,
            ActionType::Flag,
        ]
        .into_iter()
        .filter(ActionType::is_blocking)
        .collect();
        assert_eq!(
            blocking,
            vec![
                ActionType::DeleteMessage,
                ActionType::KickUser,
                ActionType::BanUser
            ]
        );
    }

    #[test]
    fn action_parses_flattened_tag_and_gates() {
        let action: Action = serde_json::from_value(json!({
            "type": "timeout_user",
            "duration_secs": 300,
            "delay_ms": 50,
            "conditions": [
                {"operator": "greater_than", "field": "user.violations", "value": 2}
            ]
        }))
        .unwrap();
        assert_eq!(action.action_type(), ActionType::TimeoutUser);
        assert_eq!(action.delay_ms, Some(50));
        assert_eq!(action.conditions.len(), 1);
        match action.kind {
            ActionKind::TimeoutUser { duration_secs, .. } => assert_eq!(duration_secs, Some(300)),
            other => panic!("expected TimeoutUser, got {:?}", other),
        }
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let parsed: Result<Action, _> = serde_json::from_value(json!({"type": "smite_user"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let parsed: Result<Action, _> = serde_json::from_value(json!({"type": "add_role"}));
        assert!(parsed.is_err());
    }
}
