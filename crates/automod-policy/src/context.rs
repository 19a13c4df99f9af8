// context.rs — ModerationContext: the per-event view that conditions read.
//
// A context is built by the host for every platform event and thrown away
// once the event has been judged. Plain (non-namespaced) condition fields are
// resolved by walking the serialized form of this struct, so the JSON field
// names here are part of the policy authoring surface:
//
//   content, user_id, message_id, channel_id, server_id, roles,
//   attachments.0.filename, metadata.<anything the host attached>

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Platform events that can trigger policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MemberJoin,
    MemberLeave,
    MemberUpdate,
    ReactionAdd,
    ReactionRemove,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageCreate => "message_create",
            EventType::MessageUpdate => "message_update",
            EventType::MessageDelete => "message_delete",
            EventType::MemberJoin => "member_join",
            EventType::MemberLeave => "member_leave",
            EventType::MemberUpdate => "member_update",
            EventType::ReactionAdd => "reaction_add",
            EventType::ReactionRemove => "reaction_remove",
        }
    }

    pub const ALL: [EventType; 8] = [
        EventType::MessageCreate,
        EventType::MessageUpdate,
        EventType::MessageDelete,
        EventType::MemberJoin,
        EventType::MemberLeave,
        EventType::MemberUpdate,
        EventType::ReactionAdd,
        EventType::ReactionRemove,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Everything the engine knows about one moderation-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationContext {
    /// The acting user.
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// Raw message content (empty for non-message events).
    #[serde(default)]
    pub content: String,

    /// When the event happened. Time-range exemptions and violation
    /// windows are measured against this, not the wall clock.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Role ids held by the acting user.
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Free-form host data, reachable as `metadata.<key>`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ModerationContext {
    /// Create a context for a user action with the given content, stamped now.
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message_id: None,
            server_id: None,
            channel_id: None,
            content: content.into(),
            timestamp: Utc::now(),
            roles: Vec::new(),
            attachments: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Walk a plain field path over the serialized context.
    ///
    /// Numeric segments index arrays; a trailing `length` yields the char
    /// count of a string or the length of an array. Returns `None` as soon
    /// as any link in the path is missing.
    pub fn lookup(&self, segments: &[&str]) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        walk(&root, segments)
    }
}

fn walk(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    let next = match value {
        Value::Object(map) => map.get(*head),
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => items.get(index),
            Err(_) if *head == "length" && rest.is_empty() => {
                return Some(Value::from(items.len()));
            }
            Err(_) => None,
        },
        Value::String(s) if *head == "length" && rest.is_empty() => {
            return Some(Value::from(s.chars().count()));
        }
        _ => None,
    }?;

    walk(next, rest)
}
