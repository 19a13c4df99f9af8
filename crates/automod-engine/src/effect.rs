// effect.rs — Effect records and the outbound effect channel.
//
// An effect is one side-effecting action with every parameter resolved.
// The engine only waits for the channel to accept a record; applying it to
// the platform (and retrying) is the transport's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use automod_policy::ActionType;

use crate::error::DispatchError;

/// A fully-resolved enforcement action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    DeleteMessage { message_id: String, reason: String },
    WarnUser { message: String },
    TimeoutUser { duration_secs: u64, reason: String },
    KickUser { reason: String },
    BanUser { reason: String, delete_message_days: u8 },
    AddRole { role_id: String },
    RemoveRole { role_id: String },
    Quarantine { duration_secs: u64, reason: String },
    Flag { reason: String },
    NotifyModerators { channel_id: Option<String>, message: String },
    SendDm { message: String },
    LogEvent { message: String },
    CustomWebhook { url: String, payload: Value },
}

impl Effect {
    pub fn action_type(&self) -> ActionType {
        match self {
            Effect::DeleteMessage { .. } => ActionType::DeleteMessage,
            Effect::WarnUser { .. } => ActionType::WarnUser,
            Effect::TimeoutUser { .. } => ActionType::TimeoutUser,
            Effect::KickUser { .. } => ActionType::KickUser,
            Effect::BanUser { .. } => ActionType::BanUser,
            Effect::AddRole { .. } => ActionType::AddRole,
            Effect::RemoveRole { .. } => ActionType::RemoveRole,
            Effect::Quarantine { .. } => ActionType::Quarantine,
            Effect::Flag { .. } => ActionType::Flag,
            Effect::NotifyModerators { .. } => ActionType::NotifyModerators,
            Effect::SendDm { .. } => ActionType::SendDm,
            Effect::LogEvent { .. } => ActionType::LogEvent,
            Effect::CustomWebhook { .. } => ActionType::CustomWebhook,
        }
    }
}

/// An effect addressed to a user/server/channel, as submitted to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub effect_id: Uuid,
    pub policy_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub effect: Effect,
}

/// Where effect records are submitted.
///
/// `submit` returns once the record is accepted, not once it is applied.
#[async_trait]
pub trait EffectChannel: Send + Sync {
    async fn submit(&self, record: EffectRecord) -> Result<(), DispatchError>;
}

/// An effect channel backed by a tokio mpsc queue. The receiving half is
/// drained by whatever transport the host wires up.
#[derive(Debug, Clone)]
pub struct QueueEffectChannel {
    sender: mpsc::Sender<EffectRecord>,
}

impl QueueEffectChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EffectRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EffectChannel for QueueEffectChannel {
    async fn submit(&self, record: EffectRecord) -> Result<(), DispatchError> {
        self.sender
            .send(record)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}
