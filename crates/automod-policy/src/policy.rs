// policy.rs — Policy: a prioritized bundle of triggers, exemptions,
// conditions, and actions.
//
// Policies are authored elsewhere and loaded into the PolicyStore. The
// engine reads them; the only field it writes back is `stats`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::condition::Condition;
use crate::context::{EventType, ModerationContext};
use crate::error::PolicyError;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// What makes a policy eligible for evaluation.
///
/// Serialized as a plain string: an event type name or `"scheduled"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Trigger {
    Event(EventType),
    Scheduled,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Event(event) => write!(f, "{}", event),
            Trigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "scheduled" {
            return Ok(Trigger::Scheduled);
        }
        s.parse::<EventType>().map(Trigger::Event)
    }
}

impl TryFrom<String> for Trigger {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Trigger> for String {
    fn from(trigger: Trigger) -> Self {
        trigger.to_string()
    }
}

/// A bypass that disables the owning policy for matching events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Exemption {
    User { user_ids: Vec<String> },
    Role { role_ids: Vec<String> },
    Channel { channel_ids: Vec<String> },
    /// Inclusive on both ends.
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Exempt when every nested condition holds. An empty set never exempts.
    ConditionSet { conditions: Vec<Condition> },
}

/// Cadence for policies with the `scheduled` trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => (now - last).num_seconds() >= self.interval_secs as i64,
        }
    }
}

/// Execution counters maintained by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub executions: u64,
    pub matches: u64,
    pub failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// A moderation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// `None` applies the policy to every server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// `None` applies the policy to every channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_ids: Option<Vec<String>>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 1–10, higher runs first.
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub triggers: Vec<Trigger>,

    #[serde(default)]
    pub exemptions: Vec<Exemption>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub actions: Vec<Action>,

    /// Replace `actions` with the escalation tracker's choice on a match.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub escalate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,

    #[serde(default)]
    pub stats: PolicyStats,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u8 {
    5
}

impl Policy {
    /// Create an enabled, global policy with default priority and no rules.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            server_id: None,
            channel_ids: None,
            enabled: true,
            priority: default_priority(),
            triggers: Vec::new(),
            exemptions: Vec::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
            escalate: false,
            schedule: None,
            stats: PolicyStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn for_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn in_channels<I, S>(mut self, channel_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_ids = Some(channel_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn on(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn then(mut self, action: impl Into<Action>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn exempt(mut self, exemption: Exemption) -> Self {
        self.exemptions.push(exemption);
        self
    }

    pub fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }

    /// Whether this policy should be evaluated for an event.
    ///
    /// A policy applies when it is enabled, one of its triggers is the event
    /// type or `scheduled`, its server scope (if any) matches, and its channel
    /// allowlist (if any) contains the event's channel.
    pub fn applies_to(&self, event: EventType, ctx: &ModerationContext) -> bool {
        if !self.enabled {
            return false;
        }

        let triggered = self
            .triggers
            .iter()
            .any(|t| *t == Trigger::Event(event) || *t == Trigger::Scheduled);
        if !triggered {
            return false;
        }

        if let Some(server_id) = &self.server_id {
            if ctx.server_id.as_ref() != Some(server_id) {
                return false;
            }
        }

        if let Some(channels) = &self.channel_ids {
            match &ctx.channel_id {
                Some(channel) if channels.contains(channel) => {}
                _ => return false,
            }
        }

        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.triggers.contains(&Trigger::Scheduled)
    }

    /// Reject policies the engine cannot evaluate sensibly.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::InvalidPolicy {
            policy_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(invalid(format!(
                "priority {} outside {}..={}",
                self.priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }

        let nested = self
            .actions
            .iter()
            .flat_map(|a| a.conditions.iter())
            .chain(self.exemptions.iter().flat_map(|e| match e {
                Exemption::ConditionSet { conditions } => conditions.as_slice(),
                _ => &[][..],
            }));
        for condition in self.conditions.iter().chain(nested) {
            if let Some(weight) = condition.weight {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(invalid(format!(
                        "condition on '{}' has invalid weight {}",
                        condition.field, weight
                    )));
                }
            }
        }

        for exemption in &self.exemptions {
            if let Exemption::TimeRange { start, end } = exemption {
                if start > end {
                    return Err(invalid("time range exemption ends before it starts".to_string()));
                }
            }
        }

        Ok(())
    }
}
