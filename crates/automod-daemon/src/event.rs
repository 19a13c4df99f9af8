// event.rs — Inbound event lines and the aggregates they feed.

use serde::{Deserialize, Serialize};

use automod_engine::{ExecutionResult, InMemoryDataAccess};
use automod_policy::{EventType, ModerationContext};

/// One line of input: `{"event_type": "message_create", "context": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_type: EventType,
    pub context: ModerationContext,
}

impl InboundEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Update user/server aggregates from an observed event, before it is evaluated.
pub fn observe(data: &InMemoryDataAccess, event: &InboundEvent) {
    let ctx = &event.context;
    let server = ctx.server_id.as_deref();
    match event.event_type {
        EventType::MessageCreate => data.record_message(&ctx.user_id, server),
        EventType::MemberJoin => data.record_join(&ctx.user_id, server, ctx.timestamp),
        EventType::MemberLeave => {
            if let Some(server) = server {
                data.record_leave(server);
            }
        }
        _ => {}
    }
}

/// Count the event as a violation when any policy took action on it.
pub fn record_outcome(data: &InMemoryDataAccess, ctx: &ModerationContext, results: &[ExecutionResult]) {
    if results.iter().any(|r| r.matched && !r.actions_executed.is_empty()) {
        data.record_violation(&ctx.user_id, ctx.server_id.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automod_engine::{DataAccess, ExecutionStatus};
    use automod_policy::ActionType;

    #[test]
    fn parses_event_line() {
        let event = InboundEvent::parse(
            r#"{"event_type":"message_create","context":{"user_id":"u1","content":"hi","server_id":"s1"}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, EventType::MessageCreate);
        assert_eq!(event.context.server_id.as_deref(), Some("s1"));
    }

    #[test]
    fn rejects_unknown_event_type() {
        assert!(InboundEvent::parse(r#"{"event_type":"typing","context":{"user_id":"u1"}}"#).is_err());
    }

    #[tokio::test]
    async fn observed_events_feed_aggregates() {
        let data = InMemoryDataAccess::new();
        let join = InboundEvent {
            event_type: EventType::MemberJoin,
            context: ModerationContext::new("u1", "").with_server("s1"),
        };
        let msg = InboundEvent {
            event_type: EventType::MessageCreate,
            context: ModerationContext::new("u1", "hello").with_server("s1"),
        };
        observe(&data, &join);
        observe(&data, &msg);
        assert_eq!(data.server_member_count("s1").await.unwrap(), 1);
        assert_eq!(data.user_message_count("u1", Some("s1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn actioned_results_count_as_violations() {
        let data = InMemoryDataAccess::new();
        let ctx = ModerationContext::new("u1", "spam").with_server("s1");
        let result = ExecutionResult {
            policy_id: "p".to_string(),
            policy_name: "p".to_string(),
            priority: 5,
            status: ExecutionStatus::Completed,
            matched: true,
            condition_results: vec![true],
            confidence: 1.0,
            actions_executed: vec![ActionType::WarnUser],
            severity: None,
            errors: Vec::new(),
            elapsed_ms: 0,
        };
        record_outcome(&data, &ctx, &[result]);
        assert_eq!(data.user_violation_count("u1", Some("s1")).await.unwrap(), 1);
    }
}
