// dispatcher.rs — Per-action gating, delay, and effect submission.
//
// Actions run in declared order. Each one is isolated: a failed gate skips
// only that action, a failed submission leaves it out of `executed`, and the
// remaining actions still run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use automod_policy::{Action, ActionKind, ActionType, ModerationContext};

use crate::config::DispatchConfig;
use crate::effect::{Effect, EffectChannel, EffectRecord};
use crate::error::DispatchError;
use crate::resolver::{ContextResolver, EvaluationScope};

/// What happened to a policy's actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Accepted by the effect channel, in declared order.
    pub executed: Vec<ActionType>,
    /// Gated out by their own sub-conditions.
    pub skipped: Vec<ActionType>,
    pub errors: Vec<String>,
}

impl DispatchReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct ActionDispatcher {
    config: DispatchConfig,
    resolver: Arc<ContextResolver>,
    effects: Arc<dyn EffectChannel>,
}

impl ActionDispatcher {
    pub fn new(
        config: DispatchConfig,
        resolver: Arc<ContextResolver>,
        effects: Arc<dyn EffectChannel>,
    ) -> Self {
        Self {
            config,
            resolver,
            effects,
        }
    }

    /// Dispatch a matched policy's actions.
    pub async fn dispatch(
        &self,
        policy_id: &str,
        scope: &EvaluationScope<'_>,
        actions: &[Action],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let ctx = scope.context();

        for action in actions {
            let action_type = action.action_type();

            if !action.conditions.is_empty() {
                match self.resolver.evaluate_all(scope, &action.conditions).await {
                    Ok(results) if results.iter().all(|r| *r) => {}
                    Ok(_) => {
                        tracing::debug!(policy_id = %policy_id, action = %action_type, "action gated out");
                        report.skipped.push(action_type);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(policy_id = %policy_id, action = %action_type, error = %e, "action gate failed");
                        report.errors.push(format!("{}: {}", action_type, e));
                        report.skipped.push(action_type);
                        continue;
                    }
                }
            }

            if let Some(delay_ms) = action.delay_ms.filter(|d| *d > 0) {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.submit(policy_id, ctx, &action.kind).await {
                Ok(effect_id) => {
                    tracing::info!(
                        policy_id = %policy_id,
                        user_id = %ctx.user_id,
                        action = %action_type,
                        effect_id = %effect_id,
                        "effect submitted"
                    );
                    report.executed.push(action_type);
                }
                Err(e) => {
                    tracing::warn!(policy_id = %policy_id, action = %action_type, error = %e, "effect dispatch failed");
                    report.errors.push(format!("{}: {}", action_type, e));
                }
            }
        }

        report
    }

    async fn submit(
        &self,
        policy_id: &str,
        ctx: &ModerationContext,
        kind: &ActionKind,
    ) -> Result<Uuid, DispatchError> {
        let effect = self.resolve_effect(policy_id, ctx, kind)?;
        let record = EffectRecord {
            effect_id: Uuid::new_v4(),
            policy_id: policy_id.to_string(),
            user_id: ctx.user_id.clone(),
            server_id: ctx.server_id.clone(),
            channel_id: ctx.channel_id.clone(),
            message_id: ctx.message_id.clone(),
            issued_at: Utc::now(),
            effect,
        };
        let effect_id = record.effect_id;
        self.effects.submit(record).await?;
        Ok(effect_id)
    }

    /// Fill in parameter defaults and event identifiers.
    fn resolve_effect(
        &self,
        policy_id: &str,
        ctx: &ModerationContext,
        kind: &ActionKind,
    ) -> Result<Effect, DispatchError> {
        let reason = |r: &Option<String>| r.clone().unwrap_or_else(|| self.config.default_reason.clone());

        Ok(match kind {
            ActionKind::DeleteMessage { reason: r } => Effect::DeleteMessage {
                message_id: ctx.message_id.clone().ok_or(DispatchError::MissingTarget {
                    action: ActionType::DeleteMessage,
                    target: "message id",
                })?,
                reason: reason(r),
            },
            ActionKind::WarnUser { message } => Effect::WarnUser {
                message: message
                    .clone()
                    .unwrap_or_else(|| self.config.default_warning.clone()),
            },
            ActionKind::TimeoutUser { duration_secs, reason: r } => Effect::TimeoutUser {
                duration_secs: duration_secs.unwrap_or(self.config.default_timeout_secs),
                reason: reason(r),
            },
            ActionKind::KickUser { reason: r } => Effect::KickUser { reason: reason(r) },
            ActionKind::BanUser {
                reason: r,
                delete_message_days,
            } => Effect::BanUser {
                reason: reason(r),
                delete_message_days: *delete_message_days,
            },
            ActionKind::AddRole { role_id } => Effect::AddRole {
                role_id: role_id.clone(),
            },
            ActionKind::RemoveRole { role_id } => Effect::RemoveRole {
                role_id: role_id.clone(),
            },
            ActionKind::Quarantine { duration_secs, reason: r } => Effect::Quarantine {
                duration_secs: duration_secs.unwrap_or(self.config.default_quarantine_secs),
                reason: reason(r),
            },
            ActionKind::Flag { reason: r } => Effect::Flag { reason: reason(r) },
            ActionKind::NotifyModerators { channel_id, message } => Effect::NotifyModerators {
                channel_id: channel_id.clone(),
                message: message.clone().unwrap_or_else(|| {
                    format!("Policy {} triggered for user {}", policy_id, ctx.user_id)
                }),
            },
            ActionKind::SendDm { message } => Effect::SendDm {
                message: message.clone(),
            },
            ActionKind::LogEvent { message } => Effect::LogEvent {
                message: message
                    .clone()
                    .unwrap_or_else(|| format!("Policy {} matched", policy_id)),
            },
            ActionKind::CustomWebhook { url, payload } => Effect::CustomWebhook {
                url: url.clone(),
                payload: payload.clone().unwrap_or_else(|| {
                    json!({
                        "policy_id": policy_id,
                        "user_id": ctx.user_id,
                        "server_id": ctx.server_id,
                        "channel_id": ctx.channel_id,
                        "message_id": ctx.message_id,
                    })
                }),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::NoAnalyzer;
    use crate::data::InMemoryDataAccess;
    use crate::effect::QueueEffectChannel;
    use async_trait::async_trait;
    use automod_policy::{Condition, Operator};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Rejects one action type, records everything else.
    #[derive(Default)]
    struct PickyChannel {
        reject: Option<ActionType>,
        accepted: Mutex<Vec<EffectRecord>>,
    }

    #[async_trait]
    impl EffectChannel for PickyChannel {
        async fn submit(&self, record: EffectRecord) -> Result<(), DispatchError> {
            if Some(record.effect.action_type()) == self.reject {
                return Err(DispatchError::Rejected("transport down".to_string()));
            }
            self.accepted.lock().unwrap().push(record);
            Ok(())
        }
    }

    fn dispatcher(effects: Arc<dyn EffectChannel>) -> ActionDispatcher {
        let resolver = Arc::new(ContextResolver::new(
            Arc::new(NoAnalyzer),
            Arc::new(InMemoryDataAccess::new()),
        ));
        ActionDispatcher::new(DispatchConfig::default(), resolver, effects)
    }

    fn ctx() -> ModerationContext {
        ModerationContext::new("u1", "buy cheap stuff")
            .with_message("m1")
            .with_server("s1")
    }

    #[tokio::test]
    async fn defaults_fill_missing_parameters() {
        let (channel, mut rx) = QueueEffectChannel::new(8);
        let d = dispatcher(Arc::new(channel));
        let ctx = ctx();
        let scope = EvaluationScope::new(&ctx);
        let actions = vec![
            Action::new(ActionKind::DeleteMessage { reason: None }),
            Action::new(ActionKind::TimeoutUser {
                duration_secs: None,
                reason: None,
            }),
        ];
        let report = d.dispatch("p1", &scope, &actions).await;
        assert_eq!(report.executed, vec![ActionType::DeleteMessage, ActionType::TimeoutUser]);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first.effect,
            Effect::DeleteMessage {
                message_id: "m1".to_string(),
                reason: "Auto-moderation rule triggered".to_string(),
            }
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.effect,
            Effect::TimeoutUser {
                duration_secs: 600,
                reason: "Auto-moderation rule triggered".to_string(),
            }
        );
        assert_eq!(second.policy_id, "p1");
        assert_eq!(second.server_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn failed_submission_is_isolated() {
        let channel = Arc::new(PickyChannel {
            reject: Some(ActionType::WarnUser),
            ..PickyChannel::default()
        });
        let d = dispatcher(channel.clone());
        let ctx = ctx();
        let scope = EvaluationScope::new(&ctx);
        let actions = vec![
            Action::new(ActionKind::WarnUser { message: None }),
            Action::new(ActionKind::Flag { reason: None }),
        ];
        let report = d.dispatch("p1", &scope, &actions).await;
        assert_eq!(report.executed, vec![ActionType::Flag]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(channel.accepted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_without_message_is_missing_target() {
        let channel = Arc::new(PickyChannel::default());
        let d = dispatcher(channel.clone());
        let ctx = ModerationContext::new("u1", "");
        let scope = EvaluationScope::new(&ctx);
        let report = d
            .dispatch("p1", &scope, &[Action::new(ActionKind::DeleteMessage { reason: None })])
            .await;
        assert!(report.executed.is_empty());
        assert!(report.errors[0].contains("message id"));
    }

    #[tokio::test]
    async fn gate_skips_only_its_action() {
        let channel = Arc::new(PickyChannel::default());
        let d = dispatcher(channel.clone());
        let ctx = ctx();
        let scope = EvaluationScope::new(&ctx);
        let actions = vec![
            Action::new(ActionKind::BanUser {
                reason: None,
                delete_message_days: 1,
            })
            .when(Condition::new("user.violations", Operator::GreaterThan, serde_json::json!(5))),
            Action::new(ActionKind::WarnUser { message: None }),
        ];
        let report = d.dispatch("p1", &scope, &actions).await;
        assert_eq!(report.executed, vec![ActionType::WarnUser]);
        assert_eq!(report.skipped, vec![ActionType::BanUser]);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn delay_is_applied_before_submission() {
        let channel = Arc::new(PickyChannel::default());
        let d = dispatcher(channel.clone());
        let ctx = ctx();
        let scope = EvaluationScope::new(&ctx);
        let started = Instant::now();
        let report = d
            .dispatch(
                "p1",
                &scope,
                &[Action::new(ActionKind::Flag { reason: None }).delayed(30)],
            )
            .await;
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(report.executed, vec![ActionType::Flag]);
    }

    #[tokio::test]
    async fn default_webhook_payload_carries_identifiers() {
        let channel = Arc::new(PickyChannel::default());
        let d = dispatcher(channel.clone());
        let ctx = ctx();
        let scope = EvaluationScope::new(&ctx);
        d.dispatch(
            "p1",
            &scope,
            &[Action::new(ActionKind::CustomWebhook {
                url: "https://hooks.example/mod".to_string(),
                payload: None,
            })],
        )
        .await;
        let accepted = channel.accepted.lock().unwrap();
        match &accepted[0].effect {
            Effect::CustomWebhook { payload, .. } => {
                assert_eq!(payload["message_id"], "m1");
                assert_eq!(payload["policy_id"], "p1");
            }
            other => panic!("expected webhook, got {:?}", other),
        }
    }
}
