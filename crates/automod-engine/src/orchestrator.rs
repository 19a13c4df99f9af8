// orchestrator.rs — Event entry point.
//
// Selects the policies that apply to an event, orders them by priority, and
// evaluates them one at a time. Evaluation is strictly sequential within an
// event; separate events may run concurrently on their own tasks.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use automod_policy::{
    aggregate, Action, ConditionOutcome, EventType, ExecutionOutcome, ModerationContext, Policy,
    PolicyError, PolicyStore,
};

use crate::analyzer::ContentAnalyzer;
use crate::audit::{audit_record, AuditSink};
use crate::config::EngineConfig;
use crate::data::DataAccess;
use crate::dispatcher::ActionDispatcher;
use crate::effect::EffectChannel;
use crate::error::EngineError;
use crate::escalation::{EscalationTracker, Judgment};
use crate::exemption::ExemptionFilter;
use crate::resolver::{ContextResolver, EvaluationScope};
use crate::result::{ExecutionResult, ExecutionStatus};

/// External collaborators the engine is wired to.
pub struct Collaborators {
    pub analyzer: Arc<dyn ContentAnalyzer>,
    pub data: Arc<dyn DataAccess>,
    pub effects: Arc<dyn EffectChannel>,
    /// No sink disables auditing.
    pub audit: Option<Arc<dyn AuditSink>>,
}

pub struct Orchestrator {
    store: Arc<PolicyStore>,
    tracker: Arc<EscalationTracker>,
    resolver: Arc<ContextResolver>,
    exemptions: ExemptionFilter,
    dispatcher: ActionDispatcher,
    audit: Option<Arc<dyn AuditSink>>,
    match_threshold: f64,
}

impl Orchestrator {
    pub fn new(
        config: &EngineConfig,
        store: Arc<PolicyStore>,
        tracker: Arc<EscalationTracker>,
        collaborators: Collaborators,
    ) -> Self {
        let resolver = Arc::new(ContextResolver::new(collaborators.analyzer, collaborators.data));
        Self {
            store,
            tracker,
            exemptions: ExemptionFilter::new(Arc::clone(&resolver)),
            dispatcher: ActionDispatcher::new(
                config.dispatch.clone(),
                Arc::clone(&resolver),
                collaborators.effects,
            ),
            resolver,
            audit: collaborators.audit,
            match_threshold: config.match_threshold,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<EscalationTracker> {
        &self.tracker
    }

    /// Evaluate every applicable policy for one event.
    ///
    /// Results come back in evaluation order. Evaluation stops after the
    /// first policy that dispatches a blocking action. If the policy set
    /// cannot be read, nothing is evaluated and the list is empty.
    pub async fn process_event(
        &self,
        event: EventType,
        ctx: &ModerationContext,
    ) -> Vec<ExecutionResult> {
        let policies = match self.select(event, ctx) {
            Ok(policies) => policies,
            Err(e) => {
                tracing::error!(event = %event, user_id = %ctx.user_id, error = %e, "policy selection failed");
                return Vec::new();
            }
        };

        let scope = EvaluationScope::new(ctx);
        let mut results = Vec::with_capacity(policies.len());

        for policy in &policies {
            let result = self.evaluate_policy(policy, &scope).await;

            if result.status != ExecutionStatus::Skipped {
                self.record_counters(&result);
                self.spawn_audit(&result, ctx);
            }

            let halt = result.dispatched_blocking_action();
            results.push(result);
            if halt {
                tracing::info!(
                    policy_id = %policy.id,
                    user_id = %ctx.user_id,
                    "blocking action dispatched, skipping lower-priority policies"
                );
                break;
            }
        }

        results
    }

    /// Applicable policies, highest priority first. Ties keep id order.
    fn select(&self, event: EventType, ctx: &ModerationContext) -> Result<Vec<Policy>, PolicyError> {
        let mut policies: Vec<Policy> = self
            .store
            .list(ctx.server_id.as_deref())?
            .into_iter()
            .filter(|p| p.applies_to(event, ctx))
            .collect();
        policies.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(policies)
    }

    async fn evaluate_policy(&self, policy: &Policy, scope: &EvaluationScope<'_>) -> ExecutionResult {
        let started = Instant::now();
        let mut result = ExecutionResult {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            priority: policy.priority,
            status: ExecutionStatus::NotMatched,
            matched: false,
            condition_results: Vec::new(),
            confidence: 0.0,
            actions_executed: Vec::new(),
            severity: None,
            errors: Vec::new(),
            elapsed_ms: 0,
        };

        if let Err(e) = self.run_policy(policy, scope, &mut result).await {
            tracing::warn!(policy_id = %policy.id, error = %e, "policy evaluation failed");
            result.status = ExecutionStatus::Errored;
            result.errors.push(e.to_string());
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run_policy(
        &self,
        policy: &Policy,
        scope: &EvaluationScope<'_>,
        result: &mut ExecutionResult,
    ) -> Result<(), EngineError> {
        let ctx = scope.context();

        if let Some(exemption) = self.exemptions.first_match(scope, &policy.exemptions).await? {
            tracing::debug!(policy_id = %policy.id, user_id = %ctx.user_id, exemption = ?exemption, "policy exempt");
            result.status = ExecutionStatus::Skipped;
            return Ok(());
        }

        let passed = self.resolver.evaluate_all(scope, &policy.conditions).await?;
        let outcomes: Vec<ConditionOutcome> = policy
            .conditions
            .iter()
            .zip(&passed)
            .map(|(condition, passed)| ConditionOutcome {
                passed: *passed,
                weight: condition.weight,
            })
            .collect();
        let decision = aggregate(&outcomes, self.match_threshold);

        result.condition_results = passed;
        result.confidence = decision.confidence;
        result.matched = decision.matched;

        if !decision.matched {
            return Ok(());
        }

        tracing::info!(
            policy_id = %policy.id,
            user_id = %ctx.user_id,
            confidence = decision.confidence,
            "policy matched"
        );

        let escalated: Vec<Action>;
        let actions: &[Action] = if policy.escalate {
            match self.escalate(scope).await {
                Ok(Some(judgment)) => {
                    result.severity = Some(judgment.severity);
                    escalated = judgment.actions.into_iter().map(Action::from).collect();
                    &escalated
                }
                Ok(None) => &policy.actions,
                Err(e) => {
                    result.errors.push(e);
                    &policy.actions
                }
            }
        } else {
            &policy.actions
        };

        let report = self.dispatcher.dispatch(&policy.id, scope, actions).await;
        result.actions_executed = report.executed;
        result.errors.extend(report.errors);
        result.status = if result.errors.is_empty() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Errored
        };
        Ok(())
    }

    /// Judge the event's content. `None` when no analysis is available.
    ///
    /// The first escalating policy to match records the violation; later
    /// ones in the same event reuse its judgment.
    async fn escalate(&self, scope: &EvaluationScope<'_>) -> Result<Option<Judgment>, String> {
        scope
            .judgment
            .get_or_init(|| async move {
                let Some(analysis) = self.resolver.analysis(scope).await else {
                    return Ok(None);
                };
                let ctx = scope.context();
                self.tracker
                    .judge(&ctx.user_id, &analysis, ctx.timestamp)
                    .map(Some)
                    .map_err(|e| e.to_string())
            })
            .await
            .clone()
    }

    fn record_counters(&self, result: &ExecutionResult) {
        let outcome = match result.status {
            ExecutionStatus::Errored => ExecutionOutcome::Failed,
            _ if result.matched => ExecutionOutcome::Matched,
            _ => ExecutionOutcome::NotMatched,
        };
        if let Err(e) = self.store.record_execution(&result.policy_id, outcome, Utc::now()) {
            tracing::warn!(policy_id = %result.policy_id, error = %e, "failed to record execution");
        }
    }

    fn spawn_audit(&self, result: &ExecutionResult, ctx: &ModerationContext) {
        let Some(sink) = &self.audit else {
            return;
        };
        let sink = Arc::clone(sink);
        let record = audit_record(result, &ctx.user_id, ctx.server_id.as_deref());
        tokio::spawn(async move {
            if let Err(e) = sink.record(record).await {
                tracing::warn!(error = %e, "audit write failed");
            }
        });
    }
}
