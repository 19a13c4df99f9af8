//! # automod-engine
//!
//! Async half of the moderation rule engine.
//!
//! The [`Orchestrator`] takes a platform event and its [`ModerationContext`],
//! picks the policies that apply, and evaluates them in priority order:
//!
//! 1. [`ExemptionFilter`] — skip the policy for exempt users/roles/channels.
//! 2. [`ContextResolver`] — resolve each condition's field path, calling the
//!    content analyzer at most once per event.
//! 3. [`automod_policy::aggregate`] — weighted confidence and critical veto.
//! 4. [`ActionDispatcher`] — gate, delay, and submit effects.
//!
//! A policy that dispatches a blocking action (delete, kick, ban) stops the
//! remaining lower-priority policies for that event. Policies marked
//! `escalate` have their actions chosen by the [`EscalationTracker`] from
//! the user's recent violation history.
//!
//! [`ModerationContext`]: automod_policy::ModerationContext

pub mod analyzer;
pub mod audit;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod effect;
pub mod error;
pub mod escalation;
pub mod exemption;
pub mod maintenance;
pub mod orchestrator;
pub mod resolver;
pub mod result;

pub use analyzer::{AnalysisResult, AnalyzeOptions, ContentAnalyzer, HttpContentAnalyzer, NoAnalyzer};
pub use audit::AuditSink;
pub use config::EngineConfig;
pub use data::{DataAccess, InMemoryDataAccess};
pub use dispatcher::{ActionDispatcher, DispatchReport};
pub use effect::{Effect, EffectChannel, EffectRecord, QueueEffectChannel};
pub use error::{CollaboratorError, ConfigError, DispatchError, EngineError};
pub use escalation::{EscalationRule, EscalationTracker, Judgment, Severity, ViolationLedger};
pub use exemption::ExemptionFilter;
pub use maintenance::Maintenance;
pub use orchestrator::{Collaborators, Orchestrator};
pub use resolver::{ContextResolver, EvaluationScope, FieldPath};
pub use result::{ExecutionResult, ExecutionStatus};
