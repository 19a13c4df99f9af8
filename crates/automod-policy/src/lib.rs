//! # automod-policy
//!
//! Policy model and the pure half of the moderation rule engine.
//!
//! A [`Policy`] bundles triggers, exemptions, weighted [`Condition`]s and
//! enforcement [`Action`]s. This crate decides, for already-resolved field
//! values, whether conditions hold and whether a policy matches; the async
//! engine crate supplies the values and carries out the actions.
//!
//! ## Key invariants
//!
//! - **Critical veto**: a condition with weight ≥ 1 that evaluates false
//!   blocks the match no matter how high the aggregate confidence is.
//! - **Empty never matches**: zero conditions give confidence 0.
//! - **Unresolved is not false**: a missing field or failed collaborator
//!   yields [`Resolved::Unresolved`], which satisfies no condition.

pub mod action;
pub mod condition;
pub mod confidence;
pub mod context;
pub mod error;
pub mod loader;
pub mod policy;
pub mod store;

pub use action::{Action, ActionKind, ActionType};
pub use condition::{Condition, ConditionKind, Operator, Resolved};
pub use confidence::{aggregate, Confidence, ConditionOutcome, DEFAULT_MATCH_THRESHOLD};
pub use context::{Attachment, EventType, ModerationContext};
pub use error::PolicyError;
pub use loader::load_policies;
pub use policy::{Exemption, Policy, PolicyStats, Schedule, Trigger};
pub use store::{ExecutionOutcome, PolicyStore, StoreStats};
