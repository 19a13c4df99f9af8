// store.rs — PolicyStore: keyed, concurrently shared policy collection.
//
// The store is read on every event and written by the administrative path
// and by the engine's execution counters. A single RwLock guards the map;
// every mutation touches exactly one key.
//
// There is no conflict detection between policies. Ordering is decided at
// evaluation time by priority.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::policy::Policy;

/// Aggregate numbers for the administrative stats query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_policies: usize,
    pub active_policies: usize,
    pub total_executions: u64,
    /// Non-failed executions over all executions; 1.0 when nothing ran yet.
    pub success_rate: f64,
    /// priority → number of policies at that priority.
    pub priority_histogram: BTreeMap<u8, usize>,
}

/// How one evaluation of a policy ended, for its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    NotMatched,
    Matched,
    Failed,
}

/// In-memory policy store.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a batch of policies, validating each.
    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Result<Self, PolicyError> {
        let store = Self::new();
        for policy in policies {
            store.upsert(policy)?;
        }
        Ok(store)
    }

    /// Insert or replace a policy, stamping its last-modified time.
    ///
    /// Returns the stored copy.
    pub fn upsert(&self, mut policy: Policy) -> Result<Policy, PolicyError> {
        policy.validate()?;
        policy.updated_at = Utc::now();

        let mut policies = self.policies.write().map_err(|_| PolicyError::LockPoisoned)?;
        tracing::debug!(policy_id = %policy.id, priority = policy.priority, "policy upserted");
        policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    /// Edit a stored policy in place and return the stored copy.
    ///
    /// The edit is applied to a copy and discarded if the result no longer
    /// validates. The id cannot be changed. Unknown ids give `None`.
    pub fn update(
        &self,
        policy_id: &str,
        edit: impl FnOnce(&mut Policy),
    ) -> Result<Option<Policy>, PolicyError> {
        let mut policies = self.policies.write().map_err(|_| PolicyError::LockPoisoned)?;
        let Some(current) = policies.get_mut(policy_id) else {
            return Ok(None);
        };
        let mut edited = current.clone();
        edit(&mut edited);
        edited.id = current.id.clone();
        edited.validate()?;
        edited.updated_at = Utc::now();
        *current = edited.clone();
        Ok(Some(edited))
    }

    /// Remove a policy. Returns whether it existed.
    pub fn remove(&self, policy_id: &str) -> Result<bool, PolicyError> {
        let mut policies = self.policies.write().map_err(|_| PolicyError::LockPoisoned)?;
        Ok(policies.remove(policy_id).is_some())
    }

    pub fn get(&self, policy_id: &str) -> Result<Option<Policy>, PolicyError> {
        let policies = self.policies.read().map_err(|_| PolicyError::LockPoisoned)?;
        Ok(policies.get(policy_id).cloned())
    }

    /// Global policies plus those scoped to `server_id`, ordered by id.
    ///
    /// With `server_id = None` only global policies are returned.
    pub fn list(&self, server_id: Option<&str>) -> Result<Vec<Policy>, PolicyError> {
        let policies = self.policies.read().map_err(|_| PolicyError::LockPoisoned)?;
        let mut selected: Vec<Policy> = policies
            .values()
            .filter(|p| match p.server_id.as_deref() {
                None => true,
                Some(scope) => server_id == Some(scope),
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selected)
    }

    /// Enabled policies carrying the `scheduled` trigger, across all servers.
    pub fn scheduled(&self) -> Result<Vec<Policy>, PolicyError> {
        let policies = self.policies.read().map_err(|_| PolicyError::LockPoisoned)?;
        let mut selected: Vec<Policy> = policies
            .values()
            .filter(|p| p.enabled && p.is_scheduled())
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selected)
    }

    /// Stamp the last scheduled run of a policy. Unknown ids are ignored.
    pub fn mark_scheduled_run(&self, policy_id: &str, at: DateTime<Utc>) -> Result<(), PolicyError> {
        let mut policies = self.policies.write().map_err(|_| PolicyError::LockPoisoned)?;
        if let Some(schedule) = policies.get_mut(policy_id).and_then(|p| p.schedule.as_mut()) {
            schedule.last_run_at = Some(at);
        }
        Ok(())
    }

    /// Bump a policy's execution counters. Unknown ids are ignored, since a
    /// policy may be removed while an event that selected it is in flight.
    pub fn record_execution(
        &self,
        policy_id: &str,
        outcome: ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        let mut policies = self.policies.write().map_err(|_| PolicyError::LockPoisoned)?;
        if let Some(policy) = policies.get_mut(policy_id) {
            let stats = &mut policy.stats;
            stats.executions += 1;
            match outcome {
                ExecutionOutcome::Matched => stats.matches += 1,
                ExecutionOutcome::Failed => stats.failures += 1,
                ExecutionOutcome::NotMatched => {}
            }
            stats.last_executed_at = Some(at);
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, PolicyError> {
        let policies = self.policies.read().map_err(|_| PolicyError::LockPoisoned)?;

        let mut priority_histogram = BTreeMap::new();
        let mut total_executions = 0;
        let mut total_failures = 0;
        for policy in policies.values() {
            *priority_histogram.entry(policy.priority).or_insert(0) += 1;
            total_executions += policy.stats.executions;
            total_failures += policy.stats.failures;
        }

        let success_rate = if total_executions == 0 {
            1.0
        } else {
            (total_executions - total_failures) as f64 / total_executions as f64
        };

        Ok(StoreStats {
            total_policies: policies.len(),
            active_policies: policies.values().filter(|p| p.enabled).count(),
            total_executions,
            success_rate,
            priority_histogram,
        })
    }

    pub fn len(&self) -> usize {
        self.policies.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
