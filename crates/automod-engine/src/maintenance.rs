// maintenance.rs — Background ledger pruning and scheduled-policy sweep.
//
// Both tasks run on fixed intervals on the tokio runtime and stop when
// `shutdown` is called or the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use automod_policy::{PolicyError, PolicyStore};

use crate::config::EngineConfig;
use crate::escalation::EscalationTracker;

pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawn the prune and sweep loops. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<PolicyStore>,
        tracker: Arc<EscalationTracker>,
        config: &EngineConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let mut maintenance = Self {
            shutdown_tx,
            handles: Vec::new(),
        };

        let prune_every = Duration::from_secs(config.escalation.prune_interval_secs.max(1));
        maintenance.spawn_interval(prune_every, move || match tracker.prune(Utc::now()) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "pruned expired violations"),
            Err(e) => tracing::warn!(error = %e, "violation prune failed"),
        });

        let sweep_every = Duration::from_secs(config.scheduler.sweep_interval_secs.max(1));
        maintenance.spawn_interval(sweep_every, move || {
            if let Err(e) = sweep_scheduled(&store, Utc::now()) {
                tracing::warn!(error = %e, "scheduled sweep failed");
            }
        });

        maintenance
    }

    fn spawn_interval<F>(&mut self, every: Duration, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => tick(),
                }
            }
        }));
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Select scheduled policies that are due and stamp their run time.
///
/// Executing them is left to the host; this only tracks the cadence.
/// Returns the ids that were due.
pub fn sweep_scheduled(store: &PolicyStore, now: DateTime<Utc>) -> Result<Vec<String>, PolicyError> {
    let mut due = Vec::new();
    for policy in store.scheduled()? {
        let is_due = policy.schedule.as_ref().map_or(true, |s| s.is_due(now));
        if is_due {
            store.mark_scheduled_run(&policy.id, now)?;
            due.push(policy.id);
        }
    }
    if !due.is_empty() {
        tracing::info!(count = due.len(), policies = ?due, "scheduled policies due");
    }
    Ok(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisResult, Toxicity};
    use automod_policy::{Policy, Schedule, Trigger};
    use std::collections::BTreeMap;

    fn scheduled(id: &str, interval_secs: u64) -> Policy {
        let mut policy = Policy::new(id, id).on(Trigger::Scheduled);
        policy.schedule = Some(Schedule {
            interval_secs,
            last_run_at: None,
        });
        policy
    }

    #[test]
    fn sweep_marks_due_policies_only() {
        let store = PolicyStore::with_policies([scheduled("hourly", 3600), scheduled("minutely", 60)]).unwrap();
        let now = Utc::now();
        assert_eq!(sweep_scheduled(&store, now).unwrap().len(), 2);

        let later = now + chrono::Duration::seconds(120);
        assert_eq!(sweep_scheduled(&store, later).unwrap(), vec!["minutely".to_string()]);
    }

    #[tokio::test]
    async fn prune_loop_runs_and_stops() {
        let mut config = EngineConfig::default();
        config.escalation.prune_interval_secs = 1;
        let tracker = Arc::new(EscalationTracker::new(config.escalation.clone()));
        let analysis = AnalysisResult {
            toxicity: Toxicity {
                flagged: true,
                category_scores: BTreeMap::from([("harassment".to_string(), 0.9)]),
            },
            ..AnalysisResult::default()
        };
        tracker
            .judge("u1", &analysis, Utc::now() - chrono::Duration::days(40))
            .unwrap();

        let maintenance = Maintenance::start(Arc::new(PolicyStore::new()), tracker.clone(), &config);
        // The first interval tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.ledger().users(), 0);
        maintenance.shutdown();
    }
}
