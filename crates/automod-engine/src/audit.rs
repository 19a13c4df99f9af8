// audit.rs — Audit sink boundary.
//
// One record per evaluated policy. Writes are fire-and-forget from the
// orchestrator's point of view: failures are logged and never retried.

use async_trait::async_trait;

use automod_audit::{AuditError, AuditRecord, ServerAuditLogs};

use crate::result::{ExecutionResult, ExecutionStatus};

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// File appends and flushes block, so they run on the blocking pool.
#[async_trait]
impl AuditSink for ServerAuditLogs {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let logs = self.clone();
        tokio::task::spawn_blocking(move || logs.append(record))
            .await
            .map_err(|e| AuditError::WriteFailed(std::io::Error::other(e)))?
    }
}

/// Build the audit line for one policy outcome.
pub fn audit_record(
    result: &ExecutionResult,
    user_id: &str,
    server_id: Option<&str>,
) -> AuditRecord {
    let mut errors = result.errors.clone();
    if result.status == ExecutionStatus::Errored && errors.is_empty() {
        errors.push("evaluation errored".to_string());
    }
    AuditRecord::new(&result.policy_id, &result.policy_name, user_id)
        .with_server(server_id.map(str::to_string))
        .with_outcome(result.matched, result.confidence)
        .with_actions(
            result
                .actions_executed
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        )
        .with_errors(errors)
        .with_elapsed_ms(result.elapsed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use automod_audit::AuditLog;
    use automod_policy::ActionType;
    use tempfile::tempdir;

    fn completed() -> ExecutionResult {
        ExecutionResult {
            policy_id: "p1".to_string(),
            policy_name: "Spam".to_string(),
            priority: 9,
            status: ExecutionStatus::Completed,
            matched: true,
            condition_results: vec![true],
            confidence: 1.0,
            actions_executed: vec![ActionType::DeleteMessage, ActionType::WarnUser],
            severity: None,
            errors: Vec::new(),
            elapsed_ms: 3,
        }
    }

    #[test]
    fn record_carries_outcome_and_action_names() {
        let record = audit_record(&completed(), "u1", Some("s1"));
        assert_eq!(record.policy_id, "p1");
        assert_eq!(record.server_id.as_deref(), Some("s1"));
        assert!(record.matched);
        assert_eq!(record.actions_executed, vec!["delete_message", "warn_user"]);
        assert_eq!(record.elapsed_ms, 3);
    }

    #[tokio::test]
    async fn server_logs_act_as_sink() {
        let dir = tempdir().unwrap();
        let logs = ServerAuditLogs::new(dir.path()).unwrap();
        logs.record(audit_record(&completed(), "u1", Some("s1")))
            .await
            .unwrap();
        let lines = AuditLog::read_all(logs.path_for(Some("s1"))).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].user_id, "u1");
    }

    #[tokio::test]
    async fn concurrent_sink_writes_keep_the_chain() {
        let dir = tempdir().unwrap();
        let logs = std::sync::Arc::new(ServerAuditLogs::new(dir.path()).unwrap());

        let mut writes = tokio::task::JoinSet::new();
        for i in 0..8 {
            let logs = std::sync::Arc::clone(&logs);
            writes.spawn(async move {
                logs.record(audit_record(&completed(), &format!("u{}", i), Some("s1")))
                    .await
            });
        }
        while let Some(joined) = writes.join_next().await {
            joined.unwrap().unwrap();
        }

        let path = logs.path_for(Some("s1"));
        assert_eq!(AuditLog::read_all(&path).unwrap().len(), 8);
        assert!(AuditLog::verify_chain(&path).unwrap());
    }
}
