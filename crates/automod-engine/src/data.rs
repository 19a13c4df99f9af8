// data.rs — Read-only user/server aggregates.
//
// Backs the `user.*` and `server.*` field namespaces. Implementations are
// expected to answer with safe defaults (0 / now) for unknown subjects and
// only return an error when the backing store itself is unreachable; the
// resolver turns such errors into Unresolved.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CollaboratorError;

#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn user_message_count(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<u64, CollaboratorError>;

    async fn user_join_date(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<DateTime<Utc>, CollaboratorError>;

    async fn user_violation_count(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<u64, CollaboratorError>;

    async fn server_member_count(&self, server_id: &str) -> Result<u64, CollaboratorError>;
}

type UserKey = (String, Option<String>);

#[derive(Debug, Default)]
struct Tables {
    message_counts: HashMap<UserKey, u64>,
    join_dates: HashMap<UserKey, DateTime<Utc>>,
    violation_counts: HashMap<UserKey, u64>,
    member_counts: HashMap<String, u64>,
}

/// Process-local aggregates, fed by the host as events are observed.
#[derive(Debug, Default)]
pub struct InMemoryDataAccess {
    tables: RwLock<Tables>,
}

fn key(user_id: &str, server_id: Option<&str>) -> UserKey {
    (user_id.to_string(), server_id.map(str::to_string))
}

impl InMemoryDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, user_id: &str, server_id: Option<&str>) {
        if let Ok(mut t) = self.tables.write() {
            *t.message_counts.entry(key(user_id, server_id)).or_insert(0) += 1;
        }
    }

    /// Record a member joining. Bumps the server's member count.
    pub fn record_join(&self, user_id: &str, server_id: Option<&str>, at: DateTime<Utc>) {
        if let Ok(mut t) = self.tables.write() {
            t.join_dates.insert(key(user_id, server_id), at);
            if let Some(server) = server_id {
                *t.member_counts.entry(server.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn record_leave(&self, server_id: &str) {
        if let Ok(mut t) = self.tables.write() {
            if let Some(count) = t.member_counts.get_mut(server_id) {
                *count = count.saturating_sub(1);
            }
        }
    }

    pub fn record_violation(&self, user_id: &str, server_id: Option<&str>) {
        if let Ok(mut t) = self.tables.write() {
            *t.violation_counts.entry(key(user_id, server_id)).or_insert(0) += 1;
        }
    }

    pub fn set_member_count(&self, server_id: &str, count: u64) {
        if let Ok(mut t) = self.tables.write() {
            t.member_counts.insert(server_id.to_string(), count);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, CollaboratorError> {
        self.tables
            .read()
            .map_err(|_| CollaboratorError::Unavailable("data tables lock poisoned".to_string()))
    }
}

#[async_trait]
impl DataAccess for InMemoryDataAccess {
    async fn user_message_count(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<u64, CollaboratorError> {
        Ok(self
            .read()?
            .message_counts
            .get(&key(user_id, server_id))
            .copied()
            .unwrap_or(0))
    }

    async fn user_join_date(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<DateTime<Utc>, CollaboratorError> {
        Ok(self
            .read()?
            .join_dates
            .get(&key(user_id, server_id))
            .copied()
            .unwrap_or_else(Utc::now))
    }

    async fn user_violation_count(
        &self,
        user_id: &str,
        server_id: Option<&str>,
    ) -> Result<u64, CollaboratorError> {
        Ok(self
            .read()?
            .violation_counts
            .get(&key(user_id, server_id))
            .copied()
            .unwrap_or(0))
    }

    async fn server_member_count(&self, server_id: &str) -> Result<u64, CollaboratorError> {
        Ok(self.read()?.member_counts.get(server_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_subjects_get_safe_defaults() {
        let data = InMemoryDataAccess::new();
        assert_eq!(data.user_message_count("u", Some("s")).await.unwrap(), 0);
        assert_eq!(data.user_violation_count("u", None).await.unwrap(), 0);
        assert_eq!(data.server_member_count("s").await.unwrap(), 0);
        let before = Utc::now();
        assert!(data.user_join_date("u", Some("s")).await.unwrap() >= before);
    }

    #[tokio::test]
    async fn counts_are_scoped_per_server() {
        let data = InMemoryDataAccess::new();
        data.record_message("u", Some("s1"));
        data.record_message("u", Some("s1"));
        data.record_message("u", Some("s2"));
        assert_eq!(data.user_message_count("u", Some("s1")).await.unwrap(), 2);
        assert_eq!(data.user_message_count("u", Some("s2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn joins_and_leaves_track_member_count() {
        let data = InMemoryDataAccess::new();
        let at = Utc::now();
        data.record_join("a", Some("s"), at);
        data.record_join("b", Some("s"), at);
        data.record_leave("s");
        assert_eq!(data.server_member_count("s").await.unwrap(), 1);
        assert_eq!(data.user_join_date("a", Some("s")).await.unwrap(), at);
    }
}
