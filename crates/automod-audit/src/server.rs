// server.rs — One audit log per server.
//
// Records are routed by `server_id` to `<dir>/<server_id>.jsonl`; events
// without a server go to `<dir>/global.jsonl`. Logs are opened lazily and
// kept open for the life of the process. Clones share the same open logs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::AuditError;
use crate::log::AuditLog;
use crate::record::AuditRecord;

const GLOBAL_LOG: &str = "global";

/// A directory of per-server audit logs.
#[derive(Clone)]
pub struct ServerAuditLogs {
    dir: PathBuf,
    logs: Arc<Mutex<HashMap<String, AuditLog>>>,
}

impl ServerAuditLogs {
    /// Use `dir` for log files, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| AuditError::OpenFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            logs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Append a record to its server's log.
    pub fn append(&self, mut record: AuditRecord) -> Result<(), AuditError> {
        let key = record
            .server_id
            .as_deref()
            .map(file_stem)
            .unwrap_or_else(|| GLOBAL_LOG.to_string());

        let path = self.log_path(&key);
        let mut logs = self.logs.lock().map_err(|_| AuditError::LockPoisoned)?;
        let log = match logs.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(AuditLog::open(path)?),
        };
        log.append(&mut record)
    }

    /// Path of the log file for a server (or the global log for `None`).
    pub fn path_for(&self, server_id: Option<&str>) -> PathBuf {
        let key = server_id.map(file_stem).unwrap_or_else(|| GLOBAL_LOG.to_string());
        self.log_path(&key)
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", key))
    }
}

/// Keep server ids filesystem-safe.
fn file_stem(server_id: &str) -> String {
    server_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
