//! # automod-audit
//!
//! Append-only audit trail for moderation decisions.
//!
//! Every evaluated policy produces an [`AuditRecord`]. Records are written
//! to one JSONL file per server by [`ServerAuditLogs`], and each line is
//! chained to the previous one by SHA-256 so tampering is detectable with
//! [`AuditLog::verify_chain`].
//!
//! ```rust,no_run
//! use automod_audit::{AuditRecord, ServerAuditLogs};
//!
//! let logs = ServerAuditLogs::new("/var/lib/automod/audit").unwrap();
//! let record = AuditRecord::new("anti-spam", "Anti spam", "user-1")
//!     .with_server(Some("server-1".to_string()))
//!     .with_outcome(true, 1.0);
//! logs.append(record).unwrap();
//! ```

pub mod error;
pub mod hasher;
pub mod log;
pub mod record;
pub mod server;

pub use error::AuditError;
pub use log::AuditLog;
pub use record::AuditRecord;
pub use server::ServerAuditLogs;
