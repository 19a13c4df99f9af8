// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, storing, or evaluating policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy failed validation and was not stored.
    #[error("invalid policy '{policy_id}': {reason}")]
    InvalidPolicy { policy_id: String, reason: String },

    /// A `matches` condition carries a pattern that does not compile.
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A condition literal has the wrong shape for its operator
    /// (e.g. `in_range` without numeric bounds).
    #[error("invalid literal for operator '{operator}': {reason}")]
    InvalidLiteral { operator: String, reason: String },

    /// A shared lock was poisoned by a panicking writer.
    #[error("policy store lock poisoned")]
    LockPoisoned,

    /// Failed to read a policy file.
    #[error("failed to read policy file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Policy file extension is neither YAML nor JSON.
    #[error("unsupported policy file format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Malformed JSON policy file.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed YAML policy file.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
