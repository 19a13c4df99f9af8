// error.rs — Error types for the moderation engine.
//
// Most failures inside the engine are absorbed where they happen:
//   CollaboratorError → the field resolves to Unresolved
//   DispatchError     → the action is left out of `actions_executed`
//   EngineError       → recorded on that policy's ExecutionResult
// Only ConfigError reaches the host, at startup.

use std::path::PathBuf;

use automod_policy::{ActionType, PolicyError};
use thiserror::Error;

/// A collaborator (content analyzer, data access) call failed.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid collaborator response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollaboratorError::InvalidResponse(err.to_string())
        } else {
            CollaboratorError::Http(err.to_string())
        }
    }
}

/// Submitting a single effect failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action needs an identifier the event does not carry
    /// (e.g. deleting a message on a member-join event).
    #[error("{action} requires a {target} but the event has none")]
    MissingTarget {
        action: ActionType,
        target: &'static str,
    },

    /// The effect channel is closed and no longer accepts submissions.
    #[error("effect channel closed")]
    ChannelClosed,

    /// The effect channel refused the submission.
    #[error("effect rejected: {0}")]
    Rejected(String),
}

/// A failure inside one policy's evaluation pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("violation ledger lock poisoned")]
    LockPoisoned,
}

/// Engine configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
