//! Error types for stagegate.

use crate::workflow::Stage;
use std::io;
use thiserror::Error;

/// Result type alias for stagegate operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur in stagegate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Local I/O error (file backend, stdin/stdout).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A record that the caller requires is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stage name not present in the transition table.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Target stage is not a successor of the current stage.
    #[error("Illegal transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// Stage the session was in.
        from: Stage,
        /// Stage that was requested.
        to: Stage,
    },

    /// Session moved on between snapshot and commit.
    #[error("Stage conflict: expected '{expected}', found '{actual}'")]
    StageConflict {
        /// Stage the caller based its request on.
        expected: Stage,
        /// Stage found at commit time.
        actual: Stage,
    },

    /// Several hooks in one chain asked for different target stages.
    #[error("Ambiguous transition request: {}", format_requests(.requests))]
    AmbiguousTransition {
        /// `(hook, target)` pairs in chain order.
        requests: Vec<(String, Stage)>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error rejects the request itself rather than signalling
    /// an infrastructure failure.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. }
                | Self::StageConflict { .. }
                | Self::AmbiguousTransition { .. }
                | Self::UnknownStage(_)
        )
    }
}

fn format_requests(requests: &[(String, Stage)]) -> String {
    requests
        .iter()
        .map(|(hook, stage)| format!("{hook} -> {stage}"))
        .collect::<Vec<_>>()
        .join(", ")
}
