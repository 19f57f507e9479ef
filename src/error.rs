//! Error types for the anti-drift core.
//!
//! Numeric input is never an error: out-of-range values are clamped where
//! they enter. Only caller contract violations and persistence failures
//! surface here.

use thiserror::Error;

/// Errors produced by the anti-drift core.
#[derive(Debug, Error)]
pub enum AntiDriftError {
    /// Settings that no component can operate with.
    #[error("invalid anti-drift configuration: {0}")]
    InvalidConfig(String),

    /// Per-step call issued before `start_task`.
    #[error("no active task: call start_task before recording steps")]
    TaskNotStarted,

    /// Registry lookup for a session that was never created or was removed.
    #[error("no anti-drift session registered as {0}")]
    SessionNotFound(String),

    /// `start_task` issued while another task is still running.
    #[error("task of type '{0}' is still active")]
    TaskAlreadyActive(String),

    /// Snapshot or profile (de)serialization failure.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
