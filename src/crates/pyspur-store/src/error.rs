//! Error types for Task Store operations.

use thiserror::Error;

/// Result type for Task Store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing engine-durable state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No run exists with the given id.
    #[error("run not found: {0}")]
    RunNotFound(uuid::Uuid),

    /// No task exists with the given id, or the given `(run_id, node_id, parent_task_id)` key.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// No open pause event exists for the given run.
    #[error("no open pause event for run {0}")]
    PauseEventNotFound(uuid::Uuid),

    /// No workflow (or workflow version) exists with the given id.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// No chat session exists with the given id.
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// A write violated a store invariant (e.g. task uniqueness per scope).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// `serde_json` (de)serialization failure at the storage boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific I/O or driver failure, not otherwise classified.
    #[error("storage backend error: {0}")]
    Backend(String),
}
