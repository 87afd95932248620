//! The crate's error type.
//!
//! Ground: teacher's top-level `OrchestratorError` in `lib.rs` and
//! `db::error::DatabaseError`'s `From<sqlx::Error>` conversion — the same
//! per-crate `thiserror` pattern as `pyspur_core::EngineError` and
//! `pyspur_store::StoreError`, one layer up.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("node '{0}' not found in workflow")]
    NodeNotInWorkflow(String),

    #[error("run '{0}' is not running")]
    NotRunning(Uuid),

    #[error("run '{0}' is not paused")]
    NotPaused(Uuid),

    #[error("invalid resume action for run '{0}': {1}")]
    InvalidAction(Uuid, String),

    #[error("workflow validation failed: {0}")]
    ValidationFailed(String),

    #[error("run execution failed: {0}")]
    ExecutionFailed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Engine(#[from] pyspur_core::error::EngineError),

    #[error(transparent)]
    Store(#[from] pyspur_store::StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration file error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
