//! # pyspur-engine — the orchestration surface
//!
//! Ties `pyspur-store`'s persistence trait, `pyspur-core`'s scheduler, and
//! `pyspur-nodes`'s built-in node catalog together into one process-level
//! entry point: [`RunController`], which implements the Run Controller and
//! Chat Session Adapter operations.
//!
//! Ground: teacher's top-level `orchestrator` crate — its HTTP/gRPC
//! surface (`api/`, `bin/orchestrator-server.rs`'s LDAP/TLS setup) is
//! dropped (out of scope), but its `config`, `db`, and service-layer
//! wiring patterns are carried over.

pub mod config;
pub mod controller;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

pub use config::{ConcurrencyConfig, EngineConfig, StoreBackend};
pub use controller::RunController;
pub use db::{DatabaseConnection, SqliteTaskStore};
pub use error::{OrchestratorError, Result};

use pyspur_core::llm::ChatModel;
use pyspur_core::registry::NodeRegistry;
use pyspur_store::{memory::InMemoryTaskStore, TaskStore};

/// Build a [`RunController`] from an [`EngineConfig`], wiring up the store
/// backend it names (running migrations for the SQLite backend) and
/// registering every built-in node type against `chat_model`.
///
/// Ground: teacher's `bin/orchestrator-server.rs` startup sequence
/// (load config -> connect db -> run migrations -> build services), minus
/// the HTTP listener it then binds.
pub async fn bootstrap(config: &EngineConfig, chat_model: Arc<dyn ChatModel>) -> Result<Arc<RunController>> {
    let store: Arc<dyn TaskStore> = match &config.store {
        StoreBackend::Sqlite { database_url } => {
            let conn = DatabaseConnection::with_max_connections(database_url, config.max_connections).await?;
            conn.run_migrations(&config.migrations_path).await?;
            Arc::new(SqliteTaskStore::new(conn.pool().clone()))
        }
        StoreBackend::Memory => Arc::new(InMemoryTaskStore::new()),
    };

    let mut registry = NodeRegistry::new();
    pyspur_nodes::register_builtins(&mut registry, chat_model);

    let deadline = config.default_run_deadline_secs.map(Duration::from_secs);
    Ok(RunController::new(store, Arc::new(registry), config.concurrency.into(), deadline))
}

/// Initialize `tracing` with the teacher's env-filter + compact-formatter
/// convention. Call once, near the start of a binary's `main`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
