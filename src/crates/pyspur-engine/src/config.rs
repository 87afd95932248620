//! Engine configuration: storage backend, concurrency limits, run deadline.
//!
//! Ground: teacher's `config::{loader, server}` (`ServerConfig::load`
//! reading TOML with environment overrides), scaled down to what the
//! engine itself needs rather than the teacher's HTTP/LDAP/SSL server
//! concerns, which are dropped as out of scope.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Where durable engine state (workflows, runs, tasks, sessions) lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StoreBackend {
    /// A SQLite database file or `sqlite::memory:`.
    Sqlite { database_url: String },
    /// The process-local, non-persistent reference store; tests and demos only.
    Memory,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite { database_url: "sqlite://pyspur.db".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub llm: usize,
    pub http: usize,
    pub compute: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        let compute = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self { llm: 8, http: 32, compute }
    }
}

impl From<ConcurrencyConfig> for pyspur_core::scheduler::ConcurrencyLimits {
    fn from(value: ConcurrencyConfig) -> Self {
        pyspur_core::scheduler::ConcurrencyLimits { llm: value.llm, http: value.http, compute: value.compute }
    }
}

/// Top-level engine configuration, loaded from TOML with environment
/// variable overrides (`PYSPUR_DATABASE_URL`, `PYSPUR_RUN_DEADLINE_SECS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreBackend,
    pub concurrency: ConcurrencyConfig,
    /// Maximum sqlx connection pool size; ignored for `StoreBackend::Memory`.
    pub max_connections: u32,
    /// Optional per-run wall-clock deadline; `None` means no deadline.
    pub default_run_deadline_secs: Option<u64>,
    /// Directory `sqlx::migrate!` reads `*.sql` files from.
    pub migrations_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            concurrency: ConcurrencyConfig::default(),
            max_connections: 5,
            default_run_deadline_secs: None,
            migrations_path: "./migrations".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, then apply environment variable overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment-only configuration, for callers with no config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PYSPUR_DATABASE_URL") {
            self.store = StoreBackend::Sqlite { database_url: url };
        }
        if let Ok(secs) = std::env::var("PYSPUR_RUN_DEADLINE_SECS") {
            self.default_run_deadline_secs = secs.parse().ok();
        }
        if let Ok(path) = std::env::var("PYSPUR_MIGRATIONS_PATH") {
            self.migrations_path = path;
        }
    }

    pub fn database_url(&self) -> Result<&str> {
        match &self.store {
            StoreBackend::Sqlite { database_url } => Ok(database_url),
            StoreBackend::Memory => Err(OrchestratorError::Configuration("StoreBackend::Memory has no database_url".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_sqlite_and_cpu_count_compute_pool() {
        let config = EngineConfig::default();
        assert!(matches!(config.store, StoreBackend::Sqlite { .. }));
        assert!(config.concurrency.compute >= 1);
    }

    #[test]
    fn env_override_switches_database_url() {
        std::env::set_var("PYSPUR_DATABASE_URL", "sqlite://overridden.db");
        let config = EngineConfig::from_env();
        assert_eq!(config.database_url().unwrap(), "sqlite://overridden.db");
        std::env::remove_var("PYSPUR_DATABASE_URL");
    }

    #[test]
    fn parses_toml_document() {
        let toml_text = r#"
            max_connections = 10
            default_run_deadline_secs = 300

            [store]
            kind = "sqlite"
            database_url = "sqlite://test.db"

            [concurrency]
            llm = 4
            http = 16
            compute = 2
        "#;
        let config: EngineConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.default_run_deadline_secs, Some(300));
        assert_eq!(config.concurrency.llm, 4);
    }
}
