//! Error types for workflow validation, the node registry, and the scheduler.

use thiserror::Error;

/// Convenience result type using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Structured failure from a model provider call.
///
/// Node executors that call out to an LLM provider should classify the
/// failure into one of [`ProviderErrorType`]'s buckets so the scheduler and
/// the retry policy can tell a transient rate limit from a permanent
/// configuration mistake.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelProviderError {
    pub provider: String,
    pub error_type: ProviderErrorType,
    pub message: String,
}

impl std::fmt::Display for ModelProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} provider error ({:?}): {}", self.provider, self.error_type, self.message)
    }
}

impl std::error::Error for ModelProviderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorType {
    Overloaded,
    RateLimit,
    ContextLength,
    Auth,
    ServiceUnavailable,
    Unknown,
}

impl ProviderErrorType {
    /// Whether a [`crate::retry::RetryPolicy`] should retry this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, ProviderErrorType::Overloaded | ProviderErrorType::RateLimit | ProviderErrorType::ServiceUnavailable)
    }
}

/// Errors raised while validating, registering, templating, or scheduling
/// a workflow.
#[derive(Error, Debug)]
pub enum EngineError {
    /// the workflow failed one of the validator's structural checks.
    #[error("workflow validation failed: {0}")]
    Validation(String),

    /// A node's `node_type` does not match any [`crate::registry::NodeTypeDescriptor`].
    #[error("no node type registered for '{0}'")]
    NodeNotRegistered(String),

    /// A node's `config` failed its registered JSON schema.
    #[error("node '{node}' config failed schema validation: {error}")]
    SchemaValidation { node: String, error: String },

    /// Template resolution (`{{ node.field }}` interpolation, router conditions) failed.
    #[error("template error: {0}")]
    Template(String),

    /// A node executor failed.
    #[error("node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// A model provider call failed; see [`ModelProviderError`] for detail.
    #[error("provider error: {0}")]
    Provider(#[from] ModelProviderError),

    /// The run (or the process) was asked to stop mid-execution.
    #[error("run canceled: {0}")]
    Canceled(String),

    /// A durable store operation failed.
    #[error("store error: {0}")]
    Store(#[from] pyspur_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl EngineError {
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution { node: node.into(), error: error.into() }
    }

    pub fn schema_validation(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::SchemaValidation { node: node.into(), error: error.into() }
    }
}
