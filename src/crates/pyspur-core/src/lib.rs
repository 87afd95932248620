//! pyspur-core: workflow validation, node registry, and the scheduler that
//! turns a [`pyspur_store::WorkflowDefinition`] into running [`pyspur_store::Task`]s.
//!
//! ## Layout
//!
//! - [`error`] — the crate's error type, and the structured model-provider
//!   error shape node implementations report through.
//! - [`messages`] — in-memory chat message/role/content types LLM-calling
//!   node implementations exchange with a [`llm::ChatModel`].
//! - [`llm`] — the provider-agnostic chat model trait, tool-call types, and
//!   per-call configuration (temperature, max tokens, retries).
//! - [`node`] — the [`node::NodeExecutor`] contract every node type
//!   implements, and the [`node::ExecutionContext`] handed to each call.
//! - [`registry`] — the process-wide catalog mapping `node_type` strings to
//!   executors, grouped by concurrency category.
//! - [`schema`] — a thin [`jsonschema`] wrapper used to validate a node's
//!   `config` against its declared schema before a run starts.
//! - [`template`] — the `{{ node.field }}` variable resolver and the router
//!   condition sublanguage.
//! - [`validator`] — the seven structural checks a workflow must pass before
//!   it can run.
//! - [`scheduler`] — the dependency-aware dispatch loop: concurrency pools,
//!   partial runs, pause/resume, and subworkflow recursion.
//! - [`visualization`] — DOT/Mermaid/ASCII rendering of a workflow graph.
//! - [`yaml`] — optional YAML import/export of a workflow definition.
//! - [`retry`] — exponential-backoff retry policies for transient node
//!   failures (LLM rate limits, flaky HTTP calls).

pub mod error;
pub mod llm;
pub mod messages;
pub mod node;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod schema;
pub mod template;
pub mod validator;
pub mod visualization;
pub mod yaml;

pub use error::{EngineError, ModelProviderError, ProviderErrorType, Result};
pub use messages::{Message, MessageContent, MessageRole};
pub use node::{CancellationToken, ExecutionContext, NodeExecutor, NodeOutcome, SubrunDispatch};
pub use registry::{NodeCategory, NodeRegistry, NodeTypeDescriptor};
pub use retry::{RetryPolicy, RetryState};
pub use scheduler::{ConcurrencyLimits, RunStatusReport, Scheduler, TaskStatusView};
pub use schema::CompiledSchema;
pub use template::{Condition, ConditionGroup, ConditionOperator, LogicalOperator, RouteMap, TemplateContext};
pub use validator::WorkflowValidator;
pub use visualization::{visualize, VisualizationFormat, VisualizationOptions};
