//! The Node Executor contract: the interface every built-in and
//! user-registered node type implements.
//!
//! Ground: teacher's `node_result.rs` (typed outcome enum instead of a
//! pseudo-union) and `interrupt.rs` (pause/resume vocabulary), generalized
//! from "graph state transformer" to "JSON-in, JSON-out task with an
//! optional human-in-the-loop pause."

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// The result of running a node once.
///
/// Modeled on the teacher's `NodeResult` shape, but fixed to the three
/// terminal/non-terminal states a PySpur task can reach in one executor
/// call: a node never "commands" the scheduler directly,
/// it reports an outcome and the scheduler decides what runs next.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The node produced its declared outputs.
    Completed(Value),
    /// The node failed; `message` is surfaced on the `Task.error` column.
    Failed(String),
    /// The node requires human input before it can complete.
    ///
    /// `required_fields`, when present, names the keys the resume payload
    /// must supply.
    Paused { message: String, required_fields: Option<Vec<String>> },
}

impl NodeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, NodeOutcome::Completed(_))
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, NodeOutcome::Paused { .. })
    }
}

/// A cooperative stop signal shared by every task spawned for one run.
///
/// Mirrors the teacher's process-global runtime context (`runtime.rs`) but
/// scoped to a single run rather than the whole process, since two
/// concurrent runs must be cancellable independently.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<tokio::sync::Notify>,
    canceled: Arc<std::sync::atomic::AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self { inner: Arc::new(tokio::sync::Notify::new()), canceled: Arc::new(std::sync::atomic::AtomicBool::new(false)) }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        self.inner.notified().await;
    }
}

/// A handle passed to every [`NodeExecutor::execute`] call.
///
/// Exposes what a node needs beyond its own inputs: the ability to spawn a
/// nested run (subworkflows, loop bodies, agent sub-steps), the session a
/// chat-originated run belongs to, and the run's cancellation signal.
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub node_id: String,
    pub session_id: Option<Uuid>,
    pub cancellation: CancellationToken,
    /// The node's own `subworkflow`, verbatim from the `WorkflowDefinition`
    /// (never template-rendered against the outer scope — a subworkflow
    /// renders its own config against its own inner context when `subrun`
    /// executes it).
    subworkflow: Option<Box<pyspur_store::WorkflowDefinition>>,
    subrun: Arc<dyn SubrunDispatch>,
}

impl ExecutionContext {
    pub fn new(
        run_id: Uuid,
        node_id: impl Into<String>,
        session_id: Option<Uuid>,
        cancellation: CancellationToken,
        subrun: Arc<dyn SubrunDispatch>,
    ) -> Self {
        Self { run_id, node_id: node_id.into(), session_id, cancellation, subworkflow: None, subrun }
    }

    pub fn with_subworkflow(mut self, subworkflow: Option<Box<pyspur_store::WorkflowDefinition>>) -> Self {
        self.subworkflow = subworkflow;
        self
    }

    /// The current node's nested `subworkflow`, for node types (ForLoop,
    /// Agent, Tool) whose execution is defined by a nested graph rather
    /// than a pure function of `config`.
    pub fn subworkflow(&self) -> Option<&pyspur_store::WorkflowDefinition> {
        self.subworkflow.as_deref()
    }

    /// Run a nested workflow definition to completion and return its
    /// `node_id -> outputs` map.
    ///
    /// Ground: teacher's `subgraph.rs` `CompiledSubgraph::invoke`, which
    /// treats a nested graph as one atomic compiled unit from the parent's
    /// perspective.
    pub async fn subrun(
        &self,
        definition: pyspur_store::WorkflowDefinition,
        inputs: Value,
    ) -> Result<std::collections::HashMap<String, Value>> {
        self.subrun.run_subworkflow(self.run_id, definition, inputs).await
    }
}

/// Object-safe indirection so `ExecutionContext` doesn't need a generic
/// parameter over the concrete scheduler type (which would make
/// `NodeExecutor` non-object-safe in turn).
#[async_trait]
pub trait SubrunDispatch: Send + Sync {
    async fn run_subworkflow(
        &self,
        parent_run_id: Uuid,
        definition: pyspur_store::WorkflowDefinition,
        inputs: Value,
    ) -> Result<std::collections::HashMap<String, Value>>;
}

/// A node type's domain grouping for discovery, independent of the
/// scheduler's concurrency-pool [`crate::registry::NodeCategory`].
///
/// Ground: spec.md §2 item 1, "discovers node types by category
/// (input/output/primitive/LLM/logic/loop/agent/integration/RAG)."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeManifestCategory {
    Input,
    Output,
    Primitive,
    Llm,
    Logic,
    Loop,
    Agent,
    Integration,
    Rag,
}

/// Visual metadata for the editor's node palette.
///
/// Ground: spec.md §6 registry manifest `visual_tag{acronym,color}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VisualTag {
    pub acronym: String,
    pub color: String,
}

impl VisualTag {
    pub fn new(acronym: impl Into<String>, color: impl Into<String>) -> Self {
        Self { acronym: acronym.into(), color: color.into() }
    }
}

/// The interface every node type in the registry implements.
///
/// Ground: teacher's per-node closure/trait-object pattern in
/// `graph.rs`/`builder.rs`, generalized from a typed-state transformer
/// (`Fn(State) -> Future<Result<State>>`) to a JSON-contract executor, since
/// PySpur's node config and I/O are untyped JSON resolved against a
/// registered schema rather than a compile-time Rust type.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// JSON Schema describing this node type's `config` shape, or `None`
    /// if the node type takes no configuration.
    fn config_schema(&self) -> Option<Value> {
        None
    }

    /// JSON Schema describing this node type's emitted `outputs`, or
    /// `None` if not statically describable. spec.md §2 item 1,
    /// "exposes each type's declared ... output schema."
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// Whether [`Self::output_schema`] is a fixed shape every call
    /// produces, as opposed to one that varies with `config` (e.g. a
    /// `PythonFunc` node's output fields come from its own
    /// `config.outputs` map). spec.md §2 item 1, "whether its output
    /// schema is fixed or derived from config."
    fn has_fixed_output(&self) -> bool {
        false
    }

    /// The domain category this node type is discovered under (spec.md
    /// §2 item 1). Defaults to [`NodeManifestCategory::Primitive`].
    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Primitive
    }

    /// Visual metadata for the editor's node palette. Defaults to a
    /// generic tag; built-in node types override it with something
    /// type-specific.
    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("ND", "#6b7280")
    }

    /// Input keys this node type cannot run without. The scheduler skips
    /// (rather than dispatches) a node when any of these resolve to an
    /// absent/`Null` value after predecessor propagation.
    fn required_inputs(&self, _config: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Run this node once against its resolved inputs.
    async fn execute(&self, config: &Value, inputs: Value, context: &ExecutionContext) -> NodeOutcome;
}
