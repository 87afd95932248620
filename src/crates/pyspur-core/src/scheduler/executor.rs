//! The dispatch loop: readiness, concurrency pools, partial runs,
//! pause/resume, cancellation, and subworkflow fan-out.
//!
//! Ground: teacher's `pregel/` module — `algo.rs`'s readiness computation,
//! `loop_impl.rs`'s step driver, `executor.rs`'s per-superstep dispatch, and
//! `checkpoint.rs`'s "persist after every transition" discipline — but
//! generalized from the teacher's fixed-superstep barrier into per-node-ready
//! dispatch, since PySpur nodes are independently-ready DAG nodes rather
//! than barrier-synchronized supersteps.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use pyspur_store::{
    CancelReason, PauseEvent, ResumeAction, Run, RunStatus, RunType, Task, TaskStatus, TaskStore, Workflow,
    WorkflowDefinition, WorkflowVersion,
};

use crate::error::{EngineError, Result};
use crate::node::{CancellationToken, ExecutionContext, NodeOutcome, SubrunDispatch};
use crate::registry::{NodeCategory, NodeRegistry};
use crate::scheduler::graph::CompiledGraph;
use crate::template::{render_config, TemplateContext};

const ROUTER_NODE_TYPE: &str = "Router";

/// Per-category worker pool sizes.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyLimits {
    pub llm: usize,
    pub http: usize,
    pub compute: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        let compute = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self { llm: 8, http: 32, compute }
    }
}

struct Semaphores {
    llm: Arc<Semaphore>,
    http: Arc<Semaphore>,
    compute: Arc<Semaphore>,
}

impl Semaphores {
    fn new(limits: ConcurrencyLimits) -> Self {
        Self {
            llm: Arc::new(Semaphore::new(limits.llm)),
            http: Arc::new(Semaphore::new(limits.http)),
            compute: Arc::new(Semaphore::new(limits.compute)),
        }
    }

    fn for_category(&self, category: NodeCategory) -> Arc<Semaphore> {
        match category {
            NodeCategory::Llm => self.llm.clone(),
            NodeCategory::Http => self.http.clone(),
            NodeCategory::Compute => self.compute.clone(),
        }
    }
}

/// One node's resolved result within a scope execution, kept in memory
/// only for the duration of one `execute_scope` call; durable state lives
/// in the `Task` rows written along the way.
#[derive(Clone)]
struct NodeResultRecord {
    /// What gets persisted as `Task.outputs` and read back on resume.
    outputs: Value,
    /// For router nodes: the route name it selected, if any.
    router_selected: Option<Option<String>>,
    /// For router nodes: the pass-through value propagated to the winning handle.
    pass_through: Option<Value>,
}

/// The result of running one workflow scope (root or a subworkflow) to
/// quiescence: either every output node completed, the scope paused on a
/// human-intervention node, or it failed.
pub struct ScopeOutcome {
    pub completed: bool,
    pub paused: bool,
    pub canceled: bool,
    pub outputs: HashMap<String, Value>,
}

/// Snapshot of one task for `get_run_status`.
#[derive(Debug, Clone)]
pub struct TaskStatusView {
    pub node_id: String,
    pub status: TaskStatus,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub subworkflow_output: Option<HashMap<String, Value>>,
}

/// `get_run_status` response shape.
#[derive(Debug, Clone)]
pub struct RunStatusReport {
    pub run: Run,
    pub percentage_complete: f64,
    pub tasks: Vec<TaskStatusView>,
}

pub struct Scheduler {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn TaskStore>,
    semaphores: Semaphores,
}

impl Scheduler {
    pub fn new(registry: Arc<NodeRegistry>, store: Arc<dyn TaskStore>, limits: ConcurrencyLimits) -> Arc<Self> {
        Arc::new(Self { registry, store, semaphores: Semaphores::new(limits) })
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Start a new run of a workflow version from scratch.
    #[instrument(skip(self, definition, initial_inputs, cancellation))]
    pub async fn start_run(
        self: &Arc<Self>,
        workflow: &Workflow,
        version: &WorkflowVersion,
        run_type: RunType,
        initial_inputs: Value,
        parent_run_id: Option<Uuid>,
        session_id: Option<Uuid>,
        cancellation: CancellationToken,
    ) -> Result<Run> {
        let run = self.begin_run(workflow, version, run_type, initial_inputs, parent_run_id).await?;
        self.drive_run(run, &version.definition, cancellation, session_id).await
    }

    /// Record a new, not-yet-executed run. Split out from [`Scheduler::start_run`]
    /// so a caller (the Run Controller) can hand the created `Run` back to its
    /// own caller immediately and drive it to completion on a background task —
    /// `spec.md` §9's "public API is synchronous (returns IDs); observation is
    /// via polling `get_run_status`" note.
    pub async fn begin_run(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
        run_type: RunType,
        initial_inputs: Value,
        parent_run_id: Option<Uuid>,
    ) -> Result<Run> {
        let run = Run {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            version_id: version.id,
            status: RunStatus::Running,
            run_type,
            initial_inputs,
            outputs: None,
            parent_run_id,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            cancellation_reason: None,
        };
        self.store.create_run(run).await.map_err(EngineError::from)
    }

    /// Run an already-recorded run's scope to quiescence and finalize its status.
    pub async fn drive_run(
        self: &Arc<Self>,
        run: Run,
        definition: &WorkflowDefinition,
        cancellation: CancellationToken,
        session_id: Option<Uuid>,
    ) -> Result<Run> {
        let mut seed = TemplateContext::new();
        seed.insert("input".into(), run.initial_inputs.clone());
        let outcome = self.execute_scope(run.id, definition, seed, &cancellation, None, session_id).await?;
        self.finalize_run(run.id, outcome).await
    }

    async fn finalize_run(&self, run_id: Uuid, outcome: ScopeOutcome) -> Result<Run> {
        if outcome.paused {
            return self.store.update_run_status(run_id, RunStatus::Paused, None).await;
        }
        if outcome.canceled {
            return self.store.update_run_status(run_id, RunStatus::Canceled, None).await;
        }
        let merged = merge_outputs(&outcome.outputs);
        self.store.set_run_outputs(run_id, merged).await?;
        if outcome.completed {
            self.store.update_run_status(run_id, RunStatus::Completed, None).await
        } else {
            let summary = format!("{} output node(s) did not complete", outcome.outputs.len());
            self.store.update_run_status(run_id, RunStatus::Failed, Some(summary)).await
        }
    }

    /// Re-run a workflow from one target node, seeding its declared predecessors'
    /// outputs from `partial_outputs` instead of recomputing them.
    pub async fn partial_run(
        self: &Arc<Self>,
        workflow: &Workflow,
        version: &WorkflowVersion,
        node_id: &str,
        initial_inputs: Value,
        partial_outputs: HashMap<String, Value>,
        rerun_predecessors: bool,
        cancellation: CancellationToken,
    ) -> Result<Value> {
        let graph = CompiledGraph::compile(&version.definition);
        if graph.node(node_id).is_none() {
            return Err(EngineError::Validation(format!("node '{node_id}' not found in workflow")));
        }

        let run = Run {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            version_id: version.id,
            status: RunStatus::Running,
            run_type: RunType::Partial,
            initial_inputs: initial_inputs.clone(),
            outputs: None,
            parent_run_id: None,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            cancellation_reason: None,
        };
        let run = self.store.create_run(run).await?;

        // Inject caller-supplied outputs as synthetic, already-completed
        // tasks (Open Question 2, resolved: these rows ARE persisted).
        for (injected_node_id, value) in &partial_outputs {
            let task = Task {
                id: Uuid::new_v4(),
                run_id: run.id,
                node_id: injected_node_id.clone(),
                parent_task_id: None,
                status: TaskStatus::Canceled,
                inputs: None,
                outputs: Some(value.clone()),
                error: None,
                cancel_reason: Some(CancelReason::PartialInput),
                start_time: None,
                end_time: None,
                subworkflow_run_id: None,
                subworkflow_output: None,
            };
            self.store.upsert_task(task).await?;
        }

        let mut seed = TemplateContext::new();
        seed.insert("input".into(), initial_inputs);

        let target_ids: HashSet<String> = if rerun_predecessors {
            let mut ids: HashSet<String> = graph.ancestors_of(node_id).into_iter().collect();
            ids.insert(node_id.to_string());
            ids
        } else {
            std::iter::once(node_id.to_string()).collect()
        };

        let outcome = self
            .execute_scope_restricted(run.id, &version.definition, seed, &cancellation, None, None, Some(&target_ids))
            .await?;

        let node_outputs = outcome.outputs.get(node_id).cloned();
        self.finalize_run(run.id, outcome).await?;
        node_outputs.ok_or_else(|| EngineError::Custom(format!("node '{node_id}' did not complete")))
    }

    /// Resolve an open pause event and resume execution from where it stopped.
    pub async fn resume_paused(
        self: &Arc<Self>,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        action: ResumeAction,
        inputs: Option<Value>,
        comments: Option<String>,
        user_id: Option<String>,
        cancellation: CancellationToken,
    ) -> Result<Run> {
        let pause_event = self
            .store
            .get_open_pause_event(run_id)
            .await?
            .ok_or_else(|| EngineError::Custom(format!("run '{run_id}' has no open pause event")))?;
        self.store.resolve_pause_event(run_id, action, user_id, comments).await?;

        let paused_task = self
            .store
            .get_task(run_id, &pause_event.node_id, None)
            .await?
            .ok_or_else(|| EngineError::Custom(format!("no task found for paused node '{}'", pause_event.node_id)))?;

        let resolved_outputs = match action {
            ResumeAction::Approve => pause_event.input_data.clone().unwrap_or(Value::Null),
            ResumeAction::Override => inputs.unwrap_or(Value::Null),
            ResumeAction::Decline => Value::Null,
        };

        let resumed_status = if action == ResumeAction::Decline { TaskStatus::Failed } else { TaskStatus::Completed };
        let resumed_task = Task {
            status: resumed_status,
            outputs: if resumed_status == TaskStatus::Completed { Some(resolved_outputs) } else { None },
            error: if resumed_status == TaskStatus::Failed { Some("declined by reviewer".into()) } else { None },
            end_time: Some(chrono::Utc::now()),
            ..paused_task
        };
        self.store.upsert_task(resumed_task).await?;

        self.store.update_run_status(run_id, RunStatus::Running, None).await?;

        let run = self.store.get_run(run_id).await?;
        let mut seed = TemplateContext::new();
        seed.insert("input".into(), run.initial_inputs);
        let outcome = self.execute_scope(run_id, definition, seed, &cancellation, None, None).await?;
        self.finalize_run(run_id, outcome).await
    }

    /// Cancel a run in place.
    pub async fn stop_run(&self, run_id: Uuid, reason: &str) -> Result<Run> {
        self.store.update_run_status(run_id, RunStatus::Canceled, Some(reason.to_string())).await
    }

    /// Report per-task status and overall completion percentage for a run.
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<RunStatusReport> {
        let run = self.store.get_run(run_id).await?;
        let tasks = self.store.list_tasks_for_run(run_id).await?;
        let total = tasks.len().max(1);
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        let views = tasks
            .into_iter()
            .map(|t| TaskStatusView {
                node_id: t.node_id,
                status: t.status,
                outputs: t.outputs,
                error: t.error,
                subworkflow_output: t.subworkflow_output,
            })
            .collect();
        Ok(RunStatusReport { run, percentage_complete: completed as f64 / total as f64, tasks: views })
    }

    async fn execute_scope(
        self: &Arc<Self>,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        seed: TemplateContext,
        cancellation: &CancellationToken,
        parent_task_id: Option<Uuid>,
        session_id: Option<Uuid>,
    ) -> Result<ScopeOutcome> {
        self.execute_scope_restricted(run_id, definition, seed, cancellation, parent_task_id, session_id, None).await
    }

    /// Core readiness loop. When `restrict_to` is `Some`, only those node
    /// ids (and their already-satisfied predecessors) are dispatched —
    /// used by `partial_run`.
    #[allow(clippy::too_many_arguments)]
    async fn execute_scope_restricted(
        self: &Arc<Self>,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        seed: TemplateContext,
        cancellation: &CancellationToken,
        parent_task_id: Option<Uuid>,
        session_id: Option<Uuid>,
        restrict_to: Option<&HashSet<String>>,
    ) -> Result<ScopeOutcome> {
        let graph = CompiledGraph::compile(definition);
        let mut results: HashMap<String, NodeResultRecord> = HashMap::new();
        let mut terminal: HashMap<String, TaskStatus> = HashMap::new();
        // Output nodes canceled because a router picked a different branch
        // don't count against a scope's overall completion — only a node
        // canceled for an actual failure does.
        let mut router_skipped: HashSet<String> = HashSet::new();

        // Resume support: fold in whatever this run has already persisted
        // for this scope (teacher idiom: replay from the last checkpoint
        // rather than keep scope state alive across a pause).
        for task in self.store.list_tasks_for_run(run_id).await? {
            if task.parent_task_id != parent_task_id || !graph.nodes.contains_key(&task.node_id) {
                continue;
            }
            if task.status == TaskStatus::Canceled && task.cancel_reason == Some(CancelReason::Skipped) {
                router_skipped.insert(task.node_id.clone());
            }
            // `partial_run`'s injected predecessor rows are persisted as
            // `Canceled(PartialInput)` (they never ran), but they stand in
            // for a completed predecessor: the scheduler must treat them as
            // a live, resolved value, not as an upstream failure.
            let is_partial_input = task.cancel_reason == Some(CancelReason::PartialInput);
            let effective_status = if is_partial_input { TaskStatus::Completed } else { task.status };
            terminal.insert(task.node_id.clone(), effective_status);
            if effective_status == TaskStatus::Completed {
                let node = graph.node(&task.node_id).expect("node present");
                let outputs = task.outputs.clone().unwrap_or(Value::Null);
                let is_router = node.node_type == ROUTER_NODE_TYPE;
                let router_selected = is_router.then(|| outputs.get("selected").and_then(Value::as_str).map(str::to_string));
                // A router's own resolved inputs (persisted as `Task.inputs`)
                // double as its downstream pass-through value on resume.
                let pass_through = is_router.then(|| strip_reserved_input(task.inputs.clone().unwrap_or(Value::Null)));
                results.insert(task.node_id.clone(), NodeResultRecord { outputs, router_selected, pass_through });
            }
        }

        let mut in_flight: JoinSet<(String, Value, NodeOutcome)> = JoinSet::new();
        let mut dispatched: HashSet<String> = terminal.keys().cloned().collect();

        loop {
            if cancellation.is_canceled() {
                while in_flight.join_next().await.is_some() {}
                return Ok(ScopeOutcome { completed: false, paused: false, canceled: true, outputs: HashMap::new() });
            }

            self.cascade_upstream_failures(run_id, &graph, parent_task_id, &results, &mut terminal, &mut router_skipped).await?;

            let ready = self.find_ready_nodes(&graph, &terminal, &dispatched, restrict_to);
            if ready.is_empty() && in_flight.is_empty() {
                break;
            }

            for node_id in ready {
                dispatched.insert(node_id.clone());
                let node = graph.node(&node_id).expect("ready node exists").clone();
                let descriptor = match self.registry.lookup(&node.node_type) {
                    Ok(d) => d.clone(),
                    Err(e) => {
                        terminal.insert(node_id.clone(), TaskStatus::Failed);
                        self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Failed, None, None, Some(e.to_string()), None)
                            .await?;
                        continue;
                    }
                };

                let inputs_context = self.assemble_inputs(&graph, &node_id, &results, &seed);
                let required = descriptor.executor.required_inputs(&Value::Object(node.config.clone()));
                if required.iter().any(|key| inputs_context.get(key).map(Value::is_null).unwrap_or(true)) {
                    terminal.insert(node_id.clone(), TaskStatus::Canceled);
                    self.persist_task(
                        run_id,
                        &node_id,
                        parent_task_id,
                        TaskStatus::Canceled,
                        None,
                        None,
                        None,
                        Some(CancelReason::Skipped),
                    )
                    .await?;
                    continue;
                }

                let inputs_value = Value::Object(inputs_context.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Running, Some(inputs_value.clone()), None, None, None)
                    .await?;

                let semaphore = self.semaphores.for_category(descriptor.category);
                let scheduler = self.clone();
                let cancellation = cancellation.clone();
                let config = Value::Object(render_config(&node.config, &inputs_context));
                let node_id_owned = node_id.clone();
                let subworkflow = node.subworkflow.clone();

                in_flight.spawn(async move {
                    let permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                    let context = ExecutionContext::new(run_id, node_id_owned.clone(), session_id, cancellation, scheduler)
                        .with_subworkflow(subworkflow);
                    let outcome = descriptor.executor.execute(&config, inputs_value.clone(), &context).await;
                    drop(permit);
                    (node_id_owned, inputs_value, outcome)
                });
            }

            if let Some(finished) = in_flight.join_next().await {
                let (node_id, inputs, outcome) = finished.map_err(|e| EngineError::Custom(format!("task join error: {e}")))?;
                self.record_outcome(run_id, parent_task_id, &graph, &mut results, &mut terminal, node_id, inputs, outcome).await?;
                if let Some(TaskStatus::Paused) = terminal.values().find(|s| **s == TaskStatus::Paused) {
                    while in_flight.join_next().await.is_some() {}
                    return Ok(ScopeOutcome { completed: false, paused: true, canceled: false, outputs: HashMap::new() });
                }
            }
        }

        let mut outputs = HashMap::new();
        let mut all_outputs_present = !graph.output_node_ids.is_empty();
        for output_id in &graph.output_node_ids {
            match results.get(output_id) {
                Some(record) => {
                    outputs.insert(output_id.clone(), record.outputs.clone());
                }
                None if router_skipped.contains(output_id) => {}
                None => all_outputs_present = false,
            }
        }
        if let Some(restrict) = restrict_to {
            for node_id in restrict {
                if let Some(record) = results.get(node_id) {
                    outputs.entry(node_id.clone()).or_insert_with(|| record.outputs.clone());
                }
            }
        }

        Ok(ScopeOutcome { completed: all_outputs_present, paused: false, canceled: false, outputs })
    }

    /// Transitively mark `Canceled` any node whose predecessors have all
    /// resolved but it can never actually run: either a predecessor failed
    /// (`UpstreamFailed`), or every predecessor link is a router handle that
    /// lost (`Skipped`) — spec.md S2's "losing router branch is canceled,
    /// not executed with a null input".
    async fn cascade_upstream_failures(
        &self,
        run_id: Uuid,
        graph: &CompiledGraph,
        parent_task_id: Option<Uuid>,
        results: &HashMap<String, NodeResultRecord>,
        terminal: &mut HashMap<String, TaskStatus>,
        router_skipped: &mut HashSet<String>,
    ) -> Result<()> {
        loop {
            let mut newly_failed = Vec::new();
            let mut newly_skipped = Vec::new();
            for node_id in graph.nodes.keys() {
                if terminal.contains_key(node_id) {
                    continue;
                }
                let predecessors = graph.predecessor_links(node_id);
                if predecessors.is_empty() {
                    continue;
                }
                let all_resolved = predecessors.iter().all(|link| terminal.contains_key(&link.source_id));
                if !all_resolved {
                    continue;
                }
                let any_failed = predecessors
                    .iter()
                    .any(|link| matches!(terminal.get(&link.source_id), Some(TaskStatus::Failed) | Some(TaskStatus::Canceled)));
                if any_failed {
                    newly_failed.push(node_id.clone());
                    continue;
                }
                let none_live = predecessors.iter().all(|link| match results.get(&link.source_id) {
                    Some(record) => match &record.router_selected {
                        Some(selected) => link.source_handle.as_deref() != selected.as_deref(),
                        None => false,
                    },
                    None => false,
                });
                if none_live {
                    newly_skipped.push(node_id.clone());
                }
            }
            if newly_failed.is_empty() && newly_skipped.is_empty() {
                break;
            }
            for node_id in newly_failed {
                terminal.insert(node_id.clone(), TaskStatus::Canceled);
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Canceled, None, None, None, Some(CancelReason::UpstreamFailed))
                    .await?;
            }
            for node_id in newly_skipped {
                terminal.insert(node_id.clone(), TaskStatus::Canceled);
                router_skipped.insert(node_id.clone());
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Canceled, None, None, None, Some(CancelReason::Skipped))
                    .await?;
            }
        }
        Ok(())
    }

    fn find_ready_nodes(
        &self,
        graph: &CompiledGraph,
        terminal: &HashMap<String, TaskStatus>,
        dispatched: &HashSet<String>,
        restrict_to: Option<&HashSet<String>>,
    ) -> Vec<String> {
        let mut ready = Vec::new();
        for node_id in graph.nodes.keys() {
            if dispatched.contains(node_id) || terminal.contains_key(node_id) {
                continue;
            }
            if let Some(restrict) = restrict_to {
                if !restrict.contains(node_id) {
                    continue;
                }
            }
            let predecessors = graph.predecessor_links(node_id);
            let all_resolved = predecessors.iter().all(|link| terminal.get(&link.source_id).map(|s| is_terminal_task(*s)).unwrap_or(false));
            if !all_resolved {
                continue;
            }
            let any_upstream_failed = predecessors
                .iter()
                .any(|link| matches!(terminal.get(&link.source_id), Some(TaskStatus::Failed) | Some(TaskStatus::Canceled)));
            if any_upstream_failed {
                continue; // handled by the upstream-failure cascade below, not dispatched as ready
            }
            ready.push(node_id.clone());
        }
        ready
    }

    fn assemble_inputs(
        &self,
        graph: &CompiledGraph,
        node_id: &str,
        results: &HashMap<String, NodeResultRecord>,
        seed: &TemplateContext,
    ) -> TemplateContext {
        let mut context = seed.clone();
        for link in graph.predecessor_links(node_id) {
            let Some(record) = results.get(&link.source_id) else { continue };
            let value = resolve_link_value(graph, &link.source_id, link, record);
            let key = link.target_handle.clone().unwrap_or_else(|| {
                graph.node(&link.source_id).map(|n| n.title.clone()).unwrap_or_else(|| link.source_id.clone())
            });
            context.insert(key, value);
        }
        context
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_outcome(
        &self,
        run_id: Uuid,
        parent_task_id: Option<Uuid>,
        graph: &CompiledGraph,
        results: &mut HashMap<String, NodeResultRecord>,
        terminal: &mut HashMap<String, TaskStatus>,
        node_id: String,
        inputs: Value,
        outcome: NodeOutcome,
    ) -> Result<()> {
        let node = graph.node(&node_id).cloned();
        match outcome {
            NodeOutcome::Completed(outputs) => {
                debug!(node_id, "node completed");
                let is_router = node.as_ref().map(|n| n.node_type == ROUTER_NODE_TYPE).unwrap_or(false);
                let router_selected = is_router.then(|| outputs.get("selected").and_then(Value::as_str).map(str::to_string));
                // A router's persisted outputs are just `{selected}`; what a
                // router propagates downstream on its winning handle is its
                // own resolved inputs, stripped of the reserved `"input"`
                // echo the same way an `OutputNode` would — otherwise a
                // router's sole consumer sees that echo doubled up.
                let pass_through = is_router.then(|| strip_reserved_input(inputs.clone()));
                terminal.insert(node_id.clone(), TaskStatus::Completed);
                results.insert(node_id.clone(), NodeResultRecord { outputs: outputs.clone(), router_selected, pass_through });
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Completed, None, Some(outputs), None, None).await?;
            }
            NodeOutcome::Failed(error) => {
                warn!(node_id, error, "node failed");
                terminal.insert(node_id.clone(), TaskStatus::Failed);
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Failed, None, None, Some(error), None).await?;
            }
            NodeOutcome::Paused { message, required_fields: _ } => {
                info!(node_id, "node paused for human intervention");
                terminal.insert(node_id.clone(), TaskStatus::Paused);
                self.store
                    .append_pause_event(PauseEvent {
                        id: Uuid::new_v4(),
                        run_id,
                        node_id: node_id.clone(),
                        pause_time: chrono::Utc::now(),
                        pause_message: Some(message),
                        resume_time: None,
                        resume_action: None,
                        resume_user_id: None,
                        input_data: Some(inputs),
                        comments: None,
                    })
                    .await?;
                self.persist_task(run_id, &node_id, parent_task_id, TaskStatus::Paused, None, None, None, None).await?;
                self.store.update_run_status(run_id, RunStatus::Paused, None).await?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_task(
        &self,
        run_id: Uuid,
        node_id: &str,
        parent_task_id: Option<Uuid>,
        status: TaskStatus,
        inputs: Option<Value>,
        outputs: Option<Value>,
        error: Option<String>,
        cancel_reason: Option<CancelReason>,
    ) -> Result<()> {
        let existing = self.store.get_task(run_id, node_id, parent_task_id).await?;
        let (id, start_time) = existing
            .as_ref()
            .map(|t| (t.id, t.start_time))
            .unwrap_or((Uuid::new_v4(), Some(chrono::Utc::now())));
        let outputs = outputs.or_else(|| existing.as_ref().and_then(|t| t.outputs.clone()));
        let task = Task {
            id,
            run_id,
            node_id: node_id.to_string(),
            parent_task_id,
            status,
            inputs: inputs.or_else(|| existing.as_ref().and_then(|t| t.inputs.clone())),
            outputs,
            error,
            cancel_reason,
            start_time,
            end_time: is_terminal_task(status).then(chrono::Utc::now),
            subworkflow_run_id: existing.as_ref().and_then(|t| t.subworkflow_run_id),
            subworkflow_output: existing.as_ref().and_then(|t| t.subworkflow_output.clone()),
        };
        self.store.upsert_task(task).await?;
        Ok(())
    }
}

#[async_trait]
impl SubrunDispatch for Scheduler {
    /// `context.subrun`: construct a fresh dependency
    /// graph over `definition` and run it to completion as a child scope of
    /// the same run, returning its output nodes' outputs by node id.
    async fn run_subworkflow(
        &self,
        parent_run_id: Uuid,
        definition: WorkflowDefinition,
        inputs: Value,
    ) -> Result<HashMap<String, Value>> {
        let scheduler = Arc::new(Self {
            registry: self.registry.clone(),
            store: self.store.clone(),
            semaphores: Semaphores::new(ConcurrencyLimits::default()),
        });
        let mut seed = TemplateContext::new();
        seed.insert("input".into(), inputs);
        let parent_task_id = Some(Uuid::new_v4());
        let outcome = scheduler
            .execute_scope(parent_run_id, &definition, seed, &CancellationToken::new(), parent_task_id, None)
            .await?;
        if !outcome.completed {
            return Err(EngineError::Custom("subworkflow did not complete".into()));
        }
        Ok(outcome.outputs)
    }
}

fn is_terminal_task(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled | TaskStatus::Paused)
}

/// Resolve the value a link propagates downstream from its source node's
/// recorded result, honoring router handle selection.
fn resolve_link_value(
    graph: &CompiledGraph,
    source_id: &str,
    link: &pyspur_store::Link,
    record: &NodeResultRecord,
) -> Value {
    if let Some(selected) = &record.router_selected {
        let is_selected = link.source_handle.as_deref() == selected.as_deref();
        return if is_selected {
            record.pass_through.clone().unwrap_or_else(|| record.outputs.clone())
        } else {
            Value::Null
        };
    }
    let _ = (graph, source_id);
    match &link.source_handle {
        Some(handle) => record.outputs.get(handle).cloned().unwrap_or(Value::Null),
        None => record.outputs.clone(),
    }
}

/// Strip the scheduler's globally-seeded `"input"` echo out of a resolved
/// inputs map, mirroring `OutputNode`'s own unwrap rule: zero remaining
/// keys falls back to the echo itself, one key unwraps directly, more than
/// one keys-by-object. A router's downstream pass-through value goes
/// through this so its sole consumer sees exactly what an `OutputNode`
/// fed the same map would have produced, not that map with the echo
/// still nested one level in.
fn strip_reserved_input(value: Value) -> Value {
    let Value::Object(mut map) = value else { return value };
    let reserved_echo = map.remove("input");
    match map.len() {
        0 => reserved_echo.unwrap_or(Value::Object(map)),
        1 => map.into_values().next().expect("map.len() == 1"),
        _ => Value::Object(map),
    }
}

/// Merge a scope's output-node results into one `Run.outputs` value. A
/// single output node's value is used directly; multiple output nodes are
/// merged into one object keyed by node id (see DESIGN.md for the
/// multi-output-node resolution).
fn merge_outputs(outputs: &HashMap<String, Value>) -> Value {
    if outputs.len() == 1 {
        return outputs.values().next().cloned().unwrap_or(Value::Null);
    }
    Value::Object(outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pyspur_store::{InMemoryTaskStore, SpurType};
    use serde_json::json;

    fn node(id: &str, node_type: &str) -> pyspur_store::Node {
        pyspur_store::Node {
            id: id.into(),
            title: id.into(),
            node_type: node_type.into(),
            config: serde_json::Map::new(),
            coordinates: None,
            parent_id: None,
            subworkflow: None,
        }
    }

    fn link(source: &str, target: &str) -> pyspur_store::Link {
        pyspur_store::Link { source_id: source.into(), target_id: target.into(), source_handle: None, target_handle: None }
    }

    fn test_scheduler() -> Arc<Scheduler> {
        Scheduler::new(Arc::new(NodeRegistry::new()), Arc::new(InMemoryTaskStore::new()), ConcurrencyLimits::default())
    }

    fn record(outputs: Value) -> NodeResultRecord {
        NodeResultRecord { outputs, router_selected: None, pass_through: None }
    }

    #[test]
    fn is_terminal_task_covers_every_terminal_status_not_dispatched_or_ready() {
        assert!(is_terminal_task(TaskStatus::Completed));
        assert!(is_terminal_task(TaskStatus::Failed));
        assert!(is_terminal_task(TaskStatus::Canceled));
        assert!(is_terminal_task(TaskStatus::Paused));
        assert!(!is_terminal_task(TaskStatus::Pending));
        assert!(!is_terminal_task(TaskStatus::Running));
    }

    #[test]
    fn merge_outputs_unwraps_a_single_output_node_and_keys_multiple() {
        let mut single = HashMap::new();
        single.insert("n3".to_string(), json!({"y": 6}));
        assert_eq!(merge_outputs(&single), json!({"y": 6}));

        let mut multiple = HashMap::new();
        multiple.insert("n3".to_string(), json!(1));
        multiple.insert("n4".to_string(), json!(2));
        assert_eq!(merge_outputs(&multiple), json!({"n3": 1, "n4": 2}));
    }

    #[test]
    fn resolve_link_value_honors_plain_handles() {
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", "PythonFunc"), node("n2", "PythonFunc")],
            links: vec![link("n1", "n2")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let plain_link = pyspur_store::Link { source_handle: Some("y".into()), ..link("n1", "n2") };
        let rec = record(json!({"y": 6, "z": 7}));
        assert_eq!(resolve_link_value(&graph, "n1", &plain_link, &rec), json!(6));

        let whole_link = link("n1", "n2");
        assert_eq!(resolve_link_value(&graph, "n1", &whole_link, &rec), json!({"y": 6, "z": 7}));
    }

    #[test]
    fn resolve_link_value_gates_router_pass_through_on_the_winning_handle() {
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", ROUTER_NODE_TYPE), node("n2", "PythonFunc")],
            links: vec![link("n1", "n2")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let mut rec = record(json!({"selected": "pos"}));
        rec.router_selected = Some(Some("pos".into()));
        rec.pass_through = Some(json!({"n": 5}));

        let winning = pyspur_store::Link { source_handle: Some("pos".into()), ..link("n1", "n2") };
        assert_eq!(resolve_link_value(&graph, "n1", &winning, &rec), json!({"n": 5}));

        let losing = pyspur_store::Link { source_handle: Some("neg".into()), ..link("n1", "n2") };
        assert_eq!(resolve_link_value(&graph, "n1", &losing, &rec), Value::Null);
    }

    #[test]
    fn find_ready_nodes_waits_for_every_predecessor_to_resolve() {
        let scheduler = test_scheduler();
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", "Input"), node("n2", "PythonFunc"), node("n3", "PythonFunc")],
            links: vec![link("n1", "n2"), link("n1", "n3"), link("n2", "n3")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let dispatched = HashSet::new();

        let terminal = HashMap::new();
        let mut ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, None);
        ready.sort();
        assert_eq!(ready, vec!["n1".to_string()]);

        let mut terminal = HashMap::new();
        terminal.insert("n1".to_string(), TaskStatus::Completed);
        let mut ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, None);
        ready.sort();
        assert_eq!(ready, vec!["n2".to_string()]);

        terminal.insert("n2".to_string(), TaskStatus::Completed);
        let ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, None);
        assert_eq!(ready, vec!["n3".to_string()]);
    }

    #[test]
    fn find_ready_nodes_skips_nodes_downstream_of_a_failed_predecessor() {
        let scheduler = test_scheduler();
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", "Input"), node("n2", "PythonFunc")],
            links: vec![link("n1", "n2")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let dispatched = HashSet::new();
        let mut terminal = HashMap::new();
        terminal.insert("n1".to_string(), TaskStatus::Failed);

        // n2 is neither ready nor stuck forever: cascade_upstream_failures, not
        // find_ready_nodes, is responsible for resolving it to Canceled.
        let ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, None);
        assert!(ready.is_empty());
    }

    #[tokio::test]
    async fn cascade_upstream_failures_cancels_a_routers_losing_branch_as_skipped() {
        let scheduler = test_scheduler();
        let definition = WorkflowDefinition {
            nodes: vec![node("router", ROUTER_NODE_TYPE), node("pos", "Output"), node("neg", "Output")],
            links: vec![
                pyspur_store::Link { source_handle: Some("pos".into()), ..link("router", "pos") },
                pyspur_store::Link { source_handle: Some("neg".into()), ..link("router", "neg") },
            ],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);

        let mut results = HashMap::new();
        results.insert(
            "router".to_string(),
            NodeResultRecord { outputs: json!({"selected": "pos"}), router_selected: Some(Some("pos".into())), pass_through: Some(json!({"n": 5})) },
        );
        let mut terminal = HashMap::new();
        terminal.insert("router".to_string(), TaskStatus::Completed);
        let mut router_skipped = HashSet::new();

        scheduler.cascade_upstream_failures(Uuid::new_v4(), &graph, None, &results, &mut terminal, &mut router_skipped).await.unwrap();

        assert_eq!(terminal.get("neg"), Some(&TaskStatus::Canceled));
        assert!(!terminal.contains_key("pos"));
        assert!(router_skipped.contains("neg"));
    }

    #[test]
    fn find_ready_nodes_honors_restrict_to_for_partial_reruns() {
        let scheduler = test_scheduler();
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", "Input"), node("n2", "PythonFunc"), node("n3", "PythonFunc")],
            links: vec![],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let dispatched = HashSet::new();
        let terminal = HashMap::new();
        let restrict: HashSet<String> = ["n2".to_string()].into_iter().collect();

        let ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, Some(&restrict));
        assert_eq!(ready, vec!["n2".to_string()]);
    }

    #[test]
    fn assemble_inputs_keys_by_target_handle_or_falls_back_to_source_title() {
        let scheduler = test_scheduler();
        let definition = WorkflowDefinition {
            nodes: vec![node("n1", "Input"), node("n2", "PythonFunc")],
            links: vec![link("n1", "n2")],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        };
        let graph = CompiledGraph::compile(&definition);
        let mut results = HashMap::new();
        results.insert("n1".to_string(), record(json!({"x": 1})));

        let mut seed = TemplateContext::new();
        seed.insert("input".into(), json!({"x": 1}));
        let context = scheduler.assemble_inputs(&graph, "n2", &results, &seed);
        // no target_handle declared, so it falls back to the source node's title ("n1").
        assert_eq!(context.get("n1"), Some(&json!({"x": 1})));
        assert_eq!(context.get("input"), Some(&json!({"x": 1})));

        let mut definition = definition;
        definition.links[0].target_handle = Some("upstream".into());
        let graph = CompiledGraph::compile(&definition);
        let context = scheduler.assemble_inputs(&graph, "n2", &results, &seed);
        assert_eq!(context.get("upstream"), Some(&json!({"x": 1})));
        assert_eq!(context.get("n1"), None);
    }

    proptest! {
        /// For any DAG whose edges only run from a lower-indexed node to a
        /// higher-indexed one (so it's acyclic by construction), repeatedly
        /// draining `find_ready_nodes` and marking what it returns as
        /// `Completed` must visit every node exactly once, and must never
        /// visit a node before all of its predecessors.
        #[test]
        fn find_ready_nodes_drains_any_acyclic_graph_in_topological_order(
            node_count in 1usize..8,
            edge_choices in proptest::collection::vec(any::<bool>(), 0..28),
        ) {
            let scheduler = test_scheduler();
            let nodes: Vec<_> = (0..node_count).map(|i| node(&format!("n{i}"), "PythonFunc")).collect();
            let mut links = Vec::new();
            let mut choice = edge_choices.into_iter();
            for i in 0..node_count {
                for j in (i + 1)..node_count {
                    if choice.next().unwrap_or(false) {
                        links.push(link(&format!("n{i}"), &format!("n{j}")));
                    }
                }
            }
            let definition = WorkflowDefinition { nodes, links, test_inputs: vec![], spur_type: SpurType::Workflow };
            let graph = CompiledGraph::compile(&definition);

            let mut terminal = HashMap::new();
            let dispatched = HashSet::new();
            let mut order = Vec::new();
            loop {
                let ready = scheduler.find_ready_nodes(&graph, &terminal, &dispatched, None);
                if ready.is_empty() {
                    break;
                }
                for id in ready {
                    terminal.insert(id.clone(), TaskStatus::Completed);
                    order.push(id);
                }
            }

            prop_assert_eq!(order.len(), node_count);
            let position: HashMap<&String, usize> = order.iter().enumerate().map(|(i, id)| (id, i)).collect();
            for link in &definition.links {
                prop_assert!(position[&link.source_id] < position[&link.target_id]);
            }
        }
    }
}
