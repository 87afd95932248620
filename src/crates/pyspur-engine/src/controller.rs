//! The Run Controller: the in-process public surface over the scheduler
//! and task store (`spec.md` §4.4) plus the Chat Session Adapter (§4.5).
//!
//! Ground: teacher's `orchestrator::services::{workflow, task}` and
//! `orchestrator::execution::{workflow_engine, task_engine}` — the HTTP
//! `api/` layer wrapping these services is dropped, but the service
//! functions themselves (`start_run`, `get_run_status`, `stop_run`,
//! `resume_paused`, `list_workflow_runs`, `partial_run`) are this struct's
//! methods, called directly with no serialization boundary the way the
//! teacher's handlers call its services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use pyspur_core::node::CancellationToken;
use pyspur_core::registry::NodeRegistry;
use pyspur_core::scheduler::{ConcurrencyLimits, RunStatusReport, Scheduler};
use pyspur_core::validator::WorkflowValidator;
use pyspur_store::{
    ChatMessageContent, ResumeAction, Run, RunType, TaskStore, Workflow, WorkflowDefinition,
};
use pyspur_store::traits::Page;

use crate::error::{OrchestratorError, Result};

/// The in-process orchestration surface: one per process (or per test),
/// wrapping a `TaskStore` backend and the node registry it schedules
/// against.
pub struct RunController {
    store: Arc<dyn TaskStore>,
    registry: Arc<NodeRegistry>,
    scheduler: Arc<Scheduler>,
    default_run_deadline: Option<Duration>,
    /// Cancellation handles for runs currently being driven on a background
    /// task, keyed by run id; consulted by `stop_run`.
    active: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl RunController {
    pub fn new(store: Arc<dyn TaskStore>, registry: Arc<NodeRegistry>, limits: ConcurrencyLimits, default_run_deadline: Option<Duration>) -> Arc<Self> {
        let scheduler = Scheduler::new(registry.clone(), store.clone(), limits);
        Arc::new(Self { store, registry, scheduler, default_run_deadline, active: Mutex::new(HashMap::new()) })
    }

    /// Register a brand-new workflow and its first version in one call.
    pub async fn register_workflow(&self, name: &str, description: Option<&str>, definition: WorkflowDefinition) -> Result<Workflow> {
        WorkflowValidator::new(&self.registry).validate(&definition).map_err(|e| OrchestratorError::ValidationFailed(e.to_string()))?;
        let workflow = self.store.create_workflow(name, description).await?;
        self.store.put_workflow_version(workflow.id, definition).await?;
        self.store.get_workflow(workflow.id).await.map_err(Into::into)
    }

    fn track(&self, run_id: Uuid, token: CancellationToken) {
        self.active.lock().expect("active run map lock poisoned").insert(run_id, token);
    }

    fn untrack(&self, run_id: Uuid) {
        self.active.lock().expect("active run map lock poisoned").remove(&run_id);
    }

    /// Start a new run of `workflow_id`'s current version. Returns as soon
    /// as the run is recorded in `RUNNING` status; the scope itself is
    /// driven on a background task, per `spec.md` §9's "the public API is
    /// synchronous (returns IDs); observation is via polling
    /// `get_run_status`" note.
    #[instrument(skip(self, inputs))]
    pub async fn start_run(self: &Arc<Self>, workflow_id: Uuid, inputs: Value, run_type: RunType) -> Result<Run> {
        let workflow = self.store.get_workflow(workflow_id).await.map_err(|_| OrchestratorError::WorkflowNotFound(workflow_id))?;
        let version = self.store.get_current_version(workflow_id).await?;
        WorkflowValidator::new(&self.registry).validate(&version.definition).map_err(|e| OrchestratorError::ValidationFailed(e.to_string()))?;

        let run = self.scheduler.begin_run(&workflow, &version, run_type, inputs, None).await?;
        self.spawn_drive(run.clone(), version.definition, None);
        Ok(run)
    }

    fn spawn_drive(self: &Arc<Self>, run: Run, definition: WorkflowDefinition, session_id: Option<Uuid>) {
        let cancellation = CancellationToken::new();
        self.track(run.id, cancellation.clone());

        if let Some(deadline) = self.default_run_deadline {
            let watcher_token = cancellation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if !watcher_token.is_canceled() {
                    watcher_token.cancel();
                }
            });
        }

        let controller = self.clone();
        let run_id = run.id;
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            let outcome = scheduler.drive_run(run, &definition, cancellation, session_id).await;
            controller.untrack(run_id);
            match outcome {
                Ok(finished) => info!(run_id = %finished.id, status = ?finished.status, "run finished"),
                Err(e) => warn!(run_id = %run_id, error = %e, "run driver failed"),
            }
        });
    }

    /// Re-run from one target node, seeding its declared predecessors'
    /// outputs from `partial_outputs` instead of recomputing them. Blocks
    /// until the target node completes.
    #[instrument(skip(self, inputs, partial_outputs))]
    pub async fn partial_run(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        inputs: Value,
        partial_outputs: HashMap<String, Value>,
        rerun_predecessors: bool,
    ) -> Result<Value> {
        let workflow = self.store.get_workflow(workflow_id).await.map_err(|_| OrchestratorError::WorkflowNotFound(workflow_id))?;
        let version = self.store.get_current_version(workflow_id).await?;
        if !version.definition.nodes.iter().any(|n| n.id == node_id) {
            return Err(OrchestratorError::NodeNotInWorkflow(node_id.to_string()));
        }
        self.scheduler
            .partial_run(&workflow, &version, node_id, inputs, partial_outputs, rerun_predecessors, CancellationToken::new())
            .await
            .map_err(|e| OrchestratorError::ExecutionFailed(e.to_string()))
    }

    pub async fn get_run_status(&self, run_id: Uuid) -> Result<RunStatusReport> {
        self.scheduler.get_run_status(run_id).await.map_err(|_| OrchestratorError::RunNotFound(run_id))
    }

    /// Cancel a run in place: flips its cooperative cancellation signal (if
    /// it is currently being driven on a background task) and marks it
    /// `Canceled` in the store.
    pub async fn stop_run(&self, run_id: Uuid) -> Result<Run> {
        let run = self.store.get_run(run_id).await.map_err(|_| OrchestratorError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(OrchestratorError::NotRunning(run_id));
        }
        if let Some(token) = self.active.lock().expect("active run map lock poisoned").get(&run_id) {
            token.cancel();
        }
        self.scheduler.stop_run(run_id, "stopped by caller").await.map_err(Into::into)
    }

    /// Resolve an open pause event and resume execution from where it
    /// stopped. Blocks until the resumed scope reaches quiescence again.
    pub async fn resume_paused(
        &self,
        run_id: Uuid,
        action: ResumeAction,
        inputs: Option<Value>,
        comments: Option<String>,
        user_id: Option<String>,
    ) -> Result<Run> {
        let run = self.store.get_run(run_id).await.map_err(|_| OrchestratorError::RunNotFound(run_id))?;
        if run.status != pyspur_store::RunStatus::Paused {
            return Err(OrchestratorError::NotPaused(run_id));
        }
        let version = self.store.get_workflow_version(run.version_id).await?;
        self.scheduler
            .resume_paused(run_id, &version.definition, action, inputs, comments, user_id, CancellationToken::new())
            .await
            .map_err(Into::into)
    }

    pub async fn list_workflow_runs(&self, workflow_id: Uuid, page: Page) -> Result<Vec<Run>> {
        self.store.list_workflow_runs(workflow_id, page).await.map_err(Into::into)
    }

    /// Append `message` to a chat session and run the session's workflow
    /// synchronously to completion, returning the assistant's reply.
    ///
    /// Ground: `spec.md` §4.5 steps 1-3.
    pub async fn chat_send(&self, session_id: Uuid, message: &str) -> Result<String> {
        let session = self.store.get_session(session_id).await.map_err(|_| OrchestratorError::SessionNotFound(session_id))?;
        self.store.append_message(session_id, ChatMessageContent { role: "user".to_string(), content: message.to_string() }, None).await?;

        let workflow = self.store.get_workflow(session.workflow_id).await?;
        let version = self.store.get_current_version(session.workflow_id).await?;
        WorkflowValidator::new(&self.registry).validate(&version.definition).map_err(|e| OrchestratorError::ValidationFailed(e.to_string()))?;

        let message_history: Vec<Value> = session
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.content.role, "content": m.content.content}))
            .collect();
        let initial_inputs = serde_json::json!({
            "user_message": message,
            "session_id": session_id,
            "message_history": message_history,
        });

        let run = self
            .scheduler
            .start_run(&workflow, &version, RunType::Chat, initial_inputs, None, Some(session_id), CancellationToken::new())
            .await
            .map_err(|e| OrchestratorError::ExecutionFailed(e.to_string()))?;

        let assistant_message = run
            .outputs
            .as_ref()
            .and_then(|o| o.get("assistant_message"))
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::ExecutionFailed("run completed without an 'assistant_message' output".into()))?
            .to_string();

        self.store
            .append_message(session_id, ChatMessageContent { role: "assistant".to_string(), content: assistant_message.clone() }, Some(run.id))
            .await?;

        Ok(assistant_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyspur_store::memory::InMemoryTaskStore;
    use pyspur_store::{Link, Node, SpurType};
    use serde_json::json;

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        pyspur_nodes::register_builtins(&mut registry, Arc::new(pyspur_core::llm::NullChatModel::new()));
        Arc::new(registry)
    }

    fn straight_line_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: vec![
                Node { id: "in".into(), title: "in".into(), node_type: "Input".into(), config: Default::default(), coordinates: None, parent_id: None, subworkflow: None },
                Node {
                    id: "double".into(),
                    title: "double".into(),
                    node_type: "PythonFunc".into(),
                    config: serde_json::from_value(json!({"outputs": {"y": "input.x * 2"}})).unwrap(),
                    coordinates: None,
                    parent_id: None,
                    subworkflow: None,
                },
                Node { id: "out".into(), title: "out".into(), node_type: "Output".into(), config: Default::default(), coordinates: None, parent_id: None, subworkflow: None },
            ],
            links: vec![
                Link { source_id: "in".into(), target_id: "double".into(), source_handle: None, target_handle: Some("input".into()) },
                Link { source_id: "double".into(), target_id: "out".into(), source_handle: None, target_handle: Some("double".into()) },
            ],
            test_inputs: vec![],
            spur_type: SpurType::Workflow,
        }
    }

    async fn wait_for_terminal(controller: &Arc<RunController>, run_id: Uuid) -> Run {
        for _ in 0..200 {
            let status = controller.get_run_status(run_id).await.unwrap();
            if status.run.status.is_terminal() || status.run.status == pyspur_store::RunStatus::Paused {
                return status.run;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {run_id} did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn start_run_completes_straight_line_workflow() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let controller = RunController::new(store, registry(), ConcurrencyLimits::default(), None);
        let workflow = controller.register_workflow("demo", None, straight_line_workflow()).await.unwrap();

        let run = controller.start_run(workflow.id, json!({"x": 3}), RunType::Interactive).await.unwrap();
        let finished = wait_for_terminal(&controller, run.id).await;

        assert_eq!(finished.status, pyspur_store::RunStatus::Completed);
        assert_eq!(finished.outputs, Some(json!({"y": 6.0})));
    }

    #[tokio::test]
    async fn stop_run_cancels_before_completion() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let controller = RunController::new(store, registry(), ConcurrencyLimits::default(), None);
        let workflow = controller.register_workflow("demo", None, straight_line_workflow()).await.unwrap();
        let run = controller.start_run(workflow.id, json!({"x": 3}), RunType::Interactive).await.unwrap();

        let stopped = controller.stop_run(run.id).await.unwrap();
        assert_eq!(stopped.status, pyspur_store::RunStatus::Canceled);
    }
}
