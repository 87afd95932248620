//! `InMemoryTaskStore` — a reference `TaskStore` implementation backed by a
//! single `Mutex`-guarded set of maps.
//!
//! One lock, plain `HashMap`s: it exists to make the unit test suite fast
//! and dependency-free, not to be a production backend. `pyspur-engine`
//! supplies the SQLite-backed implementation used in production.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    ChatMessageContent, Message, PauseEvent, ResumeAction, Run, RunStatus, Session, Task, Workflow,
    WorkflowDefinition, WorkflowVersion,
};
use crate::error::{Result, StoreError};
use crate::traits::{Page, TaskStore};

#[derive(Default)]
struct State {
    workflows: HashMap<Uuid, Workflow>,
    versions: HashMap<Uuid, WorkflowVersion>,
    runs: HashMap<Uuid, Run>,
    tasks: HashMap<Uuid, Task>,
    task_index: HashMap<(Uuid, String, Option<Uuid>), Uuid>,
    pause_events: HashMap<Uuid, PauseEvent>,
    sessions: HashMap<Uuid, Session>,
}

/// A process-local, non-persistent [`TaskStore`].
pub struct InMemoryTaskStore {
    state: Mutex<State>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("pyspur-store in-memory lock poisoned")
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_workflow(&self, name: &str, description: Option<&str>) -> Result<Workflow> {
        let mut state = self.lock();
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            // No version yet; caller must `put_workflow_version` next.
            current_version: Uuid::nil(),
            created_at: now,
            updated_at: now,
        };
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow> {
        self.lock()
            .workflows
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn put_workflow_version(&self, workflow_id: Uuid, definition: WorkflowDefinition) -> Result<WorkflowVersion> {
        let hash = definition.content_hash();
        let mut state = self.lock();

        if !state.workflows.contains_key(&workflow_id) {
            return Err(StoreError::WorkflowNotFound(workflow_id.to_string()));
        }

        if let Some(existing) = state
            .versions
            .values()
            .find(|v| v.workflow_id == workflow_id && v.content_hash == hash)
        {
            return Ok(existing.clone());
        }

        let version = WorkflowVersion {
            id: Uuid::new_v4(),
            workflow_id,
            definition,
            content_hash: hash,
            created_at: Utc::now(),
        };
        state.versions.insert(version.id, version.clone());
        if let Some(wf) = state.workflows.get_mut(&workflow_id) {
            wf.current_version = version.id;
            wf.updated_at = version.created_at;
        }
        Ok(version)
    }

    async fn get_workflow_version(&self, version_id: Uuid) -> Result<WorkflowVersion> {
        self.lock()
            .versions
            .get(&version_id)
            .cloned()
            .ok_or_else(|| StoreError::WorkflowNotFound(version_id.to_string()))
    }

    async fn get_current_version(&self, workflow_id: Uuid) -> Result<WorkflowVersion> {
        let current = self.get_workflow(workflow_id).await?.current_version;
        self.get_workflow_version(current).await
    }

    async fn create_run(&self, run: Run) -> Result<Run> {
        let mut state = self.lock();
        state.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        self.lock().runs.get(&run_id).cloned().ok_or(StoreError::RunNotFound(run_id))
    }

    async fn update_run_status(&self, run_id: Uuid, status: RunStatus, error: Option<String>) -> Result<Run> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&run_id).ok_or(StoreError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(StoreError::InvariantViolation(format!(
                "run {run_id} is already in terminal status {:?}",
                run.status
            )));
        }
        run.status = status;
        if error.is_some() {
            run.error = error;
        }
        if status.is_terminal() {
            run.end_time = Some(Utc::now());
        }
        Ok(run.clone())
    }

    async fn set_run_outputs(&self, run_id: Uuid, outputs: serde_json::Value) -> Result<Run> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&run_id).ok_or(StoreError::RunNotFound(run_id))?;
        run.outputs = Some(outputs);
        Ok(run.clone())
    }

    async fn list_workflow_runs(&self, workflow_id: Uuid, page: Page) -> Result<Vec<Run>> {
        let state = self.lock();
        let mut runs: Vec<Run> = state.runs.values().filter(|r| r.workflow_id == workflow_id).cloned().collect();
        runs.sort_by_key(|r| r.start_time);
        runs.reverse();
        let limit = if page.limit == 0 { runs.len() as u64 } else { page.limit };
        Ok(runs.into_iter().skip(page.offset as usize).take(limit as usize).collect())
    }

    async fn upsert_task(&self, task: Task) -> Result<Task> {
        let mut state = self.lock();
        let key = task.key();
        if let Some(existing_id) = state.task_index.get(&key).copied() {
            let mut stored = task;
            stored.id = existing_id;
            state.tasks.insert(existing_id, stored.clone());
            Ok(stored)
        } else {
            state.task_index.insert(key, task.id);
            state.tasks.insert(task.id, task.clone());
            Ok(task)
        }
    }

    async fn get_task(&self, run_id: Uuid, node_id: &str, parent_task_id: Option<Uuid>) -> Result<Option<Task>> {
        let state = self.lock();
        let key = (run_id, node_id.to_string(), parent_task_id);
        Ok(state.task_index.get(&key).and_then(|id| state.tasks.get(id)).cloned())
    }

    async fn get_task_by_id(&self, task_id: Uuid) -> Result<Task> {
        self.lock()
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    async fn list_tasks_for_run(&self, run_id: Uuid) -> Result<Vec<Task>> {
        Ok(self.lock().tasks.values().filter(|t| t.run_id == run_id).cloned().collect())
    }

    async fn append_pause_event(&self, event: PauseEvent) -> Result<PauseEvent> {
        let mut state = self.lock();
        state.pause_events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_open_pause_event(&self, run_id: Uuid) -> Result<Option<PauseEvent>> {
        Ok(self
            .lock()
            .pause_events
            .values()
            .filter(|e| e.run_id == run_id && e.is_open())
            .max_by_key(|e| e.pause_time)
            .cloned())
    }

    async fn resolve_pause_event(
        &self,
        run_id: Uuid,
        action: ResumeAction,
        user_id: Option<String>,
        comments: Option<String>,
    ) -> Result<PauseEvent> {
        let mut state = self.lock();
        let open_id = state
            .pause_events
            .values()
            .filter(|e| e.run_id == run_id && e.is_open())
            .max_by_key(|e| e.pause_time)
            .map(|e| e.id)
            .ok_or(StoreError::PauseEventNotFound(run_id))?;
        let event = state.pause_events.get_mut(&open_id).expect("open_id just looked up");
        event.resume_time = Some(Utc::now());
        event.resume_action = Some(action);
        event.resume_user_id = user_id;
        event.comments = comments;
        Ok(event.clone())
    }

    async fn list_pause_events_for_run(&self, run_id: Uuid) -> Result<Vec<PauseEvent>> {
        let mut events: Vec<PauseEvent> = self.lock().pause_events.values().filter(|e| e.run_id == run_id).cloned().collect();
        events.sort_by_key(|e| e.pause_time);
        Ok(events)
    }

    async fn create_session(&self, workflow_id: Uuid, user_id: &str) -> Result<Session> {
        let mut state = self.lock();
        let session = Session { id: Uuid::new_v4(), workflow_id, user_id: user_id.to_string(), messages: vec![] };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        self.lock().sessions.get(&session_id).cloned().ok_or(StoreError::SessionNotFound(session_id))
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        content: ChatMessageContent,
        run_id: Option<Uuid>,
    ) -> Result<Message> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(&session_id).ok_or(StoreError::SessionNotFound(session_id))?;
        let message = Message { id: Uuid::new_v4(), session_id, run_id, content, created_at: Utc::now() };
        session.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.get_session(session_id).await?.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CancelReason, RunType, SpurType, TaskStatus};

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition { nodes: vec![], links: vec![], test_inputs: vec![], spur_type: SpurType::Workflow }
    }

    #[tokio::test]
    async fn workflow_version_dedup_by_content_hash() {
        let store = InMemoryTaskStore::new();
        let wf = store.create_workflow("demo", None).await.unwrap();
        let v1 = store.put_workflow_version(wf.id, sample_definition()).await.unwrap();
        let v2 = store.put_workflow_version(wf.id, sample_definition()).await.unwrap();
        assert_eq!(v1.id, v2.id, "identical definitions must dedup to the same version");
    }

    #[tokio::test]
    async fn task_upsert_is_idempotent_by_scope_key() {
        let store = InMemoryTaskStore::new();
        let run_id = Uuid::new_v4();
        let t1 = Task {
            id: Uuid::new_v4(),
            run_id,
            node_id: "n1".into(),
            parent_task_id: None,
            status: TaskStatus::Running,
            inputs: None,
            outputs: None,
            error: None,
            cancel_reason: None,
            start_time: Some(Utc::now()),
            end_time: None,
            subworkflow_run_id: None,
            subworkflow_output: None,
        };
        let stored1 = store.upsert_task(t1.clone()).await.unwrap();

        let mut t2 = t1.clone();
        t2.id = Uuid::new_v4();
        t2.status = TaskStatus::Completed;
        let stored2 = store.upsert_task(t2).await.unwrap();

        assert_eq!(stored1.id, stored2.id, "second upsert on the same scope key must reuse the row");
        assert_eq!(store.list_tasks_for_run(run_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_status_cannot_leave_terminal() {
        let store = InMemoryTaskStore::new();
        let wf = store.create_workflow("demo", None).await.unwrap();
        let version = store.put_workflow_version(wf.id, sample_definition()).await.unwrap();
        let run = Run {
            id: Uuid::new_v4(),
            workflow_id: wf.id,
            version_id: version.id,
            status: RunStatus::Running,
            run_type: RunType::Interactive,
            initial_inputs: serde_json::json!({}),
            outputs: None,
            parent_run_id: None,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            cancellation_reason: None,
        };
        store.create_run(run.clone()).await.unwrap();
        store.update_run_status(run.id, RunStatus::Completed, None).await.unwrap();
        let err = store.update_run_status(run.id, RunStatus::Running, None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn pause_event_round_trip() {
        let store = InMemoryTaskStore::new();
        let run_id = Uuid::new_v4();
        store
            .append_pause_event(PauseEvent {
                id: Uuid::new_v4(),
                run_id,
                node_id: "human".into(),
                pause_time: Utc::now(),
                pause_message: Some("approve?".into()),
                resume_time: None,
                resume_action: None,
                resume_user_id: None,
                input_data: Some(serde_json::json!({"msg": "ok"})),
                comments: None,
            })
            .await
            .unwrap();

        assert!(store.get_open_pause_event(run_id).await.unwrap().is_some());
        let resolved = store
            .resolve_pause_event(run_id, ResumeAction::Approve, Some("user-1".into()), None)
            .await
            .unwrap();
        assert_eq!(resolved.resume_action, Some(ResumeAction::Approve));
        assert!(store.get_open_pause_event(run_id).await.unwrap().is_none());
    }

    #[test]
    fn cancel_reason_variants_serialize_snake_case() {
        let json = serde_json::to_string(&CancelReason::UpstreamFailed).unwrap();
        assert_eq!(json, "\"upstream_failed\"");
    }
}
