//! The `TaskStore` abstraction: durable persistence for runs, tasks, pause
//! events, workflow versions, and chat sessions.
//!
//! A single `(run_id, node_id, parent_task_id)` key identifies a task:
//! `upsert_task` is idempotent on that key, so replaying a dispatch loop
//! after a crash updates the existing row instead of duplicating it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Message, PauseEvent, Run, RunStatus, Session, Task, Workflow, WorkflowDefinition, WorkflowVersion,
};
use crate::error::Result;

/// Pagination cursor for `list_workflow_runs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

/// Durable persistence for every entity in `pyspur-store::domain`.
///
/// Implementors MUST persist a mutation before the call returns
///.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // -- Workflows & versions -------------------------------------------------

    async fn create_workflow(&self, name: &str, description: Option<&str>) -> Result<Workflow>;

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow>;

    /// Append a new version. If a version with the same `content_hash`
    /// already exists for this workflow, returns the existing version
    /// instead of creating a duplicate (content-addressed dedup).
    async fn put_workflow_version(&self, workflow_id: Uuid, definition: WorkflowDefinition) -> Result<WorkflowVersion>;

    async fn get_workflow_version(&self, version_id: Uuid) -> Result<WorkflowVersion>;

    /// The workflow's current (most recently created) version.
    async fn get_current_version(&self, workflow_id: Uuid) -> Result<WorkflowVersion>;

    // -- Runs ------------------------------------------------------------------

    async fn create_run(&self, run: Run) -> Result<Run>;

    async fn get_run(&self, run_id: Uuid) -> Result<Run>;

    /// Transition `run_id`'s status; sets `end_time` automatically when the
    /// new status is terminal. Fails with `InvariantViolation` if `run_id`
    /// is already in a terminal status.
    async fn update_run_status(&self, run_id: Uuid, status: RunStatus, error: Option<String>) -> Result<Run>;

    async fn set_run_outputs(&self, run_id: Uuid, outputs: serde_json::Value) -> Result<Run>;

    async fn list_workflow_runs(&self, workflow_id: Uuid, page: Page) -> Result<Vec<Run>>;

    // -- Tasks -------------------------------------------------------------------

    /// Idempotent upsert keyed by `(run_id, node_id, parent_task_id)`: a
    /// second call with the same key updates the existing row in place
    /// rather than inserting a duplicate.
    async fn upsert_task(&self, task: Task) -> Result<Task>;

    async fn get_task(&self, run_id: Uuid, node_id: &str, parent_task_id: Option<Uuid>) -> Result<Option<Task>>;

    async fn get_task_by_id(&self, task_id: Uuid) -> Result<Task>;

    async fn list_tasks_for_run(&self, run_id: Uuid) -> Result<Vec<Task>>;

    // -- Pause events -------------------------------------------------------------

    async fn append_pause_event(&self, event: PauseEvent) -> Result<PauseEvent>;

    /// The currently open (unresumed) pause event for a run, if any.
    async fn get_open_pause_event(&self, run_id: Uuid) -> Result<Option<PauseEvent>>;

    /// Close the open pause event for a run with the resume decision.
    async fn resolve_pause_event(
        &self,
        run_id: Uuid,
        action: crate::domain::ResumeAction,
        user_id: Option<String>,
        comments: Option<String>,
    ) -> Result<PauseEvent>;

    async fn list_pause_events_for_run(&self, run_id: Uuid) -> Result<Vec<PauseEvent>>;

    // -- Chat sessions -------------------------------------------------------------

    async fn create_session(&self, workflow_id: Uuid, user_id: &str) -> Result<Session>;

    async fn get_session(&self, session_id: Uuid) -> Result<Session>;

    /// Append a message; the store assigns `created_at` and maintains order.
    async fn append_message(
        &self,
        session_id: Uuid,
        content: crate::domain::ChatMessageContent,
        run_id: Option<Uuid>,
    ) -> Result<Message>;

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>>;
}
