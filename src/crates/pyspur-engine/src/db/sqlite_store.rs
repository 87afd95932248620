//! `SqliteTaskStore` — the production [`TaskStore`] backend.
//!
//! Ground: teacher's `db::repositories::workflow_repo::WorkflowRepository`
//! (repository-as-static-method pattern over `sqlx::query`/`query_as`), but
//! consolidated into one struct implementing `pyspur_store::TaskStore`
//! directly rather than one repository struct per entity, since every
//! method here exists purely to satisfy that one trait. Semantics —
//! content-hash version dedup, task upsert idempotency by
//! `(run_id, node_id, parent_task_id)`, terminal-status rejection, and
//! pause-event selection by most-recent `pause_time` — are copied
//! verbatim from `pyspur_store::memory::InMemoryTaskStore`, the reference
//! implementation of the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use pyspur_store::{
    ChatMessageContent, Message, PauseEvent, ResumeAction, Run, RunStatus, RunType, Session, Task, TaskStatus,
    Workflow, WorkflowDefinition, WorkflowVersion,
};
use pyspur_store::error::StoreError;
use pyspur_store::traits::{Page, TaskStore};
use pyspur_store::CancelReason;

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Backend(format!("invalid uuid '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).map_err(|e| StoreError::Backend(format!("invalid timestamp '{s}': {e}")))
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Canceled => "canceled",
    }
}

fn parse_run_status(s: &str) -> Result<RunStatus, StoreError> {
    match s {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "paused" => Ok(RunStatus::Paused),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        "canceled" => Ok(RunStatus::Canceled),
        other => Err(StoreError::Backend(format!("unknown run status '{other}'"))),
    }
}

fn run_type_str(run_type: RunType) -> &'static str {
    match run_type {
        RunType::Interactive => "interactive",
        RunType::Batch => "batch",
        RunType::Partial => "partial",
        RunType::Chat => "chat",
    }
}

fn parse_run_type(s: &str) -> Result<RunType, StoreError> {
    match s {
        "interactive" => Ok(RunType::Interactive),
        "batch" => Ok(RunType::Batch),
        "partial" => Ok(RunType::Partial),
        "chat" => Ok(RunType::Chat),
        other => Err(StoreError::Backend(format!("unknown run type '{other}'"))),
    }
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Canceled => "canceled",
        TaskStatus::Paused => "paused",
    }
}

fn parse_task_status(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "canceled" => Ok(TaskStatus::Canceled),
        "paused" => Ok(TaskStatus::Paused),
        other => Err(StoreError::Backend(format!("unknown task status '{other}'"))),
    }
}

fn cancel_reason_str(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::Skipped => "skipped",
        CancelReason::UpstreamFailed => "upstream_failed",
        CancelReason::RunCanceled => "run_canceled",
        CancelReason::PartialInput => "partial_input",
    }
}

fn parse_cancel_reason(s: &str) -> Result<CancelReason, StoreError> {
    match s {
        "skipped" => Ok(CancelReason::Skipped),
        "upstream_failed" => Ok(CancelReason::UpstreamFailed),
        "run_canceled" => Ok(CancelReason::RunCanceled),
        "partial_input" => Ok(CancelReason::PartialInput),
        other => Err(StoreError::Backend(format!("unknown cancel reason '{other}'"))),
    }
}

fn resume_action_str(action: ResumeAction) -> &'static str {
    match action {
        ResumeAction::Approve => "approve",
        ResumeAction::Decline => "decline",
        ResumeAction::Override => "override",
    }
}

fn parse_resume_action(s: &str) -> Result<ResumeAction, StoreError> {
    match s {
        "approve" => Ok(ResumeAction::Approve),
        "decline" => Ok(ResumeAction::Decline),
        "override" => Ok(ResumeAction::Override),
        other => Err(StoreError::Backend(format!("unknown resume action '{other}'"))),
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<Run, StoreError> {
    Ok(Run {
        id: parse_uuid(row.try_get::<String, _>("id").map_err(backend)?.as_str())?,
        workflow_id: parse_uuid(row.try_get::<String, _>("workflow_id").map_err(backend)?.as_str())?,
        version_id: parse_uuid(row.try_get::<String, _>("version_id").map_err(backend)?.as_str())?,
        status: parse_run_status(&row.try_get::<String, _>("status").map_err(backend)?)?,
        run_type: parse_run_type(&row.try_get::<String, _>("run_type").map_err(backend)?)?,
        initial_inputs: serde_json::from_str(&row.try_get::<String, _>("initial_inputs").map_err(backend)?)?,
        outputs: row
            .try_get::<Option<String>, _>("outputs")
            .map_err(backend)?
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        parent_run_id: row.try_get::<Option<String>, _>("parent_run_id").map_err(backend)?.map(|s| parse_uuid(&s)).transpose()?,
        start_time: parse_time(&row.try_get::<String, _>("start_time").map_err(backend)?)?,
        end_time: row.try_get::<Option<String>, _>("end_time").map_err(backend)?.map(|s| parse_time(&s)).transpose()?,
        error: row.try_get("error").map_err(backend)?,
        cancellation_reason: row.try_get("cancellation_reason").map_err(backend)?,
    })
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StoreError> {
    let subworkflow_output: Option<HashMap<String, Value>> = row
        .try_get::<Option<String>, _>("subworkflow_output")
        .map_err(backend)?
        .map(|s| serde_json::from_str(&s))
        .transpose()?;
    Ok(Task {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(backend)?)?,
        run_id: parse_uuid(&row.try_get::<String, _>("run_id").map_err(backend)?)?,
        node_id: row.try_get("node_id").map_err(backend)?,
        parent_task_id: row.try_get::<Option<String>, _>("parent_task_id").map_err(backend)?.map(|s| parse_uuid(&s)).transpose()?,
        status: parse_task_status(&row.try_get::<String, _>("status").map_err(backend)?)?,
        inputs: row.try_get::<Option<String>, _>("inputs").map_err(backend)?.map(|s| serde_json::from_str(&s)).transpose()?,
        outputs: row.try_get::<Option<String>, _>("outputs").map_err(backend)?.map(|s| serde_json::from_str(&s)).transpose()?,
        error: row.try_get("error").map_err(backend)?,
        cancel_reason: row.try_get::<Option<String>, _>("cancel_reason").map_err(backend)?.map(|s| parse_cancel_reason(&s)).transpose()?,
        start_time: row.try_get::<Option<String>, _>("start_time").map_err(backend)?.map(|s| parse_time(&s)).transpose()?,
        end_time: row.try_get::<Option<String>, _>("end_time").map_err(backend)?.map(|s| parse_time(&s)).transpose()?,
        subworkflow_run_id: row.try_get::<Option<String>, _>("subworkflow_run_id").map_err(backend)?.map(|s| parse_uuid(&s)).transpose()?,
        subworkflow_output,
    })
}

fn row_to_pause_event(row: &sqlx::sqlite::SqliteRow) -> Result<PauseEvent, StoreError> {
    Ok(PauseEvent {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(backend)?)?,
        run_id: parse_uuid(&row.try_get::<String, _>("run_id").map_err(backend)?)?,
        node_id: row.try_get("node_id").map_err(backend)?,
        pause_time: parse_time(&row.try_get::<String, _>("pause_time").map_err(backend)?)?,
        pause_message: row.try_get("pause_message").map_err(backend)?,
        resume_time: row.try_get::<Option<String>, _>("resume_time").map_err(backend)?.map(|s| parse_time(&s)).transpose()?,
        resume_action: row.try_get::<Option<String>, _>("resume_action").map_err(backend)?.map(|s| parse_resume_action(&s)).transpose()?,
        resume_user_id: row.try_get("resume_user_id").map_err(backend)?,
        input_data: row.try_get::<Option<String>, _>("input_data").map_err(backend)?.map(|s| serde_json::from_str(&s)).transpose()?,
        comments: row.try_get("comments").map_err(backend)?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_workflow(&self, name: &str, description: Option<&str>) -> pyspur_store::error::Result<Workflow> {
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            current_version: Uuid::nil(),
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO workflows (id, name, description, current_version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.current_version.to_string())
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(workflow)
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> pyspur_store::error::Result<Workflow> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(workflow_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;
        Ok(Workflow {
            id: parse_uuid(&row.try_get::<String, _>("id").map_err(backend)?)?,
            name: row.try_get("name").map_err(backend)?,
            description: row.try_get("description").map_err(backend)?,
            current_version: parse_uuid(&row.try_get::<String, _>("current_version").map_err(backend)?)?,
            created_at: parse_time(&row.try_get::<String, _>("created_at").map_err(backend)?)?,
            updated_at: parse_time(&row.try_get::<String, _>("updated_at").map_err(backend)?)?,
        })
    }

    async fn put_workflow_version(&self, workflow_id: Uuid, definition: WorkflowDefinition) -> pyspur_store::error::Result<WorkflowVersion> {
        self.get_workflow(workflow_id).await?;
        let hash = definition.content_hash();

        if let Some(row) = sqlx::query("SELECT * FROM workflow_versions WHERE workflow_id = ? AND content_hash = ?")
            .bind(workflow_id.to_string())
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        {
            return Ok(WorkflowVersion {
                id: parse_uuid(&row.try_get::<String, _>("id").map_err(backend)?)?,
                workflow_id,
                definition: serde_json::from_str(&row.try_get::<String, _>("definition").map_err(backend)?)?,
                content_hash: hash,
                created_at: parse_time(&row.try_get::<String, _>("created_at").map_err(backend)?)?,
            });
        }

        let version = WorkflowVersion { id: Uuid::new_v4(), workflow_id, definition, content_hash: hash, created_at: Utc::now() };
        let definition_json = serde_json::to_string(&version.definition)?;
        sqlx::query("INSERT INTO workflow_versions (id, workflow_id, definition, content_hash, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(version.id.to_string())
            .bind(workflow_id.to_string())
            .bind(&definition_json)
            .bind(&version.content_hash)
            .bind(version.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query("UPDATE workflows SET current_version = ?, updated_at = ? WHERE id = ?")
            .bind(version.id.to_string())
            .bind(version.created_at.to_rfc3339())
            .bind(workflow_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(version)
    }

    async fn get_workflow_version(&self, version_id: Uuid) -> pyspur_store::error::Result<WorkflowVersion> {
        let row = sqlx::query("SELECT * FROM workflow_versions WHERE id = ?")
            .bind(version_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::WorkflowNotFound(version_id.to_string()))?;
        Ok(WorkflowVersion {
            id: version_id,
            workflow_id: parse_uuid(&row.try_get::<String, _>("workflow_id").map_err(backend)?)?,
            definition: serde_json::from_str(&row.try_get::<String, _>("definition").map_err(backend)?)?,
            content_hash: row.try_get("content_hash").map_err(backend)?,
            created_at: parse_time(&row.try_get::<String, _>("created_at").map_err(backend)?)?,
        })
    }

    async fn get_current_version(&self, workflow_id: Uuid) -> pyspur_store::error::Result<WorkflowVersion> {
        let current = self.get_workflow(workflow_id).await?.current_version;
        self.get_workflow_version(current).await
    }

    async fn create_run(&self, run: Run) -> pyspur_store::error::Result<Run> {
        sqlx::query(
            "INSERT INTO runs (id, workflow_id, version_id, status, run_type, initial_inputs, outputs, parent_run_id, start_time, end_time, error, cancellation_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.version_id.to_string())
        .bind(run_status_str(run.status))
        .bind(run_type_str(run.run_type))
        .bind(serde_json::to_string(&run.initial_inputs)?)
        .bind(run.outputs.as_ref().map(serde_json::to_string).transpose()?)
        .bind(run.parent_run_id.map(|id| id.to_string()))
        .bind(run.start_time.to_rfc3339())
        .bind(run.end_time.map(|t| t.to_rfc3339()))
        .bind(&run.error)
        .bind(&run.cancellation_reason)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> pyspur_store::error::Result<Run> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::RunNotFound(run_id))?;
        row_to_run(&row)
    }

    async fn update_run_status(&self, run_id: Uuid, status: RunStatus, error: Option<String>) -> pyspur_store::error::Result<Run> {
        let run = self.get_run(run_id).await?;
        if run.status.is_terminal() {
            return Err(StoreError::InvariantViolation(format!("run {run_id} is already in terminal status {:?}", run.status)));
        }
        let end_time = status.is_terminal().then(Utc::now);
        let new_error = error.or(run.error.clone());
        sqlx::query("UPDATE runs SET status = ?, error = COALESCE(?, error), end_time = COALESCE(?, end_time) WHERE id = ?")
            .bind(run_status_str(status))
            .bind(&error)
            .bind(end_time.map(|t| t.to_rfc3339()))
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(Run { status, error: new_error, end_time: end_time.or(run.end_time), ..run })
    }

    async fn set_run_outputs(&self, run_id: Uuid, outputs: Value) -> pyspur_store::error::Result<Run> {
        let run = self.get_run(run_id).await?;
        sqlx::query("UPDATE runs SET outputs = ? WHERE id = ?")
            .bind(serde_json::to_string(&outputs)?)
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(Run { outputs: Some(outputs), ..run })
    }

    async fn list_workflow_runs(&self, workflow_id: Uuid, page: Page) -> pyspur_store::error::Result<Vec<Run>> {
        let rows = sqlx::query("SELECT * FROM runs WHERE workflow_id = ? ORDER BY start_time DESC")
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        let limit = if page.limit == 0 { rows.len() as u64 } else { page.limit };
        rows.iter().skip(page.offset as usize).take(limit as usize).map(row_to_run).collect()
    }

    async fn upsert_task(&self, task: Task) -> pyspur_store::error::Result<Task> {
        // `parent_task_id IS NULL` rows are all distinct under SQLite's NULL
        // semantics for `UNIQUE (run_id, node_id, parent_task_id)`, so an
        // `ON CONFLICT` on that triple never fires for root-scope nodes —
        // branch on the pre-SELECT instead of relying on the constraint.
        let existing = sqlx::query("SELECT id FROM tasks WHERE run_id = ? AND node_id = ? AND parent_task_id IS ?")
            .bind(task.run_id.to_string())
            .bind(&task.node_id)
            .bind(task.parent_task_id.map(|id| id.to_string()))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let id = existing.map(|row| row.try_get::<String, _>("id")).transpose().map_err(backend)?.map(|s| parse_uuid(&s)).transpose()?;
        let stored = Task { id: id.unwrap_or(task.id), ..task };

        if id.is_some() {
            sqlx::query(
                "UPDATE tasks SET status = ?, inputs = ?, outputs = ?, error = ?, cancel_reason = ?,
                    start_time = ?, end_time = ?, subworkflow_run_id = ?, subworkflow_output = ?
                 WHERE id = ?",
            )
            .bind(task_status_str(stored.status))
            .bind(stored.inputs.as_ref().map(serde_json::to_string).transpose()?)
            .bind(stored.outputs.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&stored.error)
            .bind(stored.cancel_reason.map(cancel_reason_str))
            .bind(stored.start_time.map(|t| t.to_rfc3339()))
            .bind(stored.end_time.map(|t| t.to_rfc3339()))
            .bind(stored.subworkflow_run_id.map(|id| id.to_string()))
            .bind(stored.subworkflow_output.as_ref().map(serde_json::to_string).transpose()?)
            .bind(stored.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        } else {
            sqlx::query(
                "INSERT INTO tasks (id, run_id, node_id, parent_task_id, status, inputs, outputs, error, cancel_reason, start_time, end_time, subworkflow_run_id, subworkflow_output)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(stored.id.to_string())
            .bind(stored.run_id.to_string())
            .bind(&stored.node_id)
            .bind(stored.parent_task_id.map(|id| id.to_string()))
            .bind(task_status_str(stored.status))
            .bind(stored.inputs.as_ref().map(serde_json::to_string).transpose()?)
            .bind(stored.outputs.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&stored.error)
            .bind(stored.cancel_reason.map(cancel_reason_str))
            .bind(stored.start_time.map(|t| t.to_rfc3339()))
            .bind(stored.end_time.map(|t| t.to_rfc3339()))
            .bind(stored.subworkflow_run_id.map(|id| id.to_string()))
            .bind(stored.subworkflow_output.as_ref().map(serde_json::to_string).transpose()?)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        }
        Ok(stored)
    }

    async fn get_task(&self, run_id: Uuid, node_id: &str, parent_task_id: Option<Uuid>) -> pyspur_store::error::Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE run_id = ? AND node_id = ? AND parent_task_id IS ?")
            .bind(run_id.to_string())
            .bind(node_id)
            .bind(parent_task_id.map(|id| id.to_string()))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn get_task_by_id(&self, task_id: Uuid) -> pyspur_store::error::Result<Task> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        row_to_task(&row)
    }

    async fn list_tasks_for_run(&self, run_id: Uuid) -> pyspur_store::error::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE run_id = ?").bind(run_id.to_string()).fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn append_pause_event(&self, event: PauseEvent) -> pyspur_store::error::Result<PauseEvent> {
        sqlx::query(
            "INSERT INTO pause_events (id, run_id, node_id, pause_time, pause_message, resume_time, resume_action, resume_user_id, input_data, comments)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.run_id.to_string())
        .bind(&event.node_id)
        .bind(event.pause_time.to_rfc3339())
        .bind(&event.pause_message)
        .bind(event.resume_time.map(|t| t.to_rfc3339()))
        .bind(event.resume_action.map(resume_action_str))
        .bind(&event.resume_user_id)
        .bind(event.input_data.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&event.comments)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(event)
    }

    async fn get_open_pause_event(&self, run_id: Uuid) -> pyspur_store::error::Result<Option<PauseEvent>> {
        let row = sqlx::query(
            "SELECT * FROM pause_events WHERE run_id = ? AND resume_time IS NULL ORDER BY pause_time DESC LIMIT 1",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_pause_event).transpose()
    }

    async fn resolve_pause_event(
        &self,
        run_id: Uuid,
        action: ResumeAction,
        user_id: Option<String>,
        comments: Option<String>,
    ) -> pyspur_store::error::Result<PauseEvent> {
        let open = self.get_open_pause_event(run_id).await?.ok_or(StoreError::PauseEventNotFound(run_id))?;
        let resume_time = Utc::now();
        sqlx::query("UPDATE pause_events SET resume_time = ?, resume_action = ?, resume_user_id = ?, comments = ? WHERE id = ?")
            .bind(resume_time.to_rfc3339())
            .bind(resume_action_str(action))
            .bind(&user_id)
            .bind(&comments)
            .bind(open.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(PauseEvent { resume_time: Some(resume_time), resume_action: Some(action), resume_user_id: user_id, comments, ..open })
    }

    async fn list_pause_events_for_run(&self, run_id: Uuid) -> pyspur_store::error::Result<Vec<PauseEvent>> {
        let rows = sqlx::query("SELECT * FROM pause_events WHERE run_id = ? ORDER BY pause_time ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_pause_event).collect()
    }

    async fn create_session(&self, workflow_id: Uuid, user_id: &str) -> pyspur_store::error::Result<Session> {
        let session = Session { id: Uuid::new_v4(), workflow_id, user_id: user_id.to_string(), messages: vec![] };
        sqlx::query("INSERT INTO sessions (id, workflow_id, user_id) VALUES (?, ?, ?)")
            .bind(session.id.to_string())
            .bind(workflow_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> pyspur_store::error::Result<Session> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let workflow_id = parse_uuid(&row.try_get::<String, _>("workflow_id").map_err(backend)?)?;
        let user_id = row.try_get("user_id").map_err(backend)?;
        let messages = self.list_messages(session_id).await?;
        Ok(Session { id: session_id, workflow_id, user_id, messages })
    }

    async fn append_message(&self, session_id: Uuid, content: ChatMessageContent, run_id: Option<Uuid>) -> pyspur_store::error::Result<Message> {
        // Validate the session exists (mirrors `InMemoryTaskStore`'s `SessionNotFound` behavior).
        sqlx::query("SELECT id FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::SessionNotFound(session_id))?;

        let message = Message { id: Uuid::new_v4(), session_id, run_id, content, created_at: Utc::now() };
        sqlx::query("INSERT INTO messages (id, session_id, run_id, role, content, created_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(message.id.to_string())
            .bind(session_id.to_string())
            .bind(run_id.map(|id| id.to_string()))
            .bind(&message.content.role)
            .bind(&message.content.content)
            .bind(message.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(message)
    }

    async fn list_messages(&self, session_id: Uuid) -> pyspur_store::error::Result<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY created_at ASC")
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|row| {
                Ok(Message {
                    id: parse_uuid(&row.try_get::<String, _>("id").map_err(backend)?)?,
                    session_id,
                    run_id: row.try_get::<Option<String>, _>("run_id").map_err(backend)?.map(|s| parse_uuid(&s)).transpose()?,
                    content: ChatMessageContent {
                        role: row.try_get("role").map_err(backend)?,
                        content: row.try_get("content").map_err(backend)?,
                    },
                    created_at: parse_time(&row.try_get::<String, _>("created_at").map_err(backend)?)?,
                })
            })
            .collect()
    }
}
