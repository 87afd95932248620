//! The durable data model: workflows, runs, tasks, pause events, and chat sessions.
//!
//! These types are the currency every other crate in the workspace passes
//! around — the Node Registry resolves [`Node::node_type`], the Scheduler
//! produces [`Task`] rows, the Run Controller mutates [`Run`] rows, and the
//! Chat Session Adapter appends to [`Session::messages`]. Keeping them in the
//! lowest-level crate avoids a dependency cycle between the scheduler and
//! the store it persists through.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One of the three shapes a workflow definition can take.
///
/// Chatbot and agent spurs carry additional validator obligations (see
/// `pyspur-core::validator`) but share the same node/link structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpurType {
    Workflow,
    Chatbot,
    Agent,
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Valid identifier, unique within its scope (root workflow or a subworkflow).
    pub title: String,
    /// Resolves to a registered type in the Node Registry.
    pub node_type: String,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Points at the owning group/agent node if this node is nested.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Present on group/agent nodes; the nested graph they run.
    #[serde(default)]
    pub subworkflow: Option<Box<WorkflowDefinition>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// A directed edge between two nodes.
///
/// For non-router sources, a missing `source_handle`/`target_handle`
/// defaults to the source node's title / the named target field
/// respectively (`pyspur-core::scheduler` resolves the default at
/// input-assembly time, not here, so a [`Link`] can be validated before a
/// registry lookup is available).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

/// The canonical workflow JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub test_inputs: Vec<Value>,
    pub spur_type: SpurType,
}

impl WorkflowDefinition {
    /// Canonical-JSON hash used for version content-addressing.
    ///
    /// `serde_json::to_vec` on a `Map` serializes keys in the order they were
    /// inserted, not lexicographically, so we re-serialize through
    /// `serde_json::Value`'s `BTreeMap`-backed comparison to get a stable
    /// byte sequence regardless of field order in the source JSON.
    pub fn content_hash(&self) -> String {
        let canonical = canonicalize(&serde_json::to_value(self).expect("WorkflowDefinition always serializes"));
        let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Recursively re-keys every object by sorted key, giving a stable
/// serialization regardless of the original field order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// One content-addressed, immutable revision of a [`Workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub definition: WorkflowDefinition,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The durable logical identity of a workflow; versions are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub current_version: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `Run.run_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Interactive,
    Batch,
    Partial,
    Chat,
}

/// `Run.status` lifecycle.
///
/// `PENDING -> RUNNING -> (PAUSED <-> RUNNING) -> (COMPLETED | FAILED | CANCELED)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl RunStatus {
    /// Whether this status is terminal; terminal runs never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub version_id: Uuid,
    pub status: RunStatus,
    pub run_type: RunType,
    pub initial_inputs: Value,
    pub outputs: Option<Value>,
    pub parent_run_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form failure summary; set when `status == Failed` or `Canceled`.
    pub error: Option<String>,
    /// Deadline-exceeded / explicit-stop cancellation reason, if canceled.
    pub cancellation_reason: Option<String>,
}

/// `Task.status` lifecycle.
///
/// `PENDING -> RUNNING -> (COMPLETED | FAILED | CANCELED | PAUSED)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
    Paused,
}

/// Why a [`Task`] ended in [`TaskStatus::Canceled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// A router upstream selected a different route.
    Skipped,
    /// A required input's upstream task failed.
    UpstreamFailed,
    /// The run was stopped externally while this task was still pending.
    RunCanceled,
    /// `rerun_predecessors = false`: a synthetic row standing in for a
    /// caller-supplied `partial_outputs` value (Open Question 2, resolved).
    PartialInput,
}

/// One node's execution record within one run (or one loop iteration).
///
/// At most one per `(run_id, node_id, parent_task_id)` outside loop scopes;
/// loop iterations mint a fresh `parent_task_id` per element so multiple
/// tasks per node are expected there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub run_id: Uuid,
    pub node_id: String,
    pub parent_task_id: Option<Uuid>,
    pub status: TaskStatus,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub cancel_reason: Option<CancelReason>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Present when this task's node is a group/agent/loop; the nested run it spawned.
    pub subworkflow_run_id: Option<Uuid>,
    /// `node_id -> outputs` for each child task of a subworkflow, once it finishes.
    pub subworkflow_output: Option<HashMap<String, Value>>,
}

impl Task {
    pub fn key(&self) -> (Uuid, String, Option<Uuid>) {
        (self.run_id, self.node_id.clone(), self.parent_task_id)
    }
}

/// How a paused run was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    Approve,
    Decline,
    Override,
}

/// A durable record of a human-intervention suspension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub node_id: String,
    pub pause_time: DateTime<Utc>,
    pub pause_message: Option<String>,
    pub resume_time: Option<DateTime<Utc>>,
    pub resume_action: Option<ResumeAction>,
    pub resume_user_id: Option<String>,
    pub input_data: Option<Value>,
    pub comments: Option<String>,
}

impl PauseEvent {
    pub fn is_open(&self) -> bool {
        self.resume_time.is_none()
    }
}

/// One turn in a chat session, threaded into / extracted out of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageContent {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub run_id: Option<Uuid>,
    pub content: ChatMessageContent,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: String,
    /// Ordered by `created_at`; the store is responsible for maintaining order on insert.
    pub messages: Vec<Message>,
}
