//! `Input` — the run's entry point.
//!
//! Ground: spec.md §4.1 "InputNode". Its outputs ARE the run's
//! `initial_inputs`; for chat runs the Chat Session Adapter
//! (`pyspur-engine::chat`) has already shaped `initial_inputs` into
//! `{ user_message, session_id, message_history }` before the scheduler
//! ever sees it, so this node stays provider-agnostic: it just forwards
//! whatever the scheduler seeded as `"input"`.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};

pub struct InputNode;

#[async_trait]
impl NodeExecutor for InputNode {
    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Input
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("IN", "#2563eb")
    }

    async fn execute(&self, _config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let outputs = inputs.get("input").cloned().unwrap_or(Value::Null);
        NodeOutcome::Completed(outputs)
    }
}
