//! `Tool` — a standalone graph node whose body is a nested subworkflow.
//!
//! Ground: spec.md §4.1's node type list (Tool is listed alongside
//! ForLoop/Agent as a group node) and SPEC_FULL.md §4.1's note that
//! tool-calling nodes reuse the teacher's `Tool` trait/vocabulary
//! generalized "from ad hoc closures to graph nodes with a declared
//! input/output schema." Unlike [`crate::agent::AgentNode`]'s tools (which
//! embed their subworkflow directly in `config` so the agent loop can
//! invoke any of several by name), a `Tool` node used directly in a DAG
//! runs its one nested subworkflow — carried on the node itself via
//! [`pyspur_core::node::ExecutionContext::subworkflow`] — exactly once per
//! dispatch, the same atomic-unit contract [`crate::for_loop::ForLoopNode`]
//! uses for each iteration.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};

pub struct ToolNode;

#[async_trait]
impl NodeExecutor for ToolNode {
    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Integration
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("TL", "#65a30d")
    }

    async fn execute(&self, _config: &Value, inputs: Value, context: &ExecutionContext) -> NodeOutcome {
        let Some(subworkflow) = context.subworkflow() else {
            return NodeOutcome::Failed("Tool node has no subworkflow configured".into());
        };
        match context.subrun(subworkflow.clone(), inputs).await {
            Ok(outputs) => NodeOutcome::Completed(crate::single_subworkflow_output(&outputs)),
            Err(e) => NodeOutcome::Failed(e.to_string()),
        }
    }
}
