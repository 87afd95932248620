//! `HumanIntervention` — always suspends the run for external review.
//!
//! Ground: spec.md §4.1 "HumanInterventionNode" + §5 step 2 ("Append
//! PauseEvent"). The resume policy itself (`APPROVE` replays the pause's
//! `input_data`, `OVERRIDE` substitutes the resume call's `inputs`,
//! `DECLINE` fails the task) lives entirely in
//! `pyspur_core::scheduler::executor::Scheduler::resume_paused` — this node
//! never runs a second time, so its own `execute` only ever needs to report
//! that it wants to pause.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};

pub struct HumanInterventionNode;

#[async_trait]
impl NodeExecutor for HumanInterventionNode {
    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Logic
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("HIL", "#db2777")
    }

    async fn execute(&self, config: &Value, _inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let message = config
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("awaiting human review")
            .to_string();
        NodeOutcome::Paused { message, required_fields: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use serde_json::json;

    #[tokio::test]
    async fn always_pauses() {
        let node = HumanInterventionNode;
        let outcome = node.execute(&json!({}), json!({"input": {}}), &noop_context()).await;
        assert!(outcome.is_paused());
    }
}
