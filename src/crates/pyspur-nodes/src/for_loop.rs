//! `ForLoop` — iterates a nested subworkflow over an iterable input.
//!
//! Ground: spec.md §4.1 "ForLoop (group)" and §5 "Subworkflows": each
//! iteration runs `context.subworkflow()` once via `context.subrun`, with a
//! fresh child task scope (`parent_task_id`) per the scheduler's own
//! bookkeeping. `config.iterable` names which resolved input holds the
//! sequence to iterate (default `"items"`); `config.concurrency` bounds how
//! many iterations run at once (default 1, serial, for reproducibility —
//! spec.md §5: "iteration fan-out is bounded by a per-loop concurrency
//! limit (config; default 1 — serial — for reproducibility)"). Aggregated
//! results preserve the iterable's natural order regardless of completion
//! order or concurrency.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};

pub struct ForLoopNode;

#[async_trait]
impl NodeExecutor for ForLoopNode {
    fn output_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {"result": {"type": "array"}},
            "required": ["result"]
        }))
    }

    fn has_fixed_output(&self) -> bool {
        true
    }

    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Loop
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("LOOP", "#0891b2")
    }

    async fn execute(&self, config: &Value, inputs: Value, context: &ExecutionContext) -> NodeOutcome {
        let Some(subworkflow) = context.subworkflow() else {
            return NodeOutcome::Failed("ForLoop node has no subworkflow configured".into());
        };
        let iterable_key = config.get("iterable").and_then(Value::as_str).unwrap_or("items");
        let Some(items) = inputs.get(iterable_key).and_then(Value::as_array) else {
            return NodeOutcome::Failed(format!("ForLoop input '{iterable_key}' is not an array"));
        };
        let concurrency = config.get("concurrency").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;

        let mut results: Vec<Option<Value>> = vec![None; items.len()];
        for (chunk_start, chunk) in items.chunks(concurrency).enumerate() {
            if context.cancellation.is_canceled() {
                return NodeOutcome::Failed("ForLoop canceled before completing all iterations".into());
            }
            let base = chunk_start * concurrency;
            let futures = chunk.iter().enumerate().map(|(offset, element)| {
                let index = base + offset;
                let definition = subworkflow.clone();
                let iteration_input = serde_json::json!({ "item": element, "index": index });
                async move { (index, context.subrun(definition, iteration_input).await) }
            });
            for (index, outcome) in join_all(futures).await {
                match outcome {
                    Ok(outputs) => results[index] = Some(crate::single_subworkflow_output(&outputs)),
                    Err(e) => return NodeOutcome::Failed(format!("iteration {index} failed: {e}")),
                }
            }
        }

        let aggregated: Vec<Value> = results.into_iter().map(|r| r.unwrap_or(Value::Null)).collect();
        NodeOutcome::Completed(serde_json::json!({ "result": aggregated }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use serde_json::json;

    #[tokio::test]
    async fn missing_subworkflow_fails() {
        let node = ForLoopNode;
        let outcome = node.execute(&json!({}), json!({"items": [1, 2]}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn non_array_iterable_fails() {
        let node = ForLoopNode;
        let outcome = node.execute(&json!({}), json!({"items": "not-a-list"}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Failed(_)));
    }
}
