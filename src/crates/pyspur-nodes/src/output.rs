//! `Output` — a workflow's (or a loop body's) terminal node.
//!
//! Ground: spec.md §4.1 "OutputNode": "its inputs become the run's
//! outputs." The scheduler always seeds every node's resolved-input map
//! with a reserved `"input"` key (the run's global `initial_inputs`, so
//! any node's config can reference `{{ input.field }}` regardless of its
//! position in the graph — spec.md §4.3 "Input assembly"), in addition to
//! whatever real predecessors are wired in. That reserved echo must never
//! leak into, or change the shape of, what an OutputNode emits: with
//! exactly one real (non-`"input"`) predecessor — the common case (spec.md
//! §8 S1/S3/S4) — its value is unwrapped directly; with zero real
//! predecessors (an OutputNode wired straight to the InputNode) the
//! `"input"` echo itself is unwrapped; only with more than one real
//! predecessor does this fall back to a keyed merge.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};

const RESERVED_INPUT_KEY: &str = "input";

pub struct OutputNode;

#[async_trait]
impl NodeExecutor for OutputNode {
    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Output
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("OUT", "#16a34a")
    }

    async fn execute(&self, _config: &Value, inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let Value::Object(mut map) = inputs else {
            return NodeOutcome::Completed(inputs);
        };
        let reserved_echo = map.remove(RESERVED_INPUT_KEY);
        match map.len() {
            0 => NodeOutcome::Completed(reserved_echo.unwrap_or(Value::Object(map))),
            1 => NodeOutcome::Completed(map.into_values().next().expect("map.len() == 1")),
            _ => NodeOutcome::Completed(Value::Object(map)),
        }
    }
}
