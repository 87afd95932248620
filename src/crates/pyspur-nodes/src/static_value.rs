//! `StaticValue` — a node whose output is a constant from its own config.
//!
//! Used by the determinism property test (spec.md §8 property 2) alongside
//! `Input`/`PythonFunc`/`Output` as one of the four node types a
//! deterministic run is built from, and as the injection point for
//! `partial_run`'s synthetic predecessor rows in tests that construct a
//! workflow by hand rather than through `partial_run`'s own machinery.

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeOutcome, VisualTag};

/// `config.value` is emitted verbatim, ignoring inputs entirely.
pub struct StaticValueNode;

#[async_trait]
impl NodeExecutor for StaticValueNode {
    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("VAL", "#9333ea")
    }

    async fn execute(&self, config: &Value, _inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        NodeOutcome::Completed(config.get("value").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use serde_json::json;

    #[tokio::test]
    async fn emits_configured_value_regardless_of_inputs() {
        let node = StaticValueNode;
        let outcome = node.execute(&json!({"value": {"a": 1}}), json!({"ignored": true}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v == json!({"a": 1})));
    }
}
