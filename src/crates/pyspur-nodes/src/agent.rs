//! `Agent` — a tool-calling LLM loop.
//!
//! Ground: spec.md §4.1 "Agent node: holds tool child nodes and an LLM
//! node; repeatedly invokes the LLM with tool descriptors until the model
//! emits a terminal response or an iteration cap is reached," and
//! SPEC_FULL.md §9 Open Question 3 (`max_iterations` OR a self-declared
//! stop, whichever comes first; exceeding the cap is a failure, not a
//! silent truncation).
//!
//! Each declared tool is a self-contained `config.tools[]` entry carrying
//! its own one-shot `subworkflow`, dispatched directly through
//! `context.subrun` by name when the model requests it — the agent loop
//! needs to invoke an arbitrary tool by name on any iteration, which
//! doesn't fit the "subworkflow is one atomic unit per node dispatch"
//! contract [`crate::for_loop::ForLoopNode`]/[`crate::tool::ToolNode`] use,
//! so tools live in `config` rather than on `context.subworkflow()`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use pyspur_core::llm::{ChatModel, ChatRequest, ToolDefinition, ToolResult};
use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};
use pyspur_core::Message;
use pyspur_store::WorkflowDefinition;

const DEFAULT_MAX_ITERATIONS: u64 = 10;

#[derive(Deserialize)]
struct ToolSpec {
    name: String,
    description: String,
    #[serde(default)]
    parameters: Option<Value>,
    subworkflow: WorkflowDefinition,
}

pub struct AgentNode {
    model: Arc<dyn ChatModel>,
}

impl AgentNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl NodeExecutor for AgentNode {
    fn output_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {"response": {"type": "string"}},
            "required": ["response"]
        }))
    }

    fn has_fixed_output(&self) -> bool {
        true
    }

    fn manifest_category(&self) -> NodeManifestCategory {
        NodeManifestCategory::Agent
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("AGT", "#be123c")
    }

    async fn execute(&self, config: &Value, inputs: Value, context: &ExecutionContext) -> NodeOutcome {
        let Some(prompt) = inputs
            .get("message")
            .or_else(|| inputs.get("input"))
            .and_then(Value::as_str)
        else {
            return NodeOutcome::Failed("Agent node requires a string 'message' (or 'input') in its inputs".into());
        };

        let tools: Vec<ToolSpec> = match config.get("tools").and_then(Value::as_array) {
            Some(array) => {
                let mut parsed = Vec::with_capacity(array.len());
                for entry in array {
                    match serde_json::from_value(entry.clone()) {
                        Ok(spec) => parsed.push(spec),
                        Err(e) => return NodeOutcome::Failed(format!("invalid tool spec: {e}")),
                    }
                }
                parsed
            }
            None => Vec::new(),
        };
        let tool_definitions: Vec<ToolDefinition> = tools
            .iter()
            .map(|t| {
                let mut def = ToolDefinition::new(t.name.clone(), t.description.clone());
                if let Some(parameters) = t.parameters.clone() {
                    def = def.with_parameters(parameters);
                }
                def
            })
            .collect();

        let max_iterations = config.get("max_iterations").and_then(Value::as_u64).unwrap_or(DEFAULT_MAX_ITERATIONS);

        let mut messages = Vec::new();
        if let Some(system) = config.get("system_message").and_then(Value::as_str) {
            messages.push(Message::system(system));
        }
        messages.push(Message::human(prompt));

        for _ in 0..max_iterations {
            if context.cancellation.is_canceled() {
                return NodeOutcome::Failed("Agent node canceled mid-loop".into());
            }
            let request = ChatRequest::new(messages.clone()).with_tools(tool_definitions.clone());
            let response = match self.model.chat(request).await {
                Ok(r) => r,
                Err(e) => return NodeOutcome::Failed(e.to_string()),
            };

            let tool_calls = response.message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                let text = response.message.text().unwrap_or_default().to_string();
                return NodeOutcome::Completed(serde_json::json!({ "response": text }));
            }

            messages.push(response.message);
            for call in tool_calls {
                let result = match tools.iter().find(|t| t.name == call.name) {
                    Some(tool) => match context.subrun(tool.subworkflow.clone(), call.arguments.clone()).await {
                        Ok(outputs) => ToolResult::success(&call.id, crate::single_subworkflow_output(&outputs)),
                        Err(e) => ToolResult::error(&call.id, e.to_string()),
                    },
                    None => ToolResult::error(&call.id, format!("unknown tool '{}'", call.name)),
                };
                messages.push(Message::tool(&call.id, result.to_json_string()));
            }
        }

        NodeOutcome::Failed(format!("Agent node exceeded max_iterations ({max_iterations}) without a terminal response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noop_context;
    use pyspur_core::llm::NullChatModel;
    use serde_json::json;

    #[tokio::test]
    async fn terminal_response_with_no_tools_completes() {
        let node = AgentNode::new(Arc::new(NullChatModel::new()));
        let outcome = node.execute(&json!({}), json!({"message": "hello"}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v["response"] == json!("hello")));
    }

    #[tokio::test]
    async fn missing_message_input_fails() {
        let node = AgentNode::new(Arc::new(NullChatModel::new()));
        let outcome = node.execute(&json!({}), json!({}), &noop_context()).await;
        assert!(matches!(outcome, NodeOutcome::Failed(_)));
    }
}
