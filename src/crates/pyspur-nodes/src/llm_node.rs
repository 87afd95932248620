//! `Llm` — a single chat-model call.
//!
//! Ground: spec.md §4.1 "Agent node: holds tool child nodes and an LLM
//! node" plus SPEC_FULL.md §4.1's `ChatModel` grounding note. This node
//! wraps exactly one `ChatModel::chat` call; the Agent node composes it
//! into a tool-calling loop rather than duplicating request assembly.
//! `config.system_message` is optional; `config.prompt` is the rendered
//! user turn (scheduler-side templating has already substituted
//! `{{ node.field }}` placeholders before `execute` sees this config).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use pyspur_core::llm::{ChatModel, ChatRequest};
use pyspur_core::node::{ExecutionContext, NodeExecutor, NodeManifestCategory, NodeOutcome, VisualTag};
use pyspur_core::Message;

pub struct LlmNode {
    model: Arc<dyn ChatModel>,
}

impl LlmNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl NodeExecutor for LlmNode {
    fn required_inputs(&self, _config: &Value) -> Vec<String> {
        Vec::new()
    }

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
        NodeManifestCategory::Llm
    }

    fn visual_tag(&self) -> VisualTag {
        VisualTag::new("LLM", "#7c3aed")
    }

    async fn execute(&self, config: &Value, _inputs: Value, _context: &ExecutionContext) -> NodeOutcome {
        let Some(prompt) = config.get("prompt").and_then(Value::as_str) else {
            return NodeOutcome::Failed("Llm config missing 'prompt'".into());
        };

        let mut messages = Vec::new();
        if let Some(system) = config.get("system_message").and_then(Value::as_str) {
            messages.push(Message::system(system));
        }
        messages.push(Message::human(prompt));

        let mut request = ChatRequest::new(messages);
        if let Some(temperature) = config.get("temperature").and_then(Value::as_f64) {
            request = request.with_temperature(temperature as f32);
        }
        if let Some(max_tokens) = config.get("max_tokens").and_then(Value::as_u64) {
            request = request.with_max_tokens(max_tokens as usize);
        }

        match self.model.chat(request).await {
            Ok(response) => {
                let text = response.message.text().unwrap_or_default().to_string();
                NodeOutcome::Completed(serde_json::json!({ "response": text }))
            }
            Err(e) => NodeOutcome::Failed(e.to_string()),
        }
    }
}
