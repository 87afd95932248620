//! Conversational message types shared by LLM and Agent nodes.
//!
//! Distinct from `pyspur_store::domain::Message`, which is a durable chat
//! transcript row keyed by session. This `Message` is the short-lived,
//! in-memory unit the [`crate::llm::ChatModel`] trait and the Agent node's
//! tool-call loop pass around while a task is running; it is flattened into
//! a `pyspur_store::domain::ChatMessageContent` only when the Chat Session
//! Adapter persists a turn.

use serde::{Deserialize, Serialize};

use crate::llm::tools::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Json(serde_json::Value),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s.as_str()),
            MessageContent::Json(_) => None,
        }
    }
}

/// One turn in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Provider-assigned id, when the provider returns one (assistant turns).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: MessageContent,
    /// Name of the tool this message reports results for, when `role == Tool`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The `ToolCall::id` this message answers, when `role == Tool`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::Tool,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            metadata: None,
        }
    }

    fn new(role: MessageRole, text: String) -> Self {
        Self {
            id: None,
            role,
            content: MessageContent::Text(text),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    /// The message's text content, when it carries plain text.
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_expected_roles() {
        assert_eq!(Message::system("hi").role, MessageRole::System);
        assert_eq!(Message::human("hi").role, MessageRole::Human);
        assert_eq!(Message::assistant("hi").role, MessageRole::Assistant);
        let tool_msg = Message::tool("call_1", "42");
        assert_eq!(tool_msg.role, MessageRole::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn text_roundtrips_through_content() {
        let msg = Message::human("What is 2 + 2?");
        assert_eq!(msg.text(), Some("What is 2 + 2?"));
    }
}
