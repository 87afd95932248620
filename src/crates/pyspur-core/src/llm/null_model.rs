//! A deterministic [`ChatModel`] test double.
//!
//! No concrete provider client ships in this crate (Non-goal: node
//! implementation internals). `NullChatModel` stands in for one in tests
//! and examples: it echoes the last human message back as a terminal
//! assistant turn and never emits tool calls, so an Agent node wired
//! against it always completes in one iteration.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::config::ChatRequest;
use crate::llm::response::{ChatResponse, ChatStreamResponse, UsageMetadata};
use crate::llm::traits::ChatModel;
use crate::messages::{Message, MessageRole};

#[derive(Debug, Clone, Default)]
pub struct NullChatModel {
    /// Fixed reply text; when `None`, echoes the last human message instead.
    pub fixed_reply: Option<String>,
}

impl NullChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self { fixed_reply: Some(reply.into()) }
    }
}

#[async_trait]
impl ChatModel for NullChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let reply = self.fixed_reply.clone().unwrap_or_else(|| {
            request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Human)
                .and_then(|m| m.text())
                .map(str::to_string)
                .unwrap_or_default()
        });
        Ok(ChatResponse {
            message: Message::assistant(reply),
            usage: Some(UsageMetadata::default()),
            reasoning: None,
            metadata: Default::default(),
        })
    }

    async fn stream(&self, _request: ChatRequest) -> Result<ChatStreamResponse> {
        Err(crate::error::EngineError::Custom("NullChatModel does not support streaming".into()))
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_last_human_message() {
        let model = NullChatModel::new();
        let request = ChatRequest::new(vec![Message::system("sys"), Message::human("hello there")]);
        let response = model.chat(request).await.unwrap();
        assert_eq!(response.message.text(), Some("hello there"));
    }

    #[tokio::test]
    async fn fixed_reply_overrides_echo() {
        let model = NullChatModel::with_reply("fixed");
        let response = model.chat(ChatRequest::new(vec![Message::human("ignored")])).await.unwrap();
        assert_eq!(response.message.text(), Some("fixed"));
    }
}
