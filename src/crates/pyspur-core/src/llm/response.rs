//! Response types returned by [`crate::llm::ChatModel`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use crate::messages::Message;

/// Extracted reasoning/thinking content, populated when `ReasoningMode`
/// requests it and the provider supports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningContent {
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: Option<u32>,
    pub total_tokens: u32,
}

/// A complete response from [`ChatModel::chat`](crate::llm::ChatModel::chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<UsageMetadata>,
    pub reasoning: Option<ReasoningContent>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageChunk {
    pub content: String,
    pub reasoning: Option<String>,
    pub is_final: bool,
}

/// A streamed response from [`ChatModel::stream`](crate::llm::ChatModel::stream).
///
/// `stream` yields [`MessageChunk`]s as they arrive; `usage` resolves once
/// the final chunk has been produced.
pub struct ChatStreamResponse {
    pub stream: ReceiverStream<MessageChunk>,
}
