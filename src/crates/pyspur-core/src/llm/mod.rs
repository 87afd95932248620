//! LLM integration traits and types.
//!
//! This module provides **traits** for integrating LLM providers with the
//! engine. Concrete provider clients (OpenAI, Anthropic, Ollama, ...) are
//! out of scope for this crate; callers implement [`ChatModel`] for
//! whichever provider backs their `LLM` and `Agent` nodes.
//!
//! # Architecture Philosophy
//!
//! - Core library provides **traits** and types
//! - **Users implement** `ChatModel` for their LLM provider
//! - Framework remains provider-agnostic
//! - Focus on workflow execution, not API integration
//!
//! # Supported LLM Types
//!
//! The trait architecture supports all categories of LLMs:
//!
//! ## Thinking Models
//! Models with extended reasoning (OpenAI o1, DeepSeek R1, etc.)
//! - Use [`ReasoningMode::Separated`] to access thinking process
//! - Access via `response.reasoning.content`
//!
//! ## Local Models
//! Self-hosted models (Ollama, llama.cpp, etc.)
//! - No API keys required
//! - Lower latency, better privacy
//! - Implement connection checking via `is_available()`
//!
//! ## Remote Models
//! Cloud-hosted APIs (OpenAI, Anthropic, etc.)
//! - Authentication handled by implementation
//! - Rate limiting in implementation
//! - Network error handling required
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pyspur_core::llm::{ChatModel, ChatRequest, ChatResponse, ReasoningMode};
//! use async_trait::async_trait;
//!
//! // 1. Implement the ChatModel trait for your provider
//! struct MyLLMClient {
//!     api_key: String,
//!     model: String,
//! }
//!
//! #[async_trait]
//! impl ChatModel for MyLLMClient {
//!     async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
//!         // Convert messages to your provider's format
//!         // Make API call
//!         // Convert response back to this trait's shape
//!         todo!()
//!     }
//!
//!     async fn stream(&self, request: ChatRequest) -> Result<ChatStreamResponse> {
//!         todo!()
//!     }
//! }
//!
//! // 2. Use in graph nodes
//! let model: Arc<dyn ChatModel> = Arc::new(MyLLMClient { /* ... */ });
//!
//! let request = ChatRequest::new(vec![Message::human("Hello!")])
//!     .with_temperature(0.7)
//!     .with_reasoning(ReasoningMode::Separated);
//!
//! let response = model.chat(request).await?;
//! println!("Response: {}", response.message.text());
//! ```
//!
//! # See Also
//!
//! - [`ChatModel`] - The main trait to implement
//! - [`ChatRequest`] - Request configuration with builder pattern
//! - [`ChatResponse`] - Response with message, usage, reasoning
//! - [`ReasoningMode`] - Control thinking model behavior
//! - [`ToolDefinition`] - Define functions for tool calling

pub mod config;
pub mod null_model;
pub mod response;
pub mod tools;
pub mod traits;

pub use config::{ChatConfig, ChatRequest, ReasoningMode};
pub use null_model::NullChatModel;
pub use response::{ChatResponse, ChatStreamResponse, MessageChunk, ReasoningContent, UsageMetadata};
pub use tools::{ToolCall, ToolDefinition, ToolResult};
pub use traits::ChatModel;
