//! Provider trait — the abstraction over the LLM backend.
//!
//! A Provider knows how to send a conversation to an LLM and get a reply
//! back, either as a complete message or as a stream of chunks. The engine
//! calls `complete()` or `stream()` without knowing which vendor is behind
//! the trait.

use crate::chat::{ChatMessage, ToolCallRequest};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition advertised to the LLM so it knows what it can call.
///
/// This shape is part of the wire contract between the service and the
/// model: name, free-text description, JSON-Schema parameter spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Configuration for one provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-5")
    pub model: String,

    /// System prompt, sent as a top-level field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete (non-streaming) reply from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply {
    /// The generated message (text plus any tool-use requests)
    pub message: ChatMessage,

    /// The stop/continuation signal
    pub stop_reason: Option<StopReason>,

    /// Token usage
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

impl ProviderReply {
    /// Whether the model is requesting tool execution this turn.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == Some(StopReason::ToolUse) || !self.message.tool_calls.is_empty()
    }
}

/// A single chunk in a streaming reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta
    #[serde(default)]
    pub text: Option<String>,

    /// Completed tool-use requests (delivered once fully accumulated)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Usage info (typically near the end of the stream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// The LLM capability this service consumes.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete reply.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderReply, ProviderError>;

    /// Send a request and get a stream of reply chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk — enough for providers without a streaming transport.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let reply = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                text: Some(reply.message.content),
                tool_calls: reply.message.tool_calls,
                usage: reply.usage,
                done: true,
            }))
            .await;
        Ok(rx)
    }
}
