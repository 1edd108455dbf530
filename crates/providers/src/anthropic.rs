//! Anthropic Messages API provider.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events

use agrocert_core::chat::{ChatMessage, ChatRole, ToolCallRequest};
use agrocert_core::error::ProviderError;
use agrocert_core::provider::{
    Provider, ProviderReply, ProviderRequest, StopReason, StreamChunk, ToolDefinition, Usage,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    result.push(ApiMessage {
                        role: "user".into(),
                        content: ApiContent::Text(msg.content.clone()),
                    });
                }
                ChatRole::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(ApiMessage {
                            role: "assistant".into(),
                            content: ApiContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input: tc.input.clone(),
                            });
                        }
                        result.push(ApiMessage {
                            role: "assistant".into(),
                            content: ApiContent::Blocks(blocks),
                        });
                    }
                }
                ChatRole::Tool => {
                    // Tool results travel back as user turns
                    let tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                    result.push(ApiMessage {
                        role: "user".into(),
                        content: ApiContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: tool_call_id,
                            content: msg.content.clone(),
                        }]),
                    });
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let api_messages = Self::to_api_messages(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if let Some(ref sys) = request.system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }

        body
    }

    fn classify_status(status: u16, error_body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
            _ => ProviderError::ApiError {
                status_code: status,
                message: error_body,
            },
        }
    }

    /// Convert an Anthropic API response to our ProviderReply.
    fn to_reply(resp: ApiResponse) -> ProviderReply {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(&text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCallRequest { id, name, input });
                }
            }
        }

        let stop_reason = resp.stop_reason.as_deref().and_then(|r| match r {
            "end_turn" => Some(StopReason::EndTurn),
            "tool_use" => Some(StopReason::ToolUse),
            "max_tokens" => Some(StopReason::MaxTokens),
            "stop_sequence" => Some(StopReason::StopSequence),
            _ => None,
        });

        ProviderReply {
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: text_content,
                tool_calls,
                tool_call_id: None,
            },
            stop_reason,
            usage: Some(Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            }),
            model: resp.model,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderReply, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request, false);

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::classify_status(status, error_body));
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        Ok(Self::to_reply(api_resp))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request, true);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Tool-use block accumulators
            let mut current_tool_id = String::new();
            let mut current_tool_name = String::new();
            let mut tool_args_buffer = String::new();
            let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
            let mut in_tool_use = false;

            let finish_tool =
                |id: &mut String, name: &mut String, args: &mut String| ToolCallRequest {
                    id: std::mem::take(id),
                    name: std::mem::take(name),
                    input: serde_json::from_str(args.as_str()).unwrap_or_default(),
                };

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(event_type) = line.strip_prefix("event: ") {
                        if event_type.trim() == "message_stop" {
                            if in_tool_use {
                                tool_calls.push(finish_tool(
                                    &mut current_tool_id,
                                    &mut current_tool_name,
                                    &mut tool_args_buffer,
                                ));
                                in_tool_use = false;
                            }
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    text: None,
                                    tool_calls: std::mem::take(&mut tool_calls),
                                    usage: None,
                                    done: true,
                                }))
                                .await;
                            return;
                        }
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();
                        if data.is_empty() {
                            continue;
                        }

                        let event: serde_json::Value = match serde_json::from_str(data) {
                            Ok(v) => v,
                            Err(e) => {
                                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                                continue;
                            }
                        };

                        match event["type"].as_str().unwrap_or("") {
                            "content_block_start" => {
                                let block = &event["content_block"];
                                if block["type"].as_str() == Some("tool_use") {
                                    if in_tool_use {
                                        tool_calls.push(finish_tool(
                                            &mut current_tool_id,
                                            &mut current_tool_name,
                                            &mut tool_args_buffer,
                                        ));
                                    }
                                    current_tool_id =
                                        block["id"].as_str().unwrap_or("").to_string();
                                    current_tool_name =
                                        block["name"].as_str().unwrap_or("").to_string();
                                    tool_args_buffer.clear();
                                    in_tool_use = true;
                                }
                            }
                            "content_block_delta" => {
                                let delta = &event["delta"];
                                match delta["type"].as_str().unwrap_or("") {
                                    "text_delta" => {
                                        if let Some(text) = delta["text"].as_str() {
                                            let chunk = StreamChunk {
                                                text: Some(text.to_string()),
                                                tool_calls: Vec::new(),
                                                usage: None,
                                                done: false,
                                            };
                                            if tx.send(Ok(chunk)).await.is_err() {
                                                return;
                                            }
                                        }
                                    }
                                    "input_json_delta" => {
                                        if let Some(partial) = delta["partial_json"].as_str() {
                                            tool_args_buffer.push_str(partial);
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            "content_block_stop" => {
                                if in_tool_use {
                                    tool_calls.push(finish_tool(
                                        &mut current_tool_id,
                                        &mut current_tool_name,
                                        &mut tool_args_buffer,
                                    ));
                                    in_tool_use = false;
                                }
                            }
                            "message_delta" => {
                                if let Some(usage) = event.get("usage") {
                                    if let (Some(out), Some(inp)) = (
                                        usage["output_tokens"].as_u64(),
                                        usage.get("input_tokens").and_then(|v| v.as_u64()),
                                    ) {
                                        let u = Usage {
                                            input_tokens: inp as u32,
                                            output_tokens: out as u32,
                                        };
                                        let _ = tx
                                            .send(Ok(StreamChunk {
                                                text: None,
                                                tool_calls: Vec::new(),
                                                usage: Some(u),
                                                done: false,
                                            }))
                                            .await;
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }

            // Stream ended without message_stop — send final chunk
            if in_tool_use {
                tool_calls.push(ToolCallRequest {
                    id: std::mem::take(&mut current_tool_id),
                    name: std::mem::take(&mut current_tool_name),
                    input: serde_json::from_str(&tool_args_buffer).unwrap_or_default(),
                });
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    text: None,
                    tool_calls,
                    usage: None,
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[allow(dead_code)]
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: ApiUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider =
            AnthropicProvider::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn message_conversion_user_assistant() {
        let messages = vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi!")];
        let api_msgs = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api_msgs.len(), 2);
        assert_eq!(api_msgs[0].role, "user");
        assert_eq!(api_msgs[1].role, "assistant");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = ChatMessage::assistant_with_tools(
            "Let me check the application",
            vec![ToolCallRequest {
                id: "toolu_123".into(),
                name: "query_application".into(),
                input: serde_json::json!({"application_id": "abc"}),
            }],
        );

        let api_msgs = AnthropicProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs.len(), 1);
        assert_eq!(api_msgs[0].role, "assistant");

        match &api_msgs[0].content {
            ApiContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2); // text + tool_use
                match &blocks[1] {
                    ContentBlock::ToolUse { id, name, .. } => {
                        assert_eq!(id, "toolu_123");
                        assert_eq!(name, "query_application");
                    }
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn message_conversion_tool_result() {
        let msg = ChatMessage::tool_result("toolu_123", "{\"success\":true}");
        let api_msgs = AnthropicProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs.len(), 1);
        // Tool results go back as user messages
        assert_eq!(api_msgs[0].role, "user");

        match &api_msgs[0].content {
            ApiContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => {
                    assert_eq!(tool_use_id, "toolu_123");
                    assert!(content.contains("success"));
                }
                _ => panic!("Expected tool_result block"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn body_includes_system_and_tools() {
        let request = ProviderRequest {
            model: "claude-sonnet-4-5".into(),
            system: Some("You are a certification assistant".into()),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 4096,
            temperature: 1.0,
            tools: vec![ToolDefinition {
                name: "query_application".into(),
                description: "Query".into(),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            }],
        };
        let body = AnthropicProvider::build_body(&request, false);
        assert_eq!(body["system"], "You are a certification assistant");
        assert_eq!(body["tools"][0]["name"], "query_application");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn parse_text_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4-5",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let reply = AnthropicProvider::to_reply(resp);
        assert_eq!(reply.message.content, "Hello!");
        assert!(reply.message.tool_calls.is_empty());
        assert_eq!(reply.stop_reason, Some(StopReason::EndTurn));
        assert!(!reply.wants_tools());
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "text", "text": "Checking now"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "update_module",
                     "input": {"module_number": 1, "field_id": "total_revenue", "value": "125000"}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let reply = AnthropicProvider::to_reply(resp);
        assert_eq!(reply.stop_reason, Some(StopReason::ToolUse));
        assert!(reply.wants_tools());
        assert_eq!(reply.message.tool_calls.len(), 1);
        assert_eq!(reply.message.tool_calls[0].name, "update_module");
        assert_eq!(
            reply.message.tool_calls[0].input["field_id"],
            "total_revenue"
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            AnthropicProvider::classify_status(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            AnthropicProvider::classify_status(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            AnthropicProvider::classify_status(500, String::new()),
            ProviderError::ApiError {
                status_code: 500,
                ..
            }
        ));
    }
}
