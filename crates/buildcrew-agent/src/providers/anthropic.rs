// ABOUTME: Anthropic Claude API adapter implementing the LlmClient trait.
// ABOUTME: Translates ChatRequest into Messages API calls and parses tool_use responses back.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, ContentBlock, GenerationError, LlmClient, Role,
    StopReason,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude adapter. Calls the Messages API with tool definitions
/// and maps content blocks in both directions.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client reading configuration from environment variables.
    /// Required: `ANTHROPIC_API_KEY`
    /// Optional: `ANTHROPIC_BASE_URL` (defaults to https://api.anthropic.com)
    pub fn from_env() -> Result<Self, GenerationError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| GenerationError::Provider("ANTHROPIC_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::new(api_key, base_url))
    }

    /// Create a client with explicit configuration.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// Build the JSON request body for the Messages API.
    pub fn build_request_body(request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(build_message).collect();

        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.get("name").cloned().unwrap_or(Value::Null),
                    "description": tool.get("description").cloned().unwrap_or(Value::Null),
                    "input_schema": tool.get("parameters").cloned().unwrap_or(json!({"type": "object"})),
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        body
    }

    /// Parse a Messages API response into a ChatResponse.
    pub fn parse_response(body: &Value) -> Result<ChatResponse, GenerationError> {
        let content_values = body.get("content").and_then(|c| c.as_array()).ok_or_else(|| {
            GenerationError::InvalidResponse("missing content array in response".to_string())
        })?;

        let mut content = Vec::with_capacity(content_values.len());
        for block in content_values {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    let text = block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    content.push(ContentBlock::text(text));
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            GenerationError::InvalidResponse(
                                "tool_use block missing id".to_string(),
                            )
                        })?
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            GenerationError::InvalidResponse(
                                "tool_use block missing name".to_string(),
                            )
                        })?
                        .to_string();
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
                // Unknown block types (e.g. thinking) carry nothing the
                // agent loop acts on.
                _ => {}
            }
        }

        let stop_reason = match body.get("stop_reason").and_then(|s| s.as_str()) {
            Some("end_turn") => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        let model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(ChatResponse {
            content,
            stop_reason,
            model,
        })
    }
}

/// Convert one ChatMessage to the Messages API format.
fn build_message(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let blocks: Vec<Value> = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
        })
        .collect();

    json!({"role": role, "content": blocks})
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let body = Self::build_request_body(request);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!(
                "anthropic returned {}: {}",
                status, text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Self::parse_response(&body)
    }
}
