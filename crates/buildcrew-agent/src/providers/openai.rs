// ABOUTME: OpenAI API adapter implementing the LlmClient trait.
// ABOUTME: Translates ChatRequest into Chat Completions calls with function calling.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, ContentBlock, GenerationError, LlmClient, Role,
    StopReason,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI adapter. Calls the Chat Completions API with function
/// definitions and maps tool_calls responses back to content blocks.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create a client reading configuration from environment variables.
    /// Required: `OPENAI_API_KEY`
    /// Optional: `OPENAI_BASE_URL` (defaults to https://api.openai.com)
    pub fn from_env() -> Result<Self, GenerationError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GenerationError::Provider("OPENAI_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

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

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(request: &ChatRequest) -> Value {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }

        for message in &request.messages {
            build_messages(message, &mut messages);
        }

        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.get("name").cloned().unwrap_or(Value::Null),
                        "description": tool.get("description").cloned().unwrap_or(Value::Null),
                        "parameters": tool.get("parameters").cloned().unwrap_or(json!({"type": "object"})),
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    /// Parse a Chat Completions response into a ChatResponse.
    pub fn parse_response(body: &Value) -> Result<ChatResponse, GenerationError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing choices in response".to_string())
            })?;

        let message = choice.get("message").ok_or_else(|| {
            GenerationError::InvalidResponse("missing message in choice".to_string())
        })?;

        let mut content = Vec::new();

        if let Some(text) = message.get("content").and_then(|c| c.as_str())
            && !text.is_empty()
        {
            content.push(ContentBlock::text(text));
        }

        if let Some(tool_calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for tool_call in tool_calls {
                content.push(parse_tool_call(tool_call)?);
            }
        }

        let stop_reason = match choice.get("finish_reason").and_then(|f| f.as_str()) {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
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

/// Convert one ChatMessage into Chat Completions messages. Tool results
/// become individual "tool" role messages; assistant tool_use blocks
/// become a tool_calls array.
fn build_messages(message: &ChatMessage, out: &mut Vec<Value>) {
    match message.role {
        Role::User => {
            let mut text_parts = Vec::new();
            for block in &message.content {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.as_str()),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => out.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    })),
                    ContentBlock::ToolUse { .. } => {}
                }
            }
            if !text_parts.is_empty() {
                out.push(json!({"role": "user", "content": text_parts.join("\n")}));
            }
        }
        Role::Assistant => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in &message.content {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.as_str()),
                    ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": input.to_string(),
                        }
                    })),
                    ContentBlock::ToolResult { .. } => {}
                }
            }

            let mut msg = json!({"role": "assistant"});
            msg["content"] = if text_parts.is_empty() {
                Value::Null
            } else {
                json!(text_parts.join("\n"))
            };
            if !tool_calls.is_empty() {
                msg["tool_calls"] = json!(tool_calls);
            }
            out.push(msg);
        }
    }
}

/// Parse a single tool_call into a ToolUse block. Function arguments
/// arrive as a JSON-encoded string.
fn parse_tool_call(tool_call: &Value) -> Result<ContentBlock, GenerationError> {
    let id = tool_call
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let function = tool_call.get("function").ok_or_else(|| {
        GenerationError::InvalidResponse("tool_call missing function".to_string())
    })?;

    let name = function
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| GenerationError::InvalidResponse("function missing name".to_string()))?
        .to_string();

    let arguments = function
        .get("arguments")
        .and_then(|a| a.as_str())
        .unwrap_or("{}");

    let input: Value = serde_json::from_str(arguments).map_err(|e| {
        GenerationError::InvalidResponse(format!("failed to parse function arguments: {}", e))
    })?;

    Ok(ContentBlock::ToolUse { id, name, input })
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let body = Self::build_request_body(request);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
                "openai returned {}: {}",
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
