// ABOUTME: Defines the LlmClient trait that all provider adapters implement, plus the chat types.
// ABOUTME: Text generation is an opaque capability: one instruction plus tools in, content blocks out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default token ceiling for a single generation turn.
pub const MAX_TOKENS: u32 = 4096;

/// Errors surfaced by text generation. Provider-specific failures are
/// flattened into these variants; the orchestrator treats all of them as
/// a failure of the agent whose turn raised them.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("agent timed out after {0}s")]
    Timeout(u64),

    #[error("model produced no output")]
    EmptyResponse,

    #[error("tool '{name}' failed: {message}")]
    Tool { name: String, message: String },
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single content block within a chat message or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    /// Construct a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// A user message containing a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// An assistant message carrying the given blocks verbatim.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// A user message carrying tool results back to the model.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }
}

/// A single generation request: instruction, conversation so far, and the
/// tool set offered to the model. Tool definitions are provider-agnostic
/// JSON objects ({name, description, parameters}); each adapter reformats
/// them for its API.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Create a request with the default token ceiling and no messages.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: MAX_TOKENS,
        }
    }
}

/// The model's reply for one turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub model: String,
}

impl ChatResponse {
    /// Concatenated text of every text block in the response.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// Returns true if the response contains at least one tool_use block.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

/// Trait implemented by every LLM provider adapter. Failures surface as
/// GenerationError; the caller decides whether they fail the run.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one generation turn.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError>;
}
