// ABOUTME: Test utilities for buildcrew-agent, including stub and scripted LLM clients.
// ABOUTME: Used in tests to drive agent loops to completion without real API calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatRequest, ChatResponse, ContentBlock, GenerationError, LlmClient, StopReason};

/// A stub LLM client that returns the same text response to every request.
///
/// The response contains only a text block, so an agent loop sees no
/// tool-use requests and terminates after one turn.
#[derive(Debug, Clone)]
pub struct StubLlmClient {
    response_text: String,
}

impl StubLlmClient {
    /// Create a stub client that always returns the given text.
    pub fn new(response_text: &str) -> Self {
        Self {
            response_text: response_text.to_owned(),
        }
    }

    /// Create a stub client that returns "Done."
    pub fn done() -> Self {
        Self::new("Done.")
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        Ok(ChatResponse {
            content: vec![ContentBlock::text(&self.response_text)],
            stop_reason: StopReason::EndTurn,
            model: request.model.clone(),
        })
    }
}

/// One scripted reply: either a response or a generation failure.
#[derive(Debug, Clone)]
enum ScriptedReply {
    Respond(Vec<ContentBlock>, StopReason),
    Fail(String),
}

/// A scripted LLM client keyed by model id.
///
/// Each agent in a workflow carries its own model string, so scripts keyed
/// by model let a single shared client give every agent its own behavior,
/// even under concurrent execution where call ordering is not
/// deterministic. Replies for a model are consumed front to back.
#[derive(Default)]
pub struct ScriptedLlmClient {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text-only reply for the given model.
    pub fn script_text(&self, model: &str, text: &str) {
        self.push(
            model,
            ScriptedReply::Respond(vec![ContentBlock::text(text)], StopReason::EndTurn),
        );
    }

    /// Queue a reply that requests a single tool invocation.
    pub fn script_tool_use(&self, model: &str, tool: &str, input: Value) {
        let id = format!("toolu_{}", tool);
        self.push(
            model,
            ScriptedReply::Respond(
                vec![ContentBlock::ToolUse {
                    id,
                    name: tool.to_string(),
                    input,
                }],
                StopReason::ToolUse,
            ),
        );
    }

    /// Queue a generation failure for the given model.
    pub fn script_failure(&self, model: &str, message: &str) {
        self.push(model, ScriptedReply::Fail(message.to_string()));
    }

    fn push(&self, model: &str, reply: ScriptedReply) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let reply = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(ScriptedReply::Respond(content, stop_reason)) => Ok(ChatResponse {
                content,
                stop_reason,
                model: request.model.clone(),
            }),
            Some(ScriptedReply::Fail(message)) => Err(GenerationError::Provider(message)),
            None => Err(GenerationError::Provider(format!(
                "no scripted reply for model '{}'",
                request.model
            ))),
        }
    }
}
