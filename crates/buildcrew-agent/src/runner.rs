// ABOUTME: RunnableAgent, the materialized agent+task pair, and its think-act execution loop.
// ABOUTME: Drives chat turns against an LlmClient, dispatching tool_use blocks to resolved tools.

use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ChatMessage, ChatRequest, ChatResponse, ContentBlock, GenerationError, LlmClient};
use crate::registry::{Tool, ToolResult, tool_definition};

/// Upper bound on think-act round trips for a single task. Agents that
/// keep requesting tools past this stop with whatever text they produced.
const MAX_ITERATIONS: usize = 8;

/// A fully materialized agent: one instruction, a resolved tool set, and
/// the output key its result is published under. Created fresh per run by
/// the factory; holds no mutable state, so nothing leaks across runs.
#[derive(Debug)]
pub struct RunnableAgent {
    /// Agent config name (e.g. "engineering_lead").
    pub name: String,
    /// Task config name this agent executes (e.g. "design_task").
    pub task: String,
    /// The combined instruction used as the system prompt.
    pub instruction: String,
    pub model: String,
    pub output_key: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl RunnableAgent {
    pub(crate) fn new(
        name: String,
        task: String,
        instruction: String,
        model: String,
        output_key: String,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            name,
            task,
            instruction,
            model,
            output_key,
            tools,
        }
    }

    /// Names of the tools this agent can call, in resolution order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Provider-agnostic definitions for the agent's tool set.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| tool_definition(tool.as_ref()))
            .collect()
    }

    /// Execute this agent's task to completion.
    ///
    /// `inputs` carries the committed outputs of dependency tasks as
    /// (output key, content) pairs; they are included in the opening
    /// message so the agent works from its producers' results.
    ///
    /// The loop runs chat turns, executing requested tools and feeding
    /// results back, until the model stops requesting tools or the
    /// iteration cap is reached. Returns the collected response text.
    pub async fn execute(
        &self,
        client: &dyn LlmClient,
        requirements: &str,
        inputs: &[(String, String)],
    ) -> Result<String, GenerationError> {
        let mut messages = vec![ChatMessage::user(opening_prompt(requirements, inputs))];
        let tools = self.tool_definitions();
        let mut collected = String::new();
        let mut any_tool_use = false;

        for iteration in 0..MAX_ITERATIONS {
            let request = ChatRequest {
                model: self.model.clone(),
                system: self.instruction.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: crate::llm::MAX_TOKENS,
            };

            let response = client.chat(&request).await?;
            self.collect_text(&response, &mut collected);

            if !response.has_tool_use() {
                break;
            }

            let results = self.dispatch_tools(&response).await?;
            any_tool_use = true;

            tracing::debug!(
                agent = %self.name,
                task = %self.task,
                iteration,
                tool_results = results.len(),
                "tool round trip"
            );

            messages.push(ChatMessage::assistant(response.content));
            messages.push(ChatMessage::tool_results(results));
        }

        let output = collected.trim().to_string();
        if output.is_empty() && !any_tool_use {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(output)
    }

    fn collect_text(&self, response: &ChatResponse, collected: &mut String) {
        for block in &response.content {
            if let ContentBlock::Text { text } = block {
                if !collected.is_empty() {
                    collected.push('\n');
                }
                collected.push_str(text);
            }
        }
    }

    /// Execute every tool_use block in the response and build the matching
    /// tool_result blocks. A request for a tool outside the agent's set is
    /// reported back to the model as an error result; a tool that returns
    /// Err fails the agent's turn.
    async fn dispatch_tools(
        &self,
        response: &ChatResponse,
    ) -> Result<Vec<ContentBlock>, GenerationError> {
        let mut results = Vec::new();

        for block in &response.content {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };

            let result = match self.tools.iter().find(|tool| tool.name() == name) {
                Some(tool) => tool.execute(input.clone()).await.map_err(|e| {
                    GenerationError::Tool {
                        name: name.clone(),
                        message: e.to_string(),
                    }
                })?,
                None => {
                    tracing::warn!(
                        agent = %self.name,
                        tool = %name,
                        "model requested a tool outside the agent's set"
                    );
                    ToolResult::error(format!("tool '{}' is not available to this agent", name))
                }
            };

            results.push(ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: result.content,
                is_error: result.is_error,
            });
        }

        Ok(results)
    }
}

/// Build the opening user message: the requirements plus any dependency
/// outputs committed by earlier levels.
fn opening_prompt(requirements: &str, inputs: &[(String, String)]) -> String {
    let mut prompt = format!(
        "Create a complete software solution based on these requirements:\n\n{}",
        requirements
    );

    if !inputs.is_empty() {
        prompt.push_str("\n\nOutput produced by earlier agents:");
        for (key, content) in inputs {
            prompt.push_str(&format!("\n\n[{}]\n{}", key, content));
        }
    }

    prompt
}
