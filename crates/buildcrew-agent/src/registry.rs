// ABOUTME: Tool trait, ToolResult, and the name-to-capability registry with custom-set scoping.
// ABOUTME: Custom tool sets shadow framework tools at resolution time, scoped to a single agent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from tool registration and resolution. Unknown names are fatal
/// for the affected agent's construction and are never swallowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool '{0}' is not registered")]
    Unknown(String),

    #[error("custom tool set '{0}' is not registered")]
    UnknownSet(String),
}

/// The outcome of one tool invocation, fed back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result carrying the given text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// An error result carrying the given text. The model sees the error
    /// and may retry with different parameters.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A callable capability agents may invoke during generation.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn schema(&self) -> serde_json::Value;

    /// Invoke the tool. An Err return fails the calling agent's turn;
    /// recoverable problems should be reported as ToolResult::error so
    /// the model can react.
    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error>;
}

/// Provider-agnostic tool definition ({name, description, parameters})
/// offered to the model. Each provider adapter reformats this to its API.
pub fn tool_definition(tool: &dyn Tool) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name(),
        "description": tool.description(),
        "parameters": tool.schema(),
    })
}

/// Maps tool names to implementations. Framework tools are registered
/// directly; custom tool sets are registered under a set name and layered
/// over the framework tools for one agent at a time via `scoped`.
#[derive(Default, Debug)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    custom_sets: HashMap<String, HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a framework tool. Last registration wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register a named custom tool set. Within a set, later tools win on
    /// name collision, mirroring `register`.
    pub fn register_custom_set(&mut self, set_name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) {
        let mut set = HashMap::new();
        for tool in tools {
            set.insert(tool.name().to_string(), tool);
        }
        self.custom_sets.insert(set_name.into(), set);
    }

    /// Resolve a framework tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::Unknown(name.to_string()))
    }

    /// A resolution view for one agent. When `custom_set` names a
    /// registered set, its tools take priority over framework tools of
    /// the same name; the shadowing happens here, at resolution time,
    /// because custom sets may be registered after framework tools.
    pub fn scoped(&self, custom_set: Option<&str>) -> Result<ScopedRegistry<'_>, ToolError> {
        let custom = match custom_set {
            Some(name) => Some(
                self.custom_sets
                    .get(name)
                    .ok_or_else(|| ToolError::UnknownSet(name.to_string()))?,
            ),
            None => None,
        };
        Ok(ScopedRegistry {
            registry: self,
            custom,
        })
    }
}

/// A per-agent view over the registry: custom tools first, then framework.
#[derive(Debug)]
pub struct ScopedRegistry<'a> {
    registry: &'a ToolRegistry,
    custom: Option<&'a HashMap<String, Arc<dyn Tool>>>,
}

impl ScopedRegistry<'_> {
    /// Resolve a tool name, preferring the custom set.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        if let Some(custom) = self.custom
            && let Some(tool) = custom.get(name)
        {
            return Ok(Arc::clone(tool));
        }
        self.registry.resolve(name)
    }
}
