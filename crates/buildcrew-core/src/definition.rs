// ABOUTME: Declarative agent and task definitions as loaded from YAML configuration.
// ABOUTME: Raw serde shapes carry optional fields; validated definitions are immutable after load.

use serde::Deserialize;

/// Placeholder token substituted with the requirements text inside
/// goal, backstory, description, and expected-output fields.
pub const REQUIREMENTS_PLACEHOLDER: &str = "{requirements}";

/// A fully validated agent definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDefinition {
    /// Config key this agent was loaded under (e.g. "engineering_lead").
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Model identifier passed through to the LLM client.
    pub model: String,
    /// Names of tools this agent may call, resolved through the registry.
    pub tools: Vec<String>,
    /// Optional name of a custom tool set that shadows framework tools
    /// for this agent only.
    pub custom_tools: Option<String>,
    /// Key under which this agent's output is published to the shared context.
    pub output_key: String,
}

/// A fully validated task definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    /// Config key this task was loaded under (e.g. "design_task").
    pub name: String,
    pub description: String,
    pub expected_output: String,
    /// Name of the agent that executes this task.
    pub agent: String,
    /// Names of tasks whose output must be committed before this task runs.
    pub depends_on: Vec<String>,
    /// Optional single file the agent is instructed to save its work to.
    pub output_file: Option<String>,
}

/// Raw agent shape as deserialized from YAML, before required-field
/// validation. All required fields are optional here so a missing field
/// surfaces as a MissingField error rather than an opaque parse error.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAgentDefinition {
    pub role: Option<String>,
    pub goal: Option<String>,
    pub backstory: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub custom_tools: Option<String>,
    pub output_key: Option<String>,
}

/// Raw task shape as deserialized from YAML, before validation.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTaskDefinition {
    pub description: Option<String>,
    pub expected_output: Option<String>,
    pub agent: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub output_file: Option<String>,
}

/// Substitute the requirements text into every `{requirements}` placeholder.
///
/// Any other placeholder-looking text is left untouched: an unresolved
/// placeholder is static content, not an error.
pub fn substitute_requirements(text: &str, requirements: &str) -> String {
    text.replace(REQUIREMENTS_PLACEHOLDER, requirements)
}
