// ABOUTME: Agent factory: combines an agent definition and its task into one RunnableAgent.
// ABOUTME: Substitutes requirements into prompt fields, assembles the instruction, resolves tools.

use std::collections::BTreeMap;

use thiserror::Error;

use buildcrew_core::definition::{AgentDefinition, TaskDefinition, substitute_requirements};
use buildcrew_core::loader::LoadedConfig;

use crate::registry::{ToolError, ToolRegistry};
use crate::runner::RunnableAgent;

/// Errors from materializing agents. Tool resolution failures pass
/// through unchanged; UnknownAgent guards against a task/agent map that
/// bypassed the loader's cross-reference validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("task '{task}' references unknown agent '{agent}'")]
    UnknownAgent { task: String, agent: String },
}

/// Materialize one agent for one task.
///
/// Deterministic for identical inputs: the same definitions, requirements,
/// and registry contents always yield the same instruction string and tool
/// set. Tool names are resolved through a registry view scoped to the
/// agent's custom tool set, so same-named custom tools shadow framework
/// tools for this agent only. An unresolved tool name fails construction.
pub fn build(
    agent: &AgentDefinition,
    task: &TaskDefinition,
    requirements: &str,
    registry: &ToolRegistry,
) -> Result<RunnableAgent, ToolError> {
    let instruction = build_instruction(agent, task, requirements);

    let scoped = registry.scoped(agent.custom_tools.as_deref())?;
    let mut tools = Vec::with_capacity(agent.tools.len());
    for name in &agent.tools {
        tools.push(scoped.resolve(name)?);
    }

    Ok(RunnableAgent::new(
        agent.name.clone(),
        task.name.clone(),
        instruction,
        agent.model.clone(),
        agent.output_key.clone(),
        tools,
    ))
}

/// Materialize every task's agent, keyed by task name. The agent-task
/// pairing comes from the task definitions: each task names the agent
/// that executes it.
pub fn build_all(
    config: &LoadedConfig,
    requirements: &str,
    registry: &ToolRegistry,
) -> Result<BTreeMap<String, RunnableAgent>, FactoryError> {
    let mut agents = BTreeMap::new();
    for (task_name, task) in &config.tasks {
        // The loader's cross-reference validation makes this lookup
        // infallible for configs it produced.
        let agent = config
            .agents
            .get(&task.agent)
            .ok_or_else(|| FactoryError::UnknownAgent {
                task: task_name.clone(),
                agent: task.agent.clone(),
            })?;
        agents.insert(task_name.clone(), build(agent, task, requirements, registry)?);
    }
    Ok(agents)
}

/// Assemble the single instruction block. Field order is stable: role,
/// backstory, goal, task description, expected output. Identity and
/// expertise come first, then the concrete task, the way a person would
/// be briefed. The save instruction is appended when the task names an
/// output file.
fn build_instruction(agent: &AgentDefinition, task: &TaskDefinition, requirements: &str) -> String {
    let sub = |text: &str| substitute_requirements(text.trim(), requirements);

    let mut parts = vec![
        format!("Your role: {}", sub(&agent.role)),
        sub(&agent.backstory),
        format!("Your goal: {}", sub(&agent.goal)),
        format!("Task: {}", sub(&task.description)),
        format!("Expected output: {}", sub(&task.expected_output)),
    ];

    if let Some(output_file) = &task.output_file {
        parts.push(format!(
            "When you complete your work, save it using the save_to_file tool with filename \"{}\".",
            sub(output_file)
        ));
    }

    parts.join("\n\n")
}
