// ABOUTME: Loads and validates agent and task definitions from YAML configuration documents.
// ABOUTME: Enforces required fields, cross-references, unique output keys, and an acyclic task graph.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::definition::{
    AgentDefinition, RawAgentDefinition, RawTaskDefinition, TaskDefinition,
};
use crate::graph::TaskGraph;

/// Errors that can occur while loading configuration. All of these abort
/// the run before any agent executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {document} config: {source}")]
    Parse {
        document: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{section} '{name}' is missing required field '{field}'")]
    MissingField {
        section: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("task '{task}' references unknown {kind} '{reference}'")]
    UnresolvedReference {
        task: String,
        kind: &'static str,
        reference: String,
    },

    #[error("agents '{first}' and '{second}' both declare output key '{key}'")]
    DuplicateOutputKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("dependency cycle among tasks: {0}")]
    DependencyCycle(String),
}

/// The validated configuration: agent and task definitions keyed by their
/// config names, ready for the factory and the scheduler.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub agents: BTreeMap<String, AgentDefinition>,
    pub tasks: BTreeMap<String, TaskDefinition>,
}

/// Load agent and task definitions from two YAML files.
pub fn load_config(agents_path: &Path, tasks_path: &Path) -> Result<LoadedConfig, ConfigError> {
    let agents_yaml = std::fs::read_to_string(agents_path).map_err(|source| ConfigError::Io {
        path: agents_path.display().to_string(),
        source,
    })?;
    let tasks_yaml = std::fs::read_to_string(tasks_path).map_err(|source| ConfigError::Io {
        path: tasks_path.display().to_string(),
        source,
    })?;

    load_config_str(&agents_yaml, &tasks_yaml)
}

/// Load agent and task definitions from in-memory YAML documents.
///
/// Validation order: parse both documents, enforce required fields, then
/// cross-reference (task -> agent, dependency -> task), unique output keys,
/// and finally reject dependency cycles.
pub fn load_config_str(agents_yaml: &str, tasks_yaml: &str) -> Result<LoadedConfig, ConfigError> {
    let raw_agents: BTreeMap<String, RawAgentDefinition> = serde_yaml::from_str(agents_yaml)
        .map_err(|source| ConfigError::Parse {
            document: "agents",
            source,
        })?;
    let raw_tasks: BTreeMap<String, RawTaskDefinition> = serde_yaml::from_str(tasks_yaml)
        .map_err(|source| ConfigError::Parse {
            document: "tasks",
            source,
        })?;

    let mut agents = BTreeMap::new();
    for (name, raw) in raw_agents {
        agents.insert(name.clone(), validate_agent(name, raw)?);
    }

    let mut tasks = BTreeMap::new();
    for (name, raw) in raw_tasks {
        tasks.insert(name.clone(), validate_task(name, raw)?);
    }

    for task in tasks.values() {
        if !agents.contains_key(&task.agent) {
            return Err(ConfigError::UnresolvedReference {
                task: task.name.clone(),
                kind: "agent",
                reference: task.agent.clone(),
            });
        }
        for dep in &task.depends_on {
            if !tasks.contains_key(dep) {
                return Err(ConfigError::UnresolvedReference {
                    task: task.name.clone(),
                    kind: "task",
                    reference: dep.clone(),
                });
            }
        }
    }

    // Output keys form a closed set per run; two agents publishing under
    // the same key would violate the context's write-once invariant.
    let mut seen_keys: BTreeMap<&str, &str> = BTreeMap::new();
    for agent in agents.values() {
        if let Some(first) = seen_keys.insert(&agent.output_key, &agent.name) {
            return Err(ConfigError::DuplicateOutputKey {
                key: agent.output_key.clone(),
                first: first.to_string(),
                second: agent.name.clone(),
            });
        }
    }

    // Reject cycles at load time; the graph itself is rebuilt by the caller
    // when scheduling.
    TaskGraph::build(&tasks)?;

    tracing::debug!(
        agents = agents.len(),
        tasks = tasks.len(),
        "configuration loaded"
    );

    Ok(LoadedConfig { agents, tasks })
}

fn validate_agent(name: String, raw: RawAgentDefinition) -> Result<AgentDefinition, ConfigError> {
    let missing = |field: &'static str| ConfigError::MissingField {
        section: "agent",
        name: name.clone(),
        field,
    };

    Ok(AgentDefinition {
        role: raw.role.ok_or_else(|| missing("role"))?,
        goal: raw.goal.ok_or_else(|| missing("goal"))?,
        backstory: raw.backstory.ok_or_else(|| missing("backstory"))?,
        model: raw.model.ok_or_else(|| missing("model"))?,
        output_key: raw.output_key.ok_or_else(|| missing("output_key"))?,
        tools: raw.tools,
        custom_tools: raw.custom_tools,
        name,
    })
}

fn validate_task(name: String, raw: RawTaskDefinition) -> Result<TaskDefinition, ConfigError> {
    let missing = |field: &'static str| ConfigError::MissingField {
        section: "task",
        name: name.clone(),
        field,
    };

    Ok(TaskDefinition {
        description: raw.description.ok_or_else(|| missing("description"))?,
        expected_output: raw.expected_output.ok_or_else(|| missing("expected_output"))?,
        agent: raw.agent.ok_or_else(|| missing("agent"))?,
        depends_on: raw.depends_on,
        output_file: raw.output_file,
        name,
    })
}
