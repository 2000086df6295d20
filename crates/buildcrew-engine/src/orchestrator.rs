// ABOUTME: The orchestrator: materializes agents per run and drives the topological level schedule.
// ABOUTME: Levels run concurrently with commit-after-join isolation; failures are collected fail-soft.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use ulid::Ulid;

use buildcrew_agent::factory::{self, FactoryError};
use buildcrew_agent::llm::{GenerationError, LlmClient};
use buildcrew_agent::registry::ToolRegistry;
use buildcrew_agent::tools::FileSink;
use buildcrew_core::context::{ContextError, SharedContext};
use buildcrew_core::graph::TaskGraph;
use buildcrew_core::loader::{ConfigError, LoadedConfig};

use crate::result::{TaskFailure, WorkflowResult};

/// Default ceiling on a single agent's execution. Generation can hang or
/// loop; a timed-out agent counts as failed under the fail-soft policy.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Setup-time failures. Once execution starts, per-task failures are
/// reported through the WorkflowResult instead; only an invariant
/// violation on the shared context aborts a running workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Drives workflow runs. The registry and client live for the process;
/// runnable agents and the shared context are created fresh per run.
pub struct Orchestrator {
    config: LoadedConfig,
    registry: ToolRegistry,
    client: Arc<dyn LlmClient>,
    sink: FileSink,
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        config: LoadedConfig,
        registry: ToolRegistry,
        client: Arc<dyn LlmClient>,
        sink: FileSink,
    ) -> Self {
        Self {
            config,
            registry,
            client,
            sink,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Override the per-agent timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Run the workflow for one requirements document.
    ///
    /// Tasks execute level by level. Within a level all tasks run
    /// concurrently and see only the context committed by earlier levels;
    /// their own outputs are committed together once the whole level has
    /// joined, so siblings never observe each other's writes. A task whose
    /// dependency produced no output fails without invoking its agent. If
    /// an entire level fails, the remaining levels are not run; nothing
    /// downstream could have its inputs.
    pub async fn run(
        &self,
        requirements: &str,
        context: &SharedContext,
    ) -> Result<WorkflowResult, WorkflowError> {
        let run_id = Ulid::new();
        let started_at = Utc::now();

        let schedule = TaskGraph::build(&self.config.tasks)?;
        let agents = factory::build_all(&self.config, requirements, &self.registry)?;

        tracing::info!(
            run_id = %run_id,
            tasks = schedule.task_count(),
            levels = schedule.levels().len(),
            "workflow starting"
        );

        let mut failures: Vec<TaskFailure> = Vec::new();
        let levels = schedule.levels();
        let mut aborted_level = None;

        for (level_idx, level) in levels.iter().enumerate() {
            tracing::info!(run_id = %run_id, level = level_idx, tasks = ?level, "starting level");

            let mut executions = Vec::new();
            for task_name in level {
                let prepared = self.prepare_task(task_name, requirements, &agents, context)?;
                let client = Arc::clone(&self.client);
                let timeout = self.agent_timeout;

                executions.push(async move {
                    let outcome = match prepared.blocked_on {
                        Some(ref dep) => Err(format!("dependency '{}' produced no output", dep)),
                        None => {
                            let result = tokio::time::timeout(
                                timeout,
                                prepared.agent.execute(
                                    client.as_ref(),
                                    prepared.requirements.as_str(),
                                    &prepared.inputs,
                                ),
                            )
                            .await;
                            match result {
                                Ok(Ok(content)) => Ok(content),
                                Ok(Err(e)) => Err(e.to_string()),
                                Err(_) => {
                                    Err(GenerationError::Timeout(timeout.as_secs()).to_string())
                                }
                            }
                        }
                    };
                    (prepared, outcome)
                });
            }

            // The join is the phase boundary: no output is visible to any
            // reader until every task in the level has finished.
            let results = join_all(executions).await;

            let mut successes = 0usize;
            for (prepared, outcome) in results {
                match outcome {
                    Ok(content) => {
                        context.put(&prepared.output_key, content)?;
                        successes += 1;
                        tracing::info!(
                            run_id = %run_id,
                            task = %prepared.task,
                            output_key = %prepared.output_key,
                            "task completed"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(
                            run_id = %run_id,
                            task = %prepared.task,
                            error = %error,
                            "task failed"
                        );
                        failures.push(TaskFailure {
                            task: prepared.task,
                            output_key: prepared.output_key,
                            error,
                        });
                    }
                }
            }

            if successes == 0 && !level.is_empty() && level_idx + 1 < levels.len() {
                aborted_level = Some(level_idx);
                break;
            }
        }

        if let Some(level_idx) = aborted_level {
            tracing::warn!(
                run_id = %run_id,
                level = level_idx,
                "every task in the level failed, aborting remaining levels"
            );
            for level in &levels[level_idx + 1..] {
                for task_name in level {
                    failures.push(TaskFailure {
                        task: task_name.clone(),
                        output_key: self.output_key_for(task_name)?,
                        error: format!("not run: all tasks in level {} failed", level_idx),
                    });
                }
            }
        }

        let result = WorkflowResult {
            run_id,
            outputs: context.snapshot(),
            failures,
            files_written: self.sink.written(),
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run_id = %run_id,
            outputs = result.outputs.len(),
            failures = result.failures.len(),
            "workflow finished"
        );

        Ok(result)
    }

    /// Gather everything a task needs before its future is spawned:
    /// the runnable agent, the dependency outputs already committed, and
    /// whether a dependency is missing (in which case the agent is not
    /// invoked at all).
    fn prepare_task<'a>(
        &self,
        task_name: &str,
        requirements: &str,
        agents: &'a BTreeMap<String, buildcrew_agent::RunnableAgent>,
        context: &SharedContext,
    ) -> Result<PreparedTask<'a>, WorkflowError> {
        let task = self.config.tasks.get(task_name).ok_or_else(|| {
            WorkflowError::Config(ConfigError::UnresolvedReference {
                task: task_name.to_string(),
                kind: "task",
                reference: task_name.to_string(),
            })
        })?;
        let agent = agents.get(task_name).ok_or_else(|| {
            WorkflowError::Config(ConfigError::UnresolvedReference {
                task: task_name.to_string(),
                kind: "agent",
                reference: task.agent.clone(),
            })
        })?;

        let mut inputs = Vec::with_capacity(task.depends_on.len());
        let mut blocked_on = None;
        for dep in &task.depends_on {
            let key = self.output_key_for(dep)?;
            match context.get(&key) {
                Ok(content) => inputs.push((key, content)),
                Err(ContextError::MissingKey(_)) => {
                    blocked_on = Some(dep.clone());
                    break;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Ok(PreparedTask {
            task: task_name.to_string(),
            output_key: agent.output_key.clone(),
            requirements: requirements.to_string(),
            agent,
            inputs,
            blocked_on,
        })
    }

    /// The output key a task publishes under: the key declared by the
    /// agent that owns the task.
    fn output_key_for(&self, task_name: &str) -> Result<String, WorkflowError> {
        let task = self.config.tasks.get(task_name).ok_or_else(|| {
            WorkflowError::Config(ConfigError::UnresolvedReference {
                task: task_name.to_string(),
                kind: "task",
                reference: task_name.to_string(),
            })
        })?;
        let agent = self.config.agents.get(&task.agent).ok_or_else(|| {
            WorkflowError::Config(ConfigError::UnresolvedReference {
                task: task_name.to_string(),
                kind: "agent",
                reference: task.agent.clone(),
            })
        })?;
        Ok(agent.output_key.clone())
    }
}

/// A task ready to execute: resolved agent, committed dependency inputs,
/// and the requirements text for the opening prompt.
struct PreparedTask<'a> {
    task: String,
    output_key: String,
    requirements: String,
    agent: &'a buildcrew_agent::RunnableAgent,
    inputs: Vec<(String, String)>,
    blocked_on: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use buildcrew_agent::llm::{ChatRequest, ChatResponse, ContentBlock, StopReason};
    use buildcrew_agent::testing::ScriptedLlmClient;
    use buildcrew_core::loader::load_config_str;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const STAR_AGENTS: &str = r#"
engineering_lead:
  role: Engineering lead
  goal: Produce a design for {requirements}
  backstory: A seasoned architect.
  model: model-lead
  output_key: design

backend_engineer:
  role: Backend engineer
  goal: Implement the design
  backstory: Writes clean code.
  model: model-code
  output_key: code

frontend_engineer:
  role: Frontend engineer
  goal: Build the UI
  backstory: Cares about users.
  model: model-frontend
  output_key: frontend

test_engineer:
  role: Test engineer
  goal: Write the tests
  backstory: Breaks things professionally.
  model: model-tests
  output_key: tests
"#;

    const STAR_TASKS: &str = r#"
design_task:
  description: Design a solution for {requirements}
  expected_output: A design document
  agent: engineering_lead

code_task:
  description: Implement the design
  expected_output: Backend code
  agent: backend_engineer
  depends_on: [design_task]

frontend_task:
  description: Build the UI from the design
  expected_output: Frontend code
  agent: frontend_engineer
  depends_on: [design_task]

test_task:
  description: Write tests from the design
  expected_output: A test suite
  agent: test_engineer
  depends_on: [design_task]
"#;

    fn star_config() -> LoadedConfig {
        load_config_str(STAR_AGENTS, STAR_TASKS).expect("star config should load")
    }

    /// Per-model behavior: optional delay, then a reply or a failure.
    struct Behavior {
        delay_ms: u64,
        reply: Result<String, String>,
    }

    impl Behavior {
        fn text(text: &str) -> Self {
            Self {
                delay_ms: 0,
                reply: Ok(text.to_string()),
            }
        }

        fn slow_text(text: &str, delay_ms: u64) -> Self {
            Self {
                delay_ms,
                reply: Ok(text.to_string()),
            }
        }

        fn failure(message: &str) -> Self {
            Self {
                delay_ms: 0,
                reply: Err(message.to_string()),
            }
        }
    }

    /// Test client that records, per model, which context keys were
    /// visible when the (possibly delayed) call produced its reply.
    struct ProbingClient {
        context: Arc<SharedContext>,
        behaviors: HashMap<String, Behavior>,
        observed: Mutex<HashMap<String, Vec<String>>>,
    }

    impl ProbingClient {
        fn new(context: Arc<SharedContext>, behaviors: Vec<(&str, Behavior)>) -> Self {
            Self {
                context,
                behaviors: behaviors
                    .into_iter()
                    .map(|(model, b)| (model.to_string(), b))
                    .collect(),
                observed: Mutex::new(HashMap::new()),
            }
        }

        fn observed_keys(&self, model: &str) -> Option<Vec<String>> {
            self.observed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(model)
                .cloned()
        }

        fn was_called(&self, model: &str) -> bool {
            self.observed_keys(model).is_some()
        }
    }

    #[async_trait]
    impl LlmClient for ProbingClient {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
            let behavior = self.behaviors.get(&request.model);

            if let Some(b) = behavior
                && b.delay_ms > 0
            {
                tokio::time::sleep(Duration::from_millis(b.delay_ms)).await;
            }

            // Record what this agent could see at reply time.
            self.observed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(request.model.clone(), self.context.keys());

            match behavior {
                Some(Behavior { reply: Ok(text), .. }) => Ok(ChatResponse {
                    content: vec![ContentBlock::text(text.as_str())],
                    stop_reason: StopReason::EndTurn,
                    model: request.model.clone(),
                }),
                Some(Behavior { reply: Err(msg), .. }) => {
                    Err(GenerationError::Provider(msg.clone()))
                }
                None => Err(GenerationError::Provider(format!(
                    "no behavior configured for model '{}'",
                    request.model
                ))),
            }
        }
    }

    fn orchestrator_with(
        config: LoadedConfig,
        client: Arc<dyn LlmClient>,
        dir: &tempfile::TempDir,
    ) -> Orchestrator {
        Orchestrator::new(
            config,
            ToolRegistry::new(),
            client,
            FileSink::new(dir.path()),
        )
    }

    #[tokio::test]
    async fn star_pipeline_completes_with_all_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::text("the design doc")),
                ("model-code", Behavior::text("the backend")),
                ("model-frontend", Behavior::text("the ui")),
                ("model-tests", Behavior::text("the tests")),
            ],
        ));

        let orchestrator = orchestrator_with(star_config(), client, &dir);
        let result = orchestrator
            .run("a tiny calculator", &context)
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.outputs.len(), 4);
        assert_eq!(result.outputs["design"], "the design doc");
        assert_eq!(result.outputs["code"], "the backend");
        assert_eq!(result.outputs["frontend"], "the ui");
        assert_eq!(result.outputs["tests"], "the tests");
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn design_commit_happens_before_any_consumer_starts() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::text("the design doc")),
                ("model-code", Behavior::text("the backend")),
                ("model-frontend", Behavior::text("the ui")),
                ("model-tests", Behavior::text("the tests")),
            ],
        ));
        let probe = Arc::clone(&client);

        let orchestrator = orchestrator_with(star_config(), client, &dir);
        orchestrator.run("an app", &context).await.unwrap();

        // The lead saw an empty context; every consumer saw the committed design.
        assert_eq!(probe.observed_keys("model-lead").unwrap(), Vec::<String>::new());
        for model in ["model-code", "model-frontend", "model-tests"] {
            let keys = probe.observed_keys(model).unwrap();
            assert!(
                keys.contains(&"design".to_string()),
                "{} should see the committed design, saw: {:?}",
                model,
                keys
            );
        }
    }

    #[tokio::test]
    async fn siblings_never_observe_each_others_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        // The frontend agent finishes immediately; the backend agent
        // observes the context well after that. With commit-after-join it
        // still must not see the frontend's key.
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::text("the design doc")),
                ("model-code", Behavior::slow_text("the backend", 150)),
                ("model-frontend", Behavior::text("the ui")),
                ("model-tests", Behavior::text("the tests")),
            ],
        ));
        let probe = Arc::clone(&client);

        let orchestrator = orchestrator_with(star_config(), client, &dir);
        let result = orchestrator.run("an app", &context).await.unwrap();

        let slow_saw = probe.observed_keys("model-code").unwrap();
        assert!(
            !slow_saw.contains(&"frontend".to_string()),
            "sibling output must stay invisible during the level, saw: {:?}",
            slow_saw
        );
        assert!(slow_saw.contains(&"design".to_string()));

        // After the level joined, everything is committed.
        assert!(result.succeeded());
        assert_eq!(result.outputs.len(), 4);
    }

    #[tokio::test]
    async fn one_failing_sibling_does_not_sink_the_others() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::text("the design doc")),
                ("model-code", Behavior::text("the backend")),
                ("model-frontend", Behavior::failure("simulated outage")),
                ("model-tests", Behavior::text("the tests")),
            ],
        ));

        let orchestrator = orchestrator_with(star_config(), client, &dir);
        let result = orchestrator.run("an app", &context).await.unwrap();

        assert!(!result.succeeded());
        assert_eq!(result.outputs.len(), 3, "two siblings plus the design");
        assert!(result.outputs.contains_key("code"));
        assert!(result.outputs.contains_key("tests"));
        assert!(!result.outputs.contains_key("frontend"));

        assert_eq!(result.failures.len(), 1);
        let failure = &result.failures[0];
        assert_eq!(failure.task, "frontend_task");
        assert_eq!(failure.output_key, "frontend");
        assert!(failure.error.contains("simulated outage"));
    }

    #[tokio::test]
    async fn design_failure_aborts_without_running_consumers() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::failure("model meltdown")),
                ("model-code", Behavior::text("unreachable")),
                ("model-frontend", Behavior::text("unreachable")),
                ("model-tests", Behavior::text("unreachable")),
            ],
        ));
        let probe = Arc::clone(&client);

        let orchestrator = orchestrator_with(star_config(), client, &dir);
        let result = orchestrator.run("an app", &context).await.unwrap();

        assert!(!result.succeeded());
        assert!(result.outputs.is_empty(), "no partial design entry");
        assert!(!context.contains("design"));

        // One real failure plus three not-run tasks.
        assert_eq!(result.failures.len(), 4);
        assert!(result.failures[0].error.contains("model meltdown"));
        for failure in &result.failures[1..] {
            assert!(failure.error.contains("not run"));
        }

        for model in ["model-code", "model-frontend", "model-tests"] {
            assert!(
                !probe.was_called(model),
                "{} must not execute after design failure",
                model
            );
        }
    }

    #[tokio::test]
    async fn timed_out_agent_counts_as_failed() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![
                ("model-lead", Behavior::text("the design doc")),
                ("model-code", Behavior::slow_text("too late", 500)),
                ("model-frontend", Behavior::text("the ui")),
                ("model-tests", Behavior::text("the tests")),
            ],
        ));

        let orchestrator = orchestrator_with(star_config(), client, &dir)
            .with_agent_timeout(Duration::from_millis(50));
        let result = orchestrator.run("an app", &context).await.unwrap();

        assert!(!result.succeeded());
        let failure = result
            .failures
            .iter()
            .find(|f| f.task == "code_task")
            .expect("code_task should have failed");
        assert!(failure.error.contains("timed out"));

        // The slow sibling's timeout did not sink the fast ones.
        assert!(result.outputs.contains_key("frontend"));
        assert!(result.outputs.contains_key("tests"));
    }

    #[tokio::test]
    async fn two_tasks_publishing_one_key_violate_write_once() {
        let agents = r#"
lead:
  role: Lead
  goal: Design
  backstory: Architect.
  model: model-lead
  output_key: design
"#;
        // Both tasks are owned by the same agent, so both would publish
        // under "design" in the same level.
        let tasks = r#"
first_task:
  description: Design once
  expected_output: A document
  agent: lead

second_task:
  description: Design again
  expected_output: A document
  agent: lead
"#;
        let config = load_config_str(agents, tasks).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let context = Arc::new(SharedContext::new());
        let client = Arc::new(ProbingClient::new(
            Arc::clone(&context),
            vec![("model-lead", Behavior::text("a design"))],
        ));

        let orchestrator = orchestrator_with(config, client, &dir);
        let err = orchestrator.run("an app", &context).await.unwrap_err();

        assert!(
            matches!(
                err,
                WorkflowError::Context(ContextError::DuplicateKey(ref key)) if key == "design"
            ),
            "expected DuplicateKey invariant violation, got: {}",
            err
        );
    }

    #[tokio::test]
    async fn scripted_tool_use_writes_files_into_the_manifest() {
        let agents = r#"
lead:
  role: Lead
  goal: Design
  backstory: Architect.
  model: model-lead
  tools: [save_to_file]
  output_key: design
"#;
        let tasks = r#"
design_task:
  description: Design it
  expected_output: A document
  agent: lead
  output_file: docs/DESIGN.md
"#;
        let config = load_config_str(agents, tasks).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(buildcrew_agent::SaveToFileTool::new(sink.clone())));

        let client = Arc::new(ScriptedLlmClient::new());
        client.script_tool_use(
            "model-lead",
            "save_to_file",
            serde_json::json!({"filename": "docs/DESIGN.md", "content": "# Design"}),
        );
        client.script_text("model-lead", "design saved");

        let orchestrator = Orchestrator::new(config, registry, client, sink);
        let context = SharedContext::new();
        let result = orchestrator.run("an app", &context).await.unwrap();

        assert!(result.succeeded());
        assert_eq!(result.outputs["design"], "design saved");
        assert_eq!(
            result.files_written,
            vec![std::path::PathBuf::from("docs/DESIGN.md")]
        );
        assert!(dir.path().join("docs/DESIGN.md").exists());
    }
}
