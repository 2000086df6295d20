// ABOUTME: Entry point for the buildcrew binary.
// ABOUTME: Parses CLI arguments, initializes tracing, runs the workflow, and reports the outcome.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use buildcrew_agent::providers::create_llm_client;
use buildcrew_agent::registry::ToolRegistry;
use buildcrew_agent::tools::{FileSink, SaveToFileTool};
use buildcrew_core::context::SharedContext;
use buildcrew_core::loader::load_config;
use buildcrew_engine::{Orchestrator, WorkflowResult};

#[derive(Debug, Parser)]
#[command(
    name = "buildcrew",
    version,
    about = "Multi-agent pipeline that turns a requirements document into a generated software project"
)]
struct Args {
    /// Path to a text file containing the project requirements
    #[arg(short, long)]
    requirements: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Path to the agent definitions
    #[arg(long, default_value = "config/agents.yaml")]
    agents_config: PathBuf,

    /// Path to the task definitions
    #[arg(long, default_value = "config/tasks.yaml")]
    tasks_config: PathBuf,

    /// Per-agent timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Quiet mode - show minimal progress information
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let default_filter = if args.quiet {
        "buildcrew=warn"
    } else {
        "buildcrew=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().unwrap()),
        )
        .init();

    match run(args).await {
        Ok(result) => {
            println!("{}", result.summary());
            if result.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<WorkflowResult> {
    let requirements = std::fs::read_to_string(&args.requirements)
        .with_context(|| {
            format!(
                "requirements file not found: {}",
                args.requirements.display()
            )
        })?
        .trim()
        .to_string();
    if requirements.is_empty() {
        anyhow::bail!(
            "requirements file is empty: {}",
            args.requirements.display()
        );
    }

    std::fs::create_dir_all(&args.output).with_context(|| {
        format!("could not create output directory: {}", args.output.display())
    })?;

    let config = load_config(&args.agents_config, &args.tasks_config)?;

    let sink = FileSink::new(&args.output);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SaveToFileTool::new(sink.clone())));

    let provider =
        std::env::var("BUILDCREW_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
    let client = create_llm_client(&provider)?;

    tracing::info!(
        provider = %provider,
        output = %args.output.display(),
        agents = config.agents.len(),
        tasks = config.tasks.len(),
        "buildcrew starting up"
    );

    let orchestrator = Orchestrator::new(config, registry, client, sink)
        .with_agent_timeout(Duration::from_secs(args.timeout_secs));
    let context = SharedContext::new();

    let result = orchestrator.run(&requirements, &context).await?;
    Ok(result)
}
