// ABOUTME: Agent layer for buildcrew: LLM clients, tool registry, agent factory, and the run loop.
// ABOUTME: Materializes declarative definitions into runnable agents that think, call tools, and produce text.

pub mod factory;
pub mod llm;
pub mod providers;
pub mod registry;
pub mod runner;
pub mod testing;
pub mod tools;

pub use factory::{FactoryError, build, build_all};
pub use llm::{ChatRequest, ChatResponse, ContentBlock, GenerationError, LlmClient, StopReason};
pub use registry::{Tool, ToolError, ToolRegistry, ToolResult};
pub use runner::RunnableAgent;
pub use tools::{FileSink, SaveToFileTool};
