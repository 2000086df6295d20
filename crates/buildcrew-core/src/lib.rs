// ABOUTME: Core library for buildcrew, containing agent/task definitions and the shared run context.
// ABOUTME: This crate defines the declarative data model and scheduling graph used by the engine.

pub mod context;
pub mod definition;
pub mod graph;
pub mod loader;

pub use context::{ContextError, SharedContext};
pub use definition::{AgentDefinition, TaskDefinition, substitute_requirements};
pub use graph::TaskGraph;
pub use loader::{ConfigError, LoadedConfig, load_config, load_config_str};
