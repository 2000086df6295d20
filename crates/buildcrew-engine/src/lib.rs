// ABOUTME: Workflow engine for buildcrew: schedules runnable agents over the task graph.
// ABOUTME: Runs topological levels concurrently, commits outputs between levels, reports the outcome.

pub mod orchestrator;
pub mod result;

pub use orchestrator::{Orchestrator, WorkflowError};
pub use result::{TaskFailure, WorkflowResult};
