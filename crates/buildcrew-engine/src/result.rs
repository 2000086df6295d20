// ABOUTME: WorkflowResult, the final aggregate of one run: outputs, failures, and written files.
// ABOUTME: Partial success is a valid, reportable outcome; the summary enumerates both sides.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// One failed task: which task, the output key it would have published,
/// and the underlying error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: String,
    pub output_key: String,
    pub error: String,
}

/// The final aggregate of a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub run_id: Ulid,
    /// Output key -> produced content, for every task that succeeded.
    pub outputs: BTreeMap<String, String>,
    /// Every task that failed, with its cause.
    pub failures: Vec<TaskFailure>,
    /// Files written to the output directory, relative paths.
    pub files_written: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowResult {
    /// True when every scheduled task produced its output.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable run summary: per-key status, failure causes, and
    /// the files written by successful agents.
    pub fn summary(&self) -> String {
        let elapsed = self
            .finished_at
            .signed_duration_since(self.started_at)
            .num_seconds();

        let mut out = format!("Workflow {} finished in {}s\n", self.run_id, elapsed);

        if self.outputs.is_empty() {
            out.push_str("\nNo outputs were produced.\n");
        } else {
            out.push_str("\nOutputs:\n");
            for (key, content) in &self.outputs {
                out.push_str(&format!("  {} ({} chars)\n", key, content.len()));
            }
        }

        if !self.failures.is_empty() {
            out.push_str("\nFailures:\n");
            for failure in &self.failures {
                out.push_str(&format!(
                    "  {} ({}): {}\n",
                    failure.task, failure.output_key, failure.error
                ));
            }
        }

        if self.files_written.is_empty() {
            out.push_str("\nNo files were written.\n");
        } else {
            out.push_str(&format!("\nFiles written ({}):\n", self.files_written.len()));
            for path in &self.files_written {
                out.push_str(&format!("  {}\n", path.display()));
            }
        }

        out
    }
}
