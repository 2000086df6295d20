// ABOUTME: Built-in file output capability: FileSink plus the save_to_file tool agents call.
// ABOUTME: Writes land under the run's output directory; every written path is recorded for the report.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::registry::{Tool, ToolResult};

/// The run's output directory plus a manifest of every file written to it.
/// Cloning shares the manifest, so one sink can be handed to any number of
/// concurrently running agents.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
    written: Arc<Mutex<Vec<PathBuf>>>,
}

impl FileSink {
    /// Create a sink rooted at the given output directory. The directory
    /// itself is created lazily on first write.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write content to a file under the output directory, creating parent
    /// directories as needed. The filename must be relative and must not
    /// escape the output directory. Returns the full path written.
    pub async fn save(&self, filename: &str, content: &str) -> Result<PathBuf, anyhow::Error> {
        let relative = sanitize_relative(filename)?;
        let full_path = self.output_dir.join(&relative);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(relative.clone());

        tracing::debug!(path = %full_path.display(), bytes = content.len(), "file written");

        Ok(full_path)
    }

    /// Sorted, deduplicated list of paths written so far, relative to the
    /// output directory.
    pub fn written(&self) -> Vec<PathBuf> {
        let mut paths = self
            .written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Reject absolute paths and any path component that would escape the
/// output directory.
fn sanitize_relative(filename: &str) -> Result<PathBuf, anyhow::Error> {
    let path = Path::new(filename);
    if path.as_os_str().is_empty() {
        anyhow::bail!("filename must not be empty");
    }
    if path.is_absolute() {
        anyhow::bail!("filename must be relative, got: {}", filename);
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            _ => anyhow::bail!("filename must stay inside the output directory: {}", filename),
        }
    }
    Ok(path.to_path_buf())
}

/// Tool that saves content to a file in the run's output directory.
#[derive(Clone, Debug)]
pub struct SaveToFileTool {
    sink: FileSink,
}

impl SaveToFileTool {
    pub fn new(sink: FileSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for SaveToFileTool {
    fn name(&self) -> &str {
        "save_to_file"
    }

    fn description(&self) -> &str {
        "Save content to a file in the output directory. Parent directories are created as needed. Use a relative path such as \"src/main.py\" or \"docs/DESIGN.md\"."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Relative path of the file to create, e.g. \"src/main.py\"."
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write to the file."
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error> {
        let filename = params
            .get("filename")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'filename' parameter"))?;
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'content' parameter"))?;

        match self.sink.save(filename, content).await {
            Ok(path) => Ok(ToolResult::text(format!(
                "Successfully saved content to {}",
                path.display()
            ))),
            // Bad paths are the model's mistake; report them back so it can
            // retry with a corrected filename.
            Err(e) => Ok(ToolResult::error(format!("could not save file: {}", e))),
        }
    }
}
