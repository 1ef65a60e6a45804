//! Document lookup tools rooted in a task's resource directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ToolError, ToolHandler};

/// Resolve `relative` against `root`, rejecting anything that could escape it.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(ToolError::InvalidArgs(
            "'path' must be relative to the document root".to_string(),
        ));
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ToolError::InvalidArgs(
                "'path' must not contain '..'".to_string(),
            ));
        }
    }
    Ok(root.join(candidate))
}

/// Reads one document from the task's document root.
pub struct DocumentReadTool {
    root: PathBuf,
}

impl DocumentReadTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ToolHandler for DocumentReadTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read a document from the task's resource directory. Takes 'path' \
         relative to the document root."
    }

    async fn run(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("missing 'path'".to_string()))?;
        let resolved = resolve(&self.root, path)?;

        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::Execution(format!("cannot read '{path}': {e}")))
    }
}

/// Lists entries under the task's document root.
pub struct DocumentListTool {
    root: PathBuf,
}

impl DocumentListTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ToolHandler for DocumentListTool {
    fn name(&self) -> &str {
        "list_documents"
    }

    fn description(&self) -> &str {
        "List entries in the task's resource directory. Takes an optional \
         'path' relative to the document root; directories end with '/'."
    }

    async fn run(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let resolved = resolve(&self.root, path)?;

        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| ToolError::Execution(format!("cannot list '{path}': {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort_unstable();

        if entries.is_empty() {
            return Ok(format!("'{path}' is empty."));
        }
        Ok(entries.join("\n"))
    }
}
