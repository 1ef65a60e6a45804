use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One benchmark task from the input collection.
///
/// Field aliases accept the upstream benchmark's naming so task files can be
/// used unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier; results are keyed by it
    #[serde(alias = "instance_id")]
    pub id: String,
    /// Database the SQL tool should target for this task
    #[serde(default, alias = "db_id")]
    pub database: Option<String>,
    /// Root of auxiliary documents available to the agent
    #[serde(default)]
    pub documents: Option<PathBuf>,
    /// The analysis question posed to the agent
    #[serde(alias = "instruction")]
    pub question: String,
}

/// Read an ordered task collection from `path`.
///
/// Accepts either a single JSON array or JSON lines; order is preserved.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, AgentError> {
    let contents = fs::read_to_string(path)?;
    let trimmed = contents.trim_start();

    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(&contents)?);
    }

    let mut tasks = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tasks.push(serde_json::from_str(line)?);
    }
    Ok(tasks)
}
