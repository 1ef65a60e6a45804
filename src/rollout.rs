//! Fan-out driver: every task times `rollout_number` sessions, scheduled
//! across a bounded worker pool, each terminal result persisted immediately.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::model::ModelClient;
use crate::server::ToolDispatch;
use crate::session::{Session, SessionConfig, SessionStatus};
use crate::task::Task;
use crate::transcript::Transcript;

/// Terminal record of one `(task, rollout)` session. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutResult {
    pub task_id: String,
    pub rollout_index: usize,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rounds: usize,
    pub transcript: Transcript,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// JSON-file result store keyed by `(task_id, rollout_index)`.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, task_id: &str, rollout_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}-{rollout_index}.json", sanitize(task_id)))
    }

    /// Whether a terminal result already exists for this key.
    pub fn contains(&self, task_id: &str, rollout_index: usize) -> bool {
        self.path_for(task_id, rollout_index).exists()
    }

    /// Persist one result. Written to a temp file first and renamed into
    /// place, so a crash mid-write never leaves a file that a later resume
    /// would mistake for a terminal result.
    pub async fn write(&self, result: &RolloutResult) -> Result<(), AgentError> {
        let path = self.path_for(&result.task_id, result.rollout_index);
        if path.exists() {
            log::warn!(
                "result for {}#{} already exists; keeping the original",
                result.task_id,
                result.rollout_index
            );
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(result)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Run-level knobs.
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Concurrent session slots
    pub num_threads: usize,
    /// Independent sessions per task
    pub rollout_number: usize,
    /// Knobs shared by every session
    pub session: SessionConfig,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            num_threads: 8,
            rollout_number: 1,
            session: SessionConfig::default(),
        }
    }
}

/// Aggregate counts for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Sessions driven to a terminal state this run
    pub completed: usize,
    /// Sessions skipped because a result already existed
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub round_limited: usize,
}

/// Drives the task list to completion with controlled parallelism and
/// durable, resumable output.
pub struct RolloutManager {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolDispatch>,
    store: ResultStore,
    config: RolloutConfig,
}

impl RolloutManager {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolDispatch>,
        store: ResultStore,
        config: RolloutConfig,
    ) -> Self {
        Self {
            model,
            tools,
            store,
            config,
        }
    }

    /// Run every `(task, rollout)` pair that has no persisted result yet.
    ///
    /// Session failures are recorded outcomes, never run failures; a result
    /// that cannot be persisted is logged and the run continues.
    pub async fn run(&self, tasks: &[Task]) -> RunSummary {
        let mut summary = RunSummary::default();

        let mut jobs = Vec::new();
        for task in tasks {
            for rollout_index in 0..self.config.rollout_number.max(1) {
                if self.store.contains(&task.id, rollout_index) {
                    log::debug!("skipping {}#{rollout_index}: result exists", task.id);
                    summary.skipped += 1;
                    continue;
                }
                jobs.push((task.clone(), rollout_index));
            }
        }
        log::info!(
            "{} sessions to run, {} already terminal",
            jobs.len(),
            summary.skipped
        );

        let statuses: Vec<SessionStatus> = futures::stream::iter(jobs)
            .map(|(task, rollout_index)| async move {
                let task_id = task.id.clone();
                let session = Session::new(task, rollout_index);
                let result = session
                    .run(self.model.as_ref(), self.tools.as_ref(), &self.config.session)
                    .await;

                if let Err(err) = self.store.write(&result).await {
                    log::error!("failed to persist {task_id}#{rollout_index}: {err}");
                }

                log::info!(
                    "{task_id}#{rollout_index} finished: {:?} after {} rounds",
                    result.status,
                    result.rounds
                );
                result.status
            })
            .buffer_unordered(self.config.num_threads.max(1))
            .collect()
            .await;

        for status in statuses {
            summary.completed += 1;
            match status {
                SessionStatus::Success => summary.succeeded += 1,
                SessionStatus::Error => summary.failed += 1,
                SessionStatus::RoundLimit => summary.round_limited += 1,
            }
        }
        summary
    }
}
