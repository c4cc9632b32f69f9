//! Persistence: the durable instance state store and the run history log

pub mod store;

#[cfg(feature = "sqlite")]
pub mod history;

pub use store::{StateStore, StateStoreError, StatusSnapshot};

#[cfg(feature = "sqlite")]
pub use history::SqliteHistoryStore;

use crate::core::state::StepStatus;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Terminal status of one `run` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step finished
    Completed,
    /// A step failed or the run aborted
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Summary of one `run` invocation, recorded in history.
///
/// History is observational only; resume decisions come exclusively from
/// the instance state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id for this invocation
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Instance directory the run operated on
    pub instance: String,

    /// How the invocation ended
    pub status: RunStatus,

    /// When the invocation started
    pub started_at: DateTime<Utc>,

    /// When the invocation ended
    pub completed_at: Option<DateTime<Utc>>,

    /// Steps finished in the instance after this invocation
    pub steps_finished: usize,

    /// Total steps in the pipeline
    pub steps_total: usize,
}

/// Trait for history backends
#[async_trait::async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Record one run invocation
    async fn record_run(&self, summary: &RunSummary) -> Result<()>;

    /// Load a recorded run by id
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// All recorded runs for a pipeline, newest first
    async fn runs_for(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// All pipeline names seen in history
    async fn pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory history (for `--no-history` and tests)
pub struct InMemoryHistory {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunSummary>>,
    by_pipeline: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_pipeline: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistoryBackend for InMemoryHistory {
    async fn record_run(&self, summary: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(summary.run_id, summary.clone());

        let mut by_pipeline = self.by_pipeline.write().await;
        by_pipeline
            .entry(summary.pipeline_name.clone())
            .or_default()
            .push(summary.run_id);

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn runs_for(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result = Vec::new();
        if let Some(ids) = by_pipeline.get(pipeline_name) {
            for id in ids {
                if let Some(run) = runs.get(id) {
                    result.push(run.clone());
                }
            }
        }
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        Ok(by_pipeline.keys().cloned().collect())
    }
}

/// Build a run summary from the instance's recorded state after a run.
pub fn create_summary(
    pipeline_name: &str,
    instance: &Path,
    status: RunStatus,
    started_at: DateTime<Utc>,
) -> Result<RunSummary, StateStoreError> {
    let snapshot = StatusSnapshot::read(instance)?;
    let steps_finished = snapshot
        .statuses()
        .iter()
        .filter(|step_status| **step_status == StepStatus::Finished)
        .count();

    Ok(RunSummary {
        run_id: Uuid::new_v4(),
        pipeline_name: pipeline_name.to_string(),
        instance: instance.display().to_string(),
        status,
        started_at,
        completed_at: Some(Utc::now()),
        steps_finished,
        steps_total: snapshot.len(),
    })
}
