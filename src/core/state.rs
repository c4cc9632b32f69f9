//! Per-step execution status records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// File type tag stamped into every persisted step record.
///
/// A record read back without this tag is treated as corrupt, never as a
/// valid status.
pub const STEP_RECORD_FILE_TYPE: &str = "step-record-1";

/// Execution status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not been started
    NeverRun,
    /// Step was started and has not reached a terminal state
    Running,
    /// Step process exited with status zero
    Finished,
    /// Step process exited nonzero or could not be executed
    Failed,
}

impl StepStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Finished | StepStatus::Failed)
    }

    /// The lowercase token used in reports and persisted records
    pub fn token(&self) -> &'static str {
        match self {
            StepStatus::NeverRun => "never_run",
            StepStatus::Running => "running",
            StepStatus::Finished => "finished",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The persisted state of one step within a pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Record format tag, always [`STEP_RECORD_FILE_TYPE`]
    pub file_type: String,

    /// Current execution status
    pub status: StepStatus,

    /// Exit code of the step process, once terminal. None for a step that
    /// failed before producing an exit status (e.g. killed by a signal).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// When the step was last marked running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the step last reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// A fresh record for a step that has never been started
    pub fn never_run() -> Self {
        Self {
            file_type: STEP_RECORD_FILE_TYPE.to_string(),
            status: StepStatus::NeverRun,
            exit_code: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Check that the record carries the expected format tag
    pub fn is_well_formed(&self) -> bool {
        self.file_type == STEP_RECORD_FILE_TYPE
    }
}
