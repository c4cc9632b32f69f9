//! Durable per-instance execution state store
//!
//! One YAML record per step index lives under `<instance>/.conveyor/steps/`.
//! Every transition is staged in `tmp/`, flushed, then renamed into place,
//! so a record is either fully visible or not visible at all. The store is
//! the single source of truth for resume decisions.

use crate::core::context;
use crate::core::state::{StepRecord, StepStatus, STEP_RECORD_FILE_TYPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File type tag of the store manifest
pub const STORE_MANIFEST_FILE_TYPE: &str = "state-1";

const MANIFEST_FILE: &str = "manifest.yaml";
const STEPS_DIR: &str = "steps";
const TMP_DIR: &str = "tmp";

/// Errors raised by the execution state store
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "pipeline {pipeline:?} with {steps} steps does not match instance state \
         ({existing_pipeline:?} with {existing_steps} steps)"
    )]
    PipelineMismatch {
        pipeline: String,
        steps: usize,
        existing_pipeline: String,
        existing_steps: usize,
    },

    #[error("corrupt state store: {reason}")]
    Corrupt { reason: String },

    #[error("step {index}: invalid transition {from} -> {to}")]
    InvalidTransition {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("instance {0} has no recorded state")]
    NotInitialized(PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreManifest {
    file_type: String,
    pipeline: String,
    step_count: usize,
    created_at: DateTime<Utc>,
}

/// The read-write handle over one instance's execution state.
///
/// The run controller holds the only such handle during a run; everything
/// else observes the instance through [`StatusSnapshot`].
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    step_count: usize,
}

impl StateStore {
    /// Open the state for an instance, creating all-NEVER_RUN records on
    /// first use. Reopening validates that the pipeline still has the shape
    /// recorded at initialization and that FINISHED entries form a prefix.
    pub fn open_or_init(
        instance: &Path,
        pipeline: &str,
        step_count: usize,
    ) -> Result<Self, StateStoreError> {
        let dir = context::meta_path(instance);
        let manifest_path = dir.join(MANIFEST_FILE);

        if manifest_path.is_file() {
            let manifest = read_manifest(&manifest_path)?;
            if manifest.pipeline != pipeline || manifest.step_count != step_count {
                return Err(StateStoreError::PipelineMismatch {
                    pipeline: pipeline.to_string(),
                    steps: step_count,
                    existing_pipeline: manifest.pipeline,
                    existing_steps: manifest.step_count,
                });
            }
            let store = Self {
                dir,
                step_count: manifest.step_count,
            };
            store.validate_finished_prefix()?;
            debug!(instance = %instance.display(), step_count, "opened existing state store");
            return Ok(store);
        }

        // Fresh instance. The manifest is written last: its presence marks a
        // fully initialized store, so a crash mid-init just re-initializes.
        for sub in [STEPS_DIR, TMP_DIR] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(|source| StateStoreError::Io { path, source })?;
        }

        let store = Self { dir, step_count };
        for index in 1..=step_count {
            store.write_record(index, &StepRecord::never_run())?;
        }
        store.write_yaml(
            &store.dir.join(MANIFEST_FILE),
            &StoreManifest {
                file_type: STORE_MANIFEST_FILE_TYPE.to_string(),
                pipeline: pipeline.to_string(),
                step_count,
                created_at: Utc::now(),
            },
        )?;
        info!(instance = %instance.display(), step_count, "initialized state store");
        Ok(store)
    }

    /// Open the state for an instance that must already be initialized.
    pub fn open_existing(instance: &Path) -> Result<Self, StateStoreError> {
        let dir = context::meta_path(instance);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(StateStoreError::NotInitialized(instance.to_path_buf()));
        }
        let manifest = read_manifest(&manifest_path)?;
        Ok(Self {
            dir,
            step_count: manifest.step_count,
        })
    }

    /// Remove all recorded state for an instance. Explicit operator action;
    /// the store never deletes state on its own.
    pub fn wipe(instance: &Path) -> Result<(), StateStoreError> {
        let dir = context::meta_path(instance);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)
                .map_err(|source| StateStoreError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Number of step entries in the store
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// The full record for a 1-based step index
    pub fn record(&self, index: usize) -> Result<StepRecord, StateStoreError> {
        self.check_index(index)?;
        read_record(&self.record_path(index))
    }

    /// Current status of a 1-based step index
    pub fn status(&self, index: usize) -> Result<StepStatus, StateStoreError> {
        Ok(self.record(index)?.status)
    }

    /// Lowest 1-based index whose status is not FINISHED: the resume cursor.
    pub fn first_unfinished_index(&self) -> Result<Option<usize>, StateStoreError> {
        for index in 1..=self.step_count {
            if self.status(index)? != StepStatus::Finished {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// NEVER_RUN -> RUNNING. Any other starting status is refused: this is
    /// the guard that keeps two runs from executing the same step.
    pub fn mark_running(&mut self, index: usize) -> Result<(), StateStoreError> {
        self.check_index(index)?;
        let mut record = self.record(index)?;
        if record.status != StepStatus::NeverRun {
            return Err(StateStoreError::InvalidTransition {
                index,
                from: record.status,
                to: StepStatus::Running,
            });
        }
        record.status = StepStatus::Running;
        record.started_at = Some(Utc::now());
        record.exit_code = None;
        record.ended_at = None;
        self.write_record(index, &record)?;
        debug!(index, "step marked running");
        Ok(())
    }

    /// RUNNING -> FINISHED
    pub fn mark_finished(
        &mut self,
        index: usize,
        exit_code: Option<i32>,
    ) -> Result<(), StateStoreError> {
        self.terminate(index, StepStatus::Finished, exit_code)
    }

    /// RUNNING -> FAILED
    pub fn mark_failed(
        &mut self,
        index: usize,
        exit_code: Option<i32>,
    ) -> Result<(), StateStoreError> {
        self.terminate(index, StepStatus::Failed, exit_code)
    }

    /// FAILED or RUNNING -> NEVER_RUN. Operator action; the run controller
    /// never calls this.
    pub fn reset(&mut self, index: usize) -> Result<(), StateStoreError> {
        self.check_index(index)?;
        let record = self.record(index)?;
        match record.status {
            StepStatus::Failed | StepStatus::Running => {
                self.write_record(index, &StepRecord::never_run())?;
                info!(index, from = %record.status, "step reset to never_run");
                Ok(())
            }
            from => Err(StateStoreError::InvalidTransition {
                index,
                from,
                to: StepStatus::NeverRun,
            }),
        }
    }

    fn terminate(
        &mut self,
        index: usize,
        to: StepStatus,
        exit_code: Option<i32>,
    ) -> Result<(), StateStoreError> {
        self.check_index(index)?;
        let mut record = self.record(index)?;
        if record.status != StepStatus::Running {
            return Err(StateStoreError::InvalidTransition {
                index,
                from: record.status,
                to,
            });
        }
        record.status = to;
        record.exit_code = exit_code;
        record.ended_at = Some(Utc::now());
        self.write_record(index, &record)?;
        debug!(index, status = %to, exit_code, "step reached terminal status");
        Ok(())
    }

    /// FINISHED entries must form a prefix of the step sequence; a finished
    /// record after the cursor means the state was edited out from under us.
    fn validate_finished_prefix(&self) -> Result<(), StateStoreError> {
        let mut cursor_seen = false;
        for index in 1..=self.step_count {
            let status = self.status(index)?;
            if status != StepStatus::Finished {
                cursor_seen = true;
            } else if cursor_seen {
                return Err(StateStoreError::Corrupt {
                    reason: format!(
                        "step {index} is finished but an earlier step is not; \
                         finished steps must form a prefix"
                    ),
                });
            }
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), StateStoreError> {
        if index == 0 || index > self.step_count {
            return Err(StateStoreError::Corrupt {
                reason: format!(
                    "step index {index} out of range (store has {} steps)",
                    self.step_count
                ),
            });
        }
        Ok(())
    }

    fn record_path(&self, index: usize) -> PathBuf {
        self.dir.join(STEPS_DIR).join(record_file_name(index))
    }

    fn write_record(&self, index: usize, record: &StepRecord) -> Result<(), StateStoreError> {
        self.write_yaml_at(
            &self.dir.join(TMP_DIR).join(record_file_name(index)),
            &self.record_path(index),
            record,
        )
    }

    fn write_yaml<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StateStoreError> {
        let staging = self
            .dir
            .join(TMP_DIR)
            .join(path.file_name().unwrap_or_default());
        self.write_yaml_at(&staging, path, value)
    }

    /// Stage, flush, then atomically rename into place. Readers observe
    /// either the old record or the new one, never a partial write.
    fn write_yaml_at<T: Serialize>(
        &self,
        staging: &Path,
        path: &Path,
        value: &T,
    ) -> Result<(), StateStoreError> {
        let io_err = |p: &Path| {
            let path = p.to_path_buf();
            move |source: std::io::Error| StateStoreError::Io { path, source }
        };

        let body = serde_yaml::to_string(value).map_err(|e| StateStoreError::Corrupt {
            reason: format!("failed to serialize record: {e}"),
        })?;
        let mut file = fs::File::create(staging).map_err(io_err(staging))?;
        file.write_all(body.as_bytes()).map_err(io_err(staging))?;
        file.sync_all().map_err(io_err(staging))?;
        drop(file);
        fs::rename(staging, path).map_err(io_err(path))?;
        Ok(())
    }
}

/// A read-only view over an instance's recorded state.
///
/// Safe to take while a run is in progress: each record becomes visible
/// atomically, so the snapshot reflects the most recently persisted state
/// at the time each entry is read.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pipeline: String,
    entries: Vec<StepRecord>,
}

impl StatusSnapshot {
    /// Read the current state of an instance without mutating anything.
    pub fn read(instance: &Path) -> Result<Self, StateStoreError> {
        let dir = context::meta_path(instance);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(StateStoreError::NotInitialized(instance.to_path_buf()));
        }
        let manifest = read_manifest(&manifest_path)?;

        let mut entries = Vec::with_capacity(manifest.step_count);
        for index in 1..=manifest.step_count {
            entries.push(read_record(&dir.join(STEPS_DIR).join(record_file_name(index)))?);
        }
        Ok(Self {
            pipeline: manifest.pipeline,
            entries,
        })
    }

    /// Pipeline name recorded when the instance was initialized
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in step order, paired with their 1-based index
    pub fn entries(&self) -> impl Iterator<Item = (usize, &StepRecord)> + '_ {
        self.entries.iter().enumerate().map(|(i, r)| (i + 1, r))
    }

    /// Statuses in step order
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.entries.iter().map(|record| record.status).collect()
    }
}

fn record_file_name(index: usize) -> String {
    format!("step-{index:04}.yaml")
}

fn read_manifest(path: &Path) -> Result<StoreManifest, StateStoreError> {
    let content = fs::read_to_string(path).map_err(|source| StateStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: StoreManifest =
        serde_yaml::from_str(&content).map_err(|e| StateStoreError::Corrupt {
            reason: format!("unreadable store manifest {}: {e}", path.display()),
        })?;
    if manifest.file_type != STORE_MANIFEST_FILE_TYPE {
        return Err(StateStoreError::Corrupt {
            reason: format!(
                "store manifest {} has file type {:?}",
                path.display(),
                manifest.file_type
            ),
        });
    }
    Ok(manifest)
}

fn read_record(path: &Path) -> Result<StepRecord, StateStoreError> {
    let content = fs::read_to_string(path).map_err(|source| StateStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record: StepRecord =
        serde_yaml::from_str(&content).map_err(|e| StateStoreError::Corrupt {
            reason: format!("unreadable step record {}: {e}", path.display()),
        })?;
    if record.file_type != STEP_RECORD_FILE_TYPE {
        return Err(StateStoreError::Corrupt {
            reason: format!(
                "step record {} has file type {:?}",
                path.display(),
                record.file_type
            ),
        });
    }
    Ok(record)
}
