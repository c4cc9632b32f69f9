//! Run controller - orchestrates a full `run` over one instance

use crate::core::config::DefinitionError;
use crate::core::deployments::{DeploymentTable, ResolutionError};
use crate::core::pipeline::Pipeline;
use crate::core::state::StepStatus;
use crate::execution::executor::{ExecError, StepExecutor};
use crate::persistence::store::{StateStore, StateStoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Events emitted while a run progresses, consumed by the CLI
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        pipeline: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        name: String,
    },
    StepFinished {
        index: usize,
        name: String,
    },
    StepFailed {
        index: usize,
        name: String,
        exit_code: Option<i32>,
    },
    RunCompleted {
        steps_run: usize,
        total_steps: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    #[error("step {index} ({name}) failed with exit code {exit_code}")]
    StepFailed {
        index: usize,
        name: String,
        exit_code: i32,
    },

    #[error(
        "step {index} previously failed with exit code {exit_code}; \
         reset it before re-running"
    )]
    PreviouslyFailed { index: usize, exit_code: i32 },

    #[error(
        "step {index} is already marked running; another run may be active \
         or the instance needs an explicit reset"
    )]
    AlreadyRunningOrCorrupt { index: usize },

    #[error("step {index} ({name}) could not be executed: {source}")]
    Executor {
        index: usize,
        name: String,
        #[source]
        source: ExecError,
    },
}

/// What a successful run accomplished
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    /// Total steps in the pipeline
    pub total_steps: usize,

    /// Steps executed by this invocation
    pub steps_run: usize,

    /// True when every step was already finished before this invocation
    pub already_complete: bool,
}

/// Orchestrates one `run` invocation over one instance directory.
///
/// The controller holds the only read-write handle to the state store for
/// the duration of the run. Steps execute strictly sequentially; the resume
/// cursor is re-derived from the store before every step.
pub struct RunController<'a> {
    pipeline: &'a Pipeline,
    deployments: &'a DeploymentTable,
    instance: PathBuf,
    handlers: Vec<EventHandler>,
}

impl<'a> RunController<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        deployments: &'a DeploymentTable,
        instance: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            deployments,
            instance: instance.into(),
            handlers: Vec::new(),
        }
    }

    /// Register an event handler
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    fn emit(&self, event: RunEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Execute the pipeline from the resume cursor to completion or first
    /// failure.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut store = StateStore::open_or_init(
            &self.instance,
            self.pipeline.name(),
            self.pipeline.len(),
        )?;

        // Resolution preflight: an unresolvable pair aborts before any step
        // executes, leaving earlier completed state untouched.
        for (name, version) in self.pipeline.required_executables() {
            self.deployments.resolve(&name, &version)?;
        }

        info!(
            pipeline = self.pipeline.name(),
            instance = %self.instance.display(),
            "starting run"
        );
        self.emit(RunEvent::RunStarted {
            pipeline: self.pipeline.name().to_string(),
            total_steps: self.pipeline.len(),
        });

        let executor = StepExecutor::new(self.pipeline, self.deployments);
        let mut steps_run = 0;

        loop {
            let Some(index) = store.first_unfinished_index()? else {
                info!(pipeline = self.pipeline.name(), steps_run, "pipeline complete");
                self.emit(RunEvent::RunCompleted {
                    steps_run,
                    total_steps: self.pipeline.len(),
                });
                return Ok(RunReport {
                    total_steps: self.pipeline.len(),
                    steps_run,
                    already_complete: steps_run == 0,
                });
            };

            match store.status(index)? {
                StepStatus::NeverRun => {}
                StepStatus::Failed => {
                    let record = store.record(index)?;
                    return Err(RunError::PreviouslyFailed {
                        index,
                        exit_code: record.exit_code.unwrap_or(-1),
                    });
                }
                StepStatus::Running => {
                    return Err(RunError::AlreadyRunningOrCorrupt { index });
                }
                // Unreachable through the cursor, but the store can change
                // under us; loop around and re-derive.
                StepStatus::Finished => continue,
            }

            let step = self.pipeline.step(index).ok_or_else(|| {
                StateStoreError::Corrupt {
                    reason: format!("store cursor {index} is outside the pipeline"),
                }
            })?;
            let name = step.display_name().to_string();

            // The RUNNING marker must be durable before any side effect of
            // the step is allowed to happen.
            match store.mark_running(index) {
                Ok(()) => {}
                Err(StateStoreError::InvalidTransition { .. }) => {
                    return Err(RunError::AlreadyRunningOrCorrupt { index });
                }
                Err(other) => return Err(other.into()),
            }
            info!(index, step = %name, "running step");
            self.emit(RunEvent::StepStarted {
                index,
                name: name.clone(),
            });

            match executor.execute(step, &self.instance).await {
                Ok(outcome) if outcome.success => {
                    store.mark_finished(index, outcome.exit_code)?;
                    steps_run += 1;
                    self.emit(RunEvent::StepFinished {
                        index,
                        name: name.clone(),
                    });
                }
                Ok(outcome) => {
                    store.mark_failed(index, outcome.exit_code)?;
                    error!(index, step = %name, code = outcome.exit_code, "step failed; halting run");
                    self.emit(RunEvent::StepFailed {
                        index,
                        name: name.clone(),
                        exit_code: outcome.exit_code,
                    });
                    return Err(RunError::StepFailed {
                        index,
                        name,
                        exit_code: outcome.exit_code.unwrap_or(-1),
                    });
                }
                Err(exec_error) => {
                    store.mark_failed(index, None)?;
                    error!(index, step = %name, error = %exec_error, "step could not be executed");
                    self.emit(RunEvent::StepFailed {
                        index,
                        name: name.clone(),
                        exit_code: None,
                    });
                    return Err(RunError::Executor {
                        index,
                        name,
                        source: exec_error,
                    });
                }
            }
        }
    }
}
