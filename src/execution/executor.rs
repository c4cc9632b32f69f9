//! Step executor - spawns one step's process and classifies the outcome

use crate::core::deployments::{DeploymentTable, ResolutionError};
use crate::core::pipeline::Pipeline;
use crate::core::step::{substitute_base, Step, StepIo};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors raised while setting up or running one step's process.
///
/// A nonzero exit is not an error here; it comes back as an [`Outcome`].
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("missing stdin input {path}")]
    MissingInput { path: PathBuf },

    #[error("failed to open {path}: {source}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on {program:?}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of running one step's process to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// True when the process exited with status zero
    pub success: bool,

    /// Exit code; None when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// Executes a single step.
///
/// The exit status fully determines success; output content is never
/// interpreted. All handles are released before `execute` returns.
pub struct StepExecutor<'a> {
    pipeline: &'a Pipeline,
    deployments: &'a DeploymentTable,
}

impl<'a> StepExecutor<'a> {
    pub fn new(pipeline: &'a Pipeline, deployments: &'a DeploymentTable) -> Self {
        Self {
            pipeline,
            deployments,
        }
    }

    /// Run one step with the instance directory as its working directory
    /// and wait for it to exit.
    pub async fn execute(&self, step: &Step, base: &Path) -> Result<Outcome, ExecError> {
        let (program, arguments) = match step {
            Step::Command(command) => (command.program.clone(), command.arguments.clone()),
            Step::Executable(executable) => {
                let version = self
                    .pipeline
                    .version_of(&executable.name)
                    .ok_or_else(|| ResolutionError::UnknownExecutable {
                        name: executable.name.clone(),
                    })?;
                let path = self.deployments.resolve(&executable.name, version)?;
                let arguments = executable
                    .arguments
                    .iter()
                    .map(|argument| substitute_base(argument, base))
                    .collect();
                (path.display().to_string(), arguments)
            }
        };

        debug!(%program, ?arguments, base = %base.display(), "spawning step process");

        let mut command = Command::new(&program);
        command
            .args(&arguments)
            .current_dir(base)
            .kill_on_drop(true);
        configure_io(&mut command, step.io(), base)?;

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
        let status = child.wait().await.map_err(|source| ExecError::Wait {
            program: program.clone(),
            source,
        })?;

        if !status.success() {
            warn!(%program, code = status.code(), "step process exited nonzero");
        }
        Ok(Outcome {
            success: status.success(),
            exit_code: status.code(),
        })
    }
}

fn configure_io(command: &mut Command, io: &StepIo, base: &Path) -> Result<(), ExecError> {
    match &io.stdin {
        Some(spec) => {
            let path = resolve_io_path(spec, base);
            let file = std::fs::File::open(&path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ExecError::MissingInput { path: path.clone() }
                } else {
                    ExecError::Redirect {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
            command.stdin(Stdio::from(file));
        }
        None => {
            command.stdin(Stdio::null());
        }
    }

    if let Some(spec) = &io.stdout {
        command.stdout(Stdio::from(open_sink(spec, base)?));
    }
    if let Some(spec) = &io.stderr {
        command.stderr(Stdio::from(open_sink(spec, base)?));
    }
    Ok(())
}

/// Substitute the base placeholder and anchor relative paths at the
/// instance directory.
fn resolve_io_path(spec: &str, base: &Path) -> PathBuf {
    let substituted = substitute_base(spec, base);
    let path = PathBuf::from(substituted);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Open an output redirection target write/truncate, creating parent
/// directories as needed.
fn open_sink(spec: &str, base: &Path) -> Result<std::fs::File, ExecError> {
    let path = resolve_io_path(spec, base);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ExecError::Redirect {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::File::create(&path).map_err(|source| ExecError::Redirect { path, source })
}
