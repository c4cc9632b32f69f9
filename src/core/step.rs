//! Step domain model

use std::path::Path;

/// Placeholder token substituted with the instance base directory at run
/// time. Valid in executable-step arguments and in redirection paths.
pub const BASE_PLACEHOLDER: &str = "${base}";

/// One unit of work in a pipeline.
///
/// The step set is closed: a step either names a system command directly or
/// names a logical executable whose version in effect comes from the
/// pipeline's executable-versions section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A system command run directly with literal arguments
    Command(CommandStep),
    /// A versioned executable resolved through the deployment table
    Executable(ExecutableStep),
}

/// A command step: program name plus literal arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    /// Program name, looked up on PATH by the spawned process
    pub program: String,

    /// Literal arguments; no substitution is performed
    pub arguments: Vec<String>,

    /// Stream redirection shared with executable steps
    pub io: StepIo,
}

/// An executable step: logical name, resolved at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableStep {
    /// Logical executable name declared in the pipeline's `executables`
    pub name: String,

    /// Arguments; `${base}` expands to the instance directory
    pub arguments: Vec<String>,

    /// Stream redirection shared with command steps
    pub io: StepIo,
}

/// Redirection configuration common to both step variants.
///
/// Paths are relative to the instance directory and may contain `${base}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepIo {
    /// Where the child's stdin is read from; /dev/null when absent
    pub stdin: Option<String>,

    /// Where the child's stdout is written (truncating); inherited when absent
    pub stdout: Option<String>,

    /// Where the child's stderr is written (truncating); inherited when absent
    pub stderr: Option<String>,
}

impl Step {
    /// The name shown in logs and failure reports: the command program or
    /// the logical executable name.
    pub fn display_name(&self) -> &str {
        match self {
            Step::Command(step) => &step.program,
            Step::Executable(step) => &step.name,
        }
    }

    /// Redirection configuration for this step
    pub fn io(&self) -> &StepIo {
        match self {
            Step::Command(step) => &step.io,
            Step::Executable(step) => &step.io,
        }
    }

    /// Configured arguments, before any substitution
    pub fn arguments(&self) -> &[String] {
        match self {
            Step::Command(step) => &step.arguments,
            Step::Executable(step) => &step.arguments,
        }
    }
}

/// Substitute the instance-directory placeholder into an argument or
/// redirection path. The single fixed token is the whole templating
/// surface; there is no expression language.
pub fn substitute_base(input: &str, base: &Path) -> String {
    input.replace(BASE_PLACEHOLDER, &base.display().to_string())
}
