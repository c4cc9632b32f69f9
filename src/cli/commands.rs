//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Run a pipeline in an instance directory, resuming where it left off
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Instance directory to execute in
    pub dir: PathBuf,

    /// Pipeline name under <root>/pipelines, or a path to a pipeline file
    #[arg(short, long)]
    pub pipeline: String,

    /// Manifest root holding pipelines/ and deployments.yaml
    /// (defaults to $CONVEYOR_ROOT)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Don't record this run in history
    #[arg(long)]
    pub no_history: bool,
}

/// Report per-step status for an instance without executing anything
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Instance directory to inspect
    pub dir: PathBuf,

    /// Pipeline reference, used to report on a not-yet-initialized instance
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Manifest root (defaults to $CONVEYOR_ROOT)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Reset a failed or stuck step, or the whole instance, back to never_run
#[derive(Debug, Args, Clone)]
pub struct ResetCommand {
    /// Instance directory to reset
    pub dir: PathBuf,

    /// 1-based step index to reset (defaults to the step at the resume cursor)
    #[arg(long)]
    pub step: Option<usize>,

    /// Remove all recorded state so the next run starts from scratch
    #[arg(long, conflicts_with = "step")]
    pub all: bool,
}

/// Validate a pipeline definition and its deployments without executing
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline name under <root>/pipelines, or a path to a pipeline file
    #[arg(short, long)]
    pub pipeline: String,

    /// Manifest root (defaults to $CONVEYOR_ROOT)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Output the parsed definition in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show recorded run history
#[cfg(feature = "sqlite")]
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a specific run by id
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
