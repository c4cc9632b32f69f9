//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ResetCommand, RunCommand, StatusCommand, ValidateCommand};

#[cfg(feature = "sqlite")]
use commands::HistoryCommand;

/// Resumable batch pipeline runner with durable per-step state
#[derive(Debug, Parser, Clone)]
#[command(name = "conveyor")]
#[command(version = "0.1.0")]
#[command(about = "Run batch pipelines with durable, resumable per-step state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline in an instance directory, resuming where it left off
    Run(RunCommand),

    /// Report per-step status for an instance
    Status(StatusCommand),

    /// Reset a failed or stuck step (or the whole instance) to never_run
    Reset(ResetCommand),

    /// Validate a pipeline definition and its deployments
    Validate(ValidateCommand),

    /// Show recorded run history
    #[cfg(feature = "sqlite")]
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
