//! conveyor - a resumable batch pipeline runner with durable per-step state

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{DeploymentTable, EngineContext, Pipeline, ResolutionError, Step, StepStatus};
pub use execution::{Outcome, RunController, RunError, RunEvent, RunReport, StepExecutor};
pub use persistence::{StateStore, StateStoreError, StatusSnapshot};
