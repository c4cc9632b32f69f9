//! Pipeline execution: the run controller and the step executor

pub mod engine;
pub mod executor;

pub use engine::{EventHandler, RunController, RunError, RunEvent, RunReport};
pub use executor::{ExecError, Outcome, StepExecutor};
