//! Pipeline domain model

use crate::core::config::{DefinitionError, PipelineConfig, StepConfig};
use crate::core::step::{CommandStep, ExecutableStep, Step, StepIo};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// An ordered, immutable sequence of steps describing a batch workflow.
///
/// A step's identity is its 1-based position; steps are never reordered or
/// renamed after the pipeline is loaded.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    executables: BTreeMap<String, String>,
    steps: Vec<Step>,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration
    pub fn from_config(name: &str, config: &PipelineConfig) -> Result<Self, DefinitionError> {
        config.validate()?;

        let mut steps = Vec::with_capacity(config.steps.len());
        for (position, step_config) in config.steps.iter().enumerate() {
            steps.push(build_step(position + 1, step_config)?);
        }

        Ok(Pipeline {
            name: name.to_string(),
            executables: config.executables.clone(),
            steps,
        })
    }

    /// Load a pipeline from its definition file; the pipeline is named
    /// after the file stem.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let config = PipelineConfig::from_file(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pipeline".to_string());
        Self::from_config(&name, &config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step at a 1-based position
    pub fn step(&self, index: usize) -> Option<&Step> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Version in effect for a logical executable
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.executables.get(name).map(String::as_str)
    }

    /// The set of (name, version) pairs this pipeline needs deployed
    pub fn required_executables(&self) -> BTreeSet<(String, String)> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Executable(executable) => {
                    let version = self
                        .version_of(&executable.name)
                        .unwrap_or_default()
                        .to_string();
                    Some((executable.name.clone(), version))
                }
                Step::Command(_) => None,
            })
            .collect()
    }
}

fn build_step(index: usize, config: &StepConfig) -> Result<Step, DefinitionError> {
    let io = StepIo {
        stdin: config.stdin.clone(),
        stdout: config.stdout.clone(),
        stderr: config.stderr.clone(),
    };

    if let Some(program) = &config.command {
        Ok(Step::Command(CommandStep {
            program: program.clone(),
            arguments: config.arguments.clone(),
            io,
        }))
    } else if let Some(name) = &config.executable {
        Ok(Step::Executable(ExecutableStep {
            name: name.clone(),
            arguments: config.arguments.clone(),
            io,
        }))
    } else {
        Err(DefinitionError::AmbiguousStep { index })
    }
}
