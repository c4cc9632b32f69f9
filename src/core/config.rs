//! Pipeline and deployments documents loaded from YAML

use crate::core::step::BASE_PLACEHOLDER;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// File type tag expected at the top of every pipeline document
pub const PIPELINE_FILE_TYPE: &str = "pipeline-1";

/// File type tag expected at the top of the deployments document
pub const DEPLOYMENTS_FILE_TYPE: &str = "deployments-1";

/// Errors raised while loading or validating a definition document
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unrecognized file type {found:?} (expected {expected:?})")]
    FileType {
        expected: &'static str,
        found: String,
    },

    #[error("pipeline declares no steps")]
    EmptyPipeline,

    #[error("step {index}: exactly one of `command` or `executable` must be set")]
    AmbiguousStep { index: usize },

    #[error("step {index}: executable {name:?} has no version declared under `executables`")]
    UndeclaredExecutable { index: usize, name: String },

    #[error("step {index}: path {value:?} escapes the instance directory")]
    PathEscape { index: usize, value: String },

    #[error("step {index}: unknown placeholder {token:?} in {value:?}")]
    UnknownPlaceholder {
        index: usize,
        token: String,
        value: String,
    },

    #[error("step {index}: command arguments are literal; {value:?} contains a placeholder")]
    LiteralArguments { index: usize, value: String },
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("static pattern"))
}

/// Top-level pipeline document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Document format tag, must be [`PIPELINE_FILE_TYPE`]
    pub file_type: String,

    /// Version in effect for each logical executable used by the steps
    #[serde(default)]
    pub executables: BTreeMap<String, String>,

    /// Ordered step declarations; position is identity
    pub steps: Vec<StepConfig>,
}

/// One step declaration as written in the pipeline document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// System command to run directly (mutually exclusive with `executable`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Logical executable name (mutually exclusive with `command`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Argument list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,

    /// Stdin source path, relative to the instance directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,

    /// Stdout destination path, relative to the instance directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Stderr destination path, relative to the instance directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl PipelineConfig {
    /// Load a pipeline document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a pipeline document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the document against the pipeline rules
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.file_type != PIPELINE_FILE_TYPE {
            return Err(DefinitionError::FileType {
                expected: PIPELINE_FILE_TYPE,
                found: self.file_type.clone(),
            });
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::EmptyPipeline);
        }

        for (position, step) in self.steps.iter().enumerate() {
            let index = position + 1;
            match (&step.command, &step.executable) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => return Err(DefinitionError::AmbiguousStep { index }),
            }

            if let Some(name) = &step.executable {
                if !self.executables.contains_key(name) {
                    return Err(DefinitionError::UndeclaredExecutable {
                        index,
                        name: name.clone(),
                    });
                }
            }

            for argument in &step.arguments {
                if step.command.is_some() {
                    if placeholder_pattern().is_match(argument) {
                        return Err(DefinitionError::LiteralArguments {
                            index,
                            value: argument.clone(),
                        });
                    }
                } else {
                    check_placeholders(index, argument)?;
                }
            }

            for path in [
                step.stdin.as_ref(),
                step.stdout.as_ref(),
                step.stderr.as_ref(),
            ]
            .into_iter()
            .flatten()
            {
                check_placeholders(index, path)?;
                check_instance_path(index, path)?;
            }
        }

        Ok(())
    }
}

/// Reject any `${...}` token other than the recognized base placeholder.
fn check_placeholders(index: usize, value: &str) -> Result<(), DefinitionError> {
    for capture in placeholder_pattern().captures_iter(value) {
        let token = &capture[1];
        if token != "base" {
            return Err(DefinitionError::UnknownPlaceholder {
                index,
                token: token.to_string(),
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Reject a path that could land outside the instance directory: absolute
/// paths, `..` traversal, and placeholders anywhere but the start.
fn check_instance_path(index: usize, value: &str) -> Result<(), DefinitionError> {
    let escape = || DefinitionError::PathEscape {
        index,
        value: value.to_string(),
    };

    let relative = match value.strip_prefix(BASE_PLACEHOLDER) {
        Some(rest) => rest.trim_start_matches('/'),
        None => {
            if value.contains(BASE_PLACEHOLDER) {
                return Err(escape());
            }
            value
        }
    };

    if relative.starts_with('/') {
        return Err(escape());
    }
    if Path::new(relative)
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return Err(escape());
    }
    Ok(())
}

/// Top-level deployments document: executable name → version → path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentsConfig {
    /// Document format tag, must be [`DEPLOYMENTS_FILE_TYPE`]
    pub file_type: String,

    /// Deployed paths, keyed by executable name then version string
    #[serde(flatten)]
    pub executables: BTreeMap<String, BTreeMap<String, String>>,
}

impl DeploymentsConfig {
    /// Load the deployments document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate the deployments document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let config: DeploymentsConfig = serde_yaml::from_str(yaml)?;
        if config.file_type != DEPLOYMENTS_FILE_TYPE {
            return Err(DefinitionError::FileType {
                expected: DEPLOYMENTS_FILE_TYPE,
                found: config.file_type.clone(),
            });
        }
        Ok(config)
    }
}
