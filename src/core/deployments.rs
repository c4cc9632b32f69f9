//! Deployment table: versioned executable lookup

use crate::core::config::{DefinitionError, DeploymentsConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder token in deployed paths, substituted with the manifest root
/// when the table is loaded.
pub const ROOT_PLACEHOLDER: &str = "${root}";

/// Errors raised when a (name, version) pair cannot be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown executable {name:?}")]
    UnknownExecutable { name: String },

    #[error("executable {name:?} has no deployed version {version:?}")]
    UnknownVersion { name: String, version: String },
}

/// Registry mapping (executable name, version) to an absolute path.
///
/// Pure lookup: loaded once per invocation, no side effects.
#[derive(Debug, Clone, Default)]
pub struct DeploymentTable {
    paths: HashMap<(String, String), PathBuf>,
}

impl DeploymentTable {
    /// Build the table from a parsed deployments document, anchoring
    /// `${root}` and relative paths at the manifest root.
    pub fn from_config(config: &DeploymentsConfig, root: &Path) -> Self {
        let mut paths = HashMap::new();
        for (name, versions) in &config.executables {
            for (version, path) in versions {
                paths.insert(
                    (name.clone(), version.clone()),
                    construct_path(path, root),
                );
            }
        }
        Self { paths }
    }

    /// Load the table from a deployments YAML file
    pub fn load(path: &Path, root: &Path) -> Result<Self, DefinitionError> {
        let config = DeploymentsConfig::from_file(path)?;
        Ok(Self::from_config(&config, root))
    }

    /// Register a deployment directly (used by tests and embedders)
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<PathBuf>,
    ) {
        self.paths.insert((name.into(), version.into()), path.into());
    }

    /// Resolve a (name, version) pair to the deployed path
    pub fn resolve(&self, name: &str, version: &str) -> Result<&Path, ResolutionError> {
        if let Some(path) = self.paths.get(&(name.to_string(), version.to_string())) {
            return Ok(path);
        }
        if self.paths.keys().any(|(known, _)| known == name) {
            Err(ResolutionError::UnknownVersion {
                name: name.to_string(),
                version: version.to_string(),
            })
        } else {
            Err(ResolutionError::UnknownExecutable {
                name: name.to_string(),
            })
        }
    }

    /// Number of deployed (name, version) pairs
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no deployments are registered
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Expand `${root}` and anchor relative paths at the manifest root.
fn construct_path(path: &str, root: &Path) -> PathBuf {
    let expanded = path.replace(ROOT_PLACEHOLDER, &root.display().to_string());
    let expanded = PathBuf::from(expanded);
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}
