//! Engine context: path conventions and the per-invocation handle

use std::path::{Path, PathBuf};

/// Name of the state directory kept inside every instance directory
pub const META_DIR_NAME: &str = ".conveyor";

/// Environment variable providing the default manifest root
pub const ROOT_ENV_VAR: &str = "CONVEYOR_ROOT";

/// Path to a named pipeline definition under the manifest root
pub fn pipeline_path(root: &Path, name: &str) -> PathBuf {
    root.join("pipelines").join(format!("{name}.yaml"))
}

/// Path to the deployments document under the manifest root
pub fn deployments_path(root: &Path) -> PathBuf {
    root.join("deployments.yaml")
}

/// Path to the state directory inside an instance directory
pub fn meta_path(instance: &Path) -> PathBuf {
    instance.join(META_DIR_NAME)
}

/// Manifest root taken from the environment, if set
pub fn root_from_env() -> Option<PathBuf> {
    std::env::var_os(ROOT_ENV_VAR).map(PathBuf::from)
}

/// Explicit handle bundling the manifest root and the instance directory.
///
/// Every core operation receives its paths through this handle; there is no
/// process-wide mutable state.
#[derive(Debug, Clone)]
pub struct EngineContext {
    root: PathBuf,
    instance: PathBuf,
}

impl EngineContext {
    pub fn new(root: impl Into<PathBuf>, instance: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            instance: instance.into(),
        }
    }

    /// The manifest root holding `pipelines/` and `deployments.yaml`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The instance directory this invocation operates on
    pub fn instance(&self) -> &Path {
        &self.instance
    }

    /// Resolve a pipeline reference: an existing file path is used as-is,
    /// anything else is treated as a name under the manifest root.
    pub fn resolve_pipeline_ref(&self, reference: &str) -> PathBuf {
        let direct = Path::new(reference);
        if direct.is_file() {
            direct.to_path_buf()
        } else {
            pipeline_path(&self.root, reference)
        }
    }

    /// Path to the deployments document for this manifest root
    pub fn deployments_path(&self) -> PathBuf {
        deployments_path(&self.root)
    }

    /// Path to the instance's state directory
    pub fn meta_dir(&self) -> PathBuf {
        meta_path(&self.instance)
    }
}
