//! Test utilities for conveyor scenario tests

use conveyor::core::config::PipelineConfig;
use conveyor::core::{DeploymentTable, Pipeline, StepStatus};
use conveyor::execution::{RunController, RunError, RunReport};
use conveyor::persistence::StatusSnapshot;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// A disposable manifest root plus one instance directory.
///
/// Probes are small shell scripts deployed under `<manifest>/bin` and wired
/// up through a real deployments document, so tests exercise the same
/// resolution path as production runs.
pub struct TestRig {
    pub manifest: TempDir,
    pub instance: TempDir,
}

impl TestRig {
    pub fn new() -> Self {
        let manifest = TempDir::new().expect("manifest dir");
        let instance = TempDir::new().expect("instance dir");
        fs::create_dir_all(manifest.path().join("pipelines")).expect("pipelines dir");
        fs::create_dir_all(manifest.path().join("bin")).expect("bin dir");
        Self { manifest, instance }
    }

    /// Write an executable shell probe under the manifest's bin directory.
    /// Probes run with the instance directory as their working directory.
    pub fn write_probe(&self, file_name: &str, body: &str) -> PathBuf {
        let path = self.manifest.path().join("bin").join(file_name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write probe");
        let mut permissions = fs::metadata(&path).expect("probe metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod probe");
        path
    }

    /// Write the deployments document and load it the way a run would.
    pub fn write_deployments(&self, yaml: &str) -> DeploymentTable {
        let path = self.manifest.path().join("deployments.yaml");
        fs::write(&path, yaml).expect("write deployments");
        DeploymentTable::load(&path, self.manifest.path()).expect("load deployments")
    }

    /// Parse a pipeline definition from YAML.
    pub fn pipeline(&self, name: &str, yaml: &str) -> Pipeline {
        let config = PipelineConfig::from_yaml(yaml)
            .unwrap_or_else(|e| panic!("failed to parse pipeline YAML: {e}"));
        Pipeline::from_config(name, &config).expect("pipeline from config")
    }

    /// Run the pipeline against this rig's instance directory.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        deployments: &DeploymentTable,
    ) -> Result<RunReport, RunError> {
        RunController::new(pipeline, deployments, self.instance.path())
            .run()
            .await
    }

    /// Current per-step statuses in order.
    pub fn statuses(&self) -> Vec<StepStatus> {
        StatusSnapshot::read(self.instance.path())
            .expect("status snapshot")
            .statuses()
    }

    /// Path inside the instance directory.
    pub fn instance_path(&self, relative: &str) -> PathBuf {
        self.instance.path().join(relative)
    }

    /// Number of lines a probe appended to a marker file, i.e. how many
    /// times it actually executed.
    pub fn execution_count(&self, marker: &str) -> usize {
        match fs::read_to_string(self.instance_path(marker)) {
            Ok(content) => content.lines().count(),
            Err(_) => 0,
        }
    }
}

/// Assert the instance's statuses match, in step order.
pub fn assert_statuses(rig: &TestRig, expected: &[StepStatus]) {
    let actual = rig.statuses();
    assert_eq!(
        actual, expected,
        "expected statuses {expected:?}, store has {actual:?}"
    );
}
