//! Test: resolution and shape errors abort before anything executes

use crate::helpers::*;
use conveyor::core::{ResolutionError, StepStatus};
use conveyor::execution::RunError;
use conveyor::persistence::StateStoreError;

#[tokio::test]
async fn test_unresolvable_version_aborts_before_any_step() {
    let rig = TestRig::new();
    rig.write_probe("tool", "echo ran >> tool_runs");
    // Deployed version 1.0; the pipeline asks for 2.0.
    let deployments = rig.write_deployments(
        r#"
file_type: deployments-1
tool:
  "1.0": ${root}/bin/tool
"#,
    );
    let pipeline = rig.pipeline(
        "wants-two",
        r#"
file_type: pipeline-1
executables:
  tool: "2.0"
steps:
  - command: mkdir
    arguments: [work]
  - executable: tool
"#,
    );

    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    match err {
        RunError::Resolution(ResolutionError::UnknownVersion { name, version }) => {
            assert_eq!(name, "tool");
            assert_eq!(version, "2.0");
        }
        other => panic!("expected unknown version, got {other:?}"),
    }

    // The preflight ran before any step: even the mkdir never executed and
    // the store is entirely never_run.
    assert_statuses(&rig, &[StepStatus::NeverRun, StepStatus::NeverRun]);
    assert!(!rig.instance_path("work").exists());
    assert_eq!(rig.execution_count("tool_runs"), 0);
}

#[tokio::test]
async fn test_unknown_executable_name_aborts() {
    let rig = TestRig::new();
    let deployments = rig.write_deployments("file_type: deployments-1\n");
    let pipeline = rig.pipeline(
        "unknown-name",
        r#"
file_type: pipeline-1
executables:
  ghost: "1.0"
steps:
  - executable: ghost
"#,
    );

    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Resolution(ResolutionError::UnknownExecutable { .. })
    ));
    assert_statuses(&rig, &[StepStatus::NeverRun]);
}

#[tokio::test]
async fn test_pipeline_shape_change_is_refused() {
    let rig = TestRig::new();
    let deployments = rig.write_deployments("file_type: deployments-1\n");
    let two_steps = rig.pipeline(
        "shifting",
        "file_type: pipeline-1\nsteps:\n  - command: \"true\"\n  - command: \"true\"\n",
    );

    rig.run(&two_steps, &deployments).await.unwrap();

    // Same pipeline name, one extra step: the existing instance must not
    // silently adopt the new shape.
    let three_steps = rig.pipeline(
        "shifting",
        "file_type: pipeline-1\nsteps:\n  - command: \"true\"\n  - command: \"true\"\n  - command: \"true\"\n",
    );
    let err = rig.run(&three_steps, &deployments).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::StateStore(StateStoreError::PipelineMismatch { .. })
    ));
}
