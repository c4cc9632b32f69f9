//! Test: the mark_running guard keeps two runs off the same step

use crate::helpers::*;
use conveyor::core::StepStatus;
use conveyor::execution::RunError;
use conveyor::persistence::{StateStore, StateStoreError};

const DEPLOYMENTS: &str = r#"
file_type: deployments-1
worker:
  "1.0": ${root}/bin/worker
"#;

const PIPELINE: &str = r#"
file_type: pipeline-1
executables:
  worker: "1.0"
steps:
  - executable: worker
"#;

#[tokio::test]
async fn test_second_run_aborts_when_step_is_running() {
    let rig = TestRig::new();
    rig.write_probe("worker", "echo ran >> worker_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("guarded", PIPELINE);

    // Another invocation owns the step: its RUNNING marker is persisted.
    let mut other = StateStore::open_or_init(rig.instance.path(), "guarded", 1).unwrap();
    other.mark_running(1).unwrap();

    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunningOrCorrupt { index: 1 }));

    // The losing invocation never executed the step.
    assert_eq!(rig.execution_count("worker_runs"), 0);
    assert_statuses(&rig, &[StepStatus::Running]);
}

#[tokio::test]
async fn test_running_marker_from_a_killed_run_blocks_reentry() {
    let rig = TestRig::new();
    rig.write_probe("worker", "echo ran >> worker_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("guarded", PIPELINE);

    // Simulate a controller killed mid-step: RUNNING persisted, no terminal
    // transition ever recorded.
    {
        let mut store = StateStore::open_or_init(rig.instance.path(), "guarded", 1).unwrap();
        store.mark_running(1).unwrap();
    }

    // The next run refuses to treat the stale marker as permission.
    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunningOrCorrupt { index: 1 }));
    assert_eq!(rig.execution_count("worker_runs"), 0);

    // Only an explicit operator reset unblocks the instance.
    let mut store = StateStore::open_existing(rig.instance.path()).unwrap();
    store.reset(1).unwrap();
    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 1);
    assert_eq!(rig.execution_count("worker_runs"), 1);
}

#[tokio::test]
async fn test_store_level_guard_is_an_invalid_transition() {
    let rig = TestRig::new();
    let mut store = StateStore::open_or_init(rig.instance.path(), "guarded", 1).unwrap();
    store.mark_running(1).unwrap();

    // A second handle loses the mark_running race and must not retry.
    let mut late = StateStore::open_or_init(rig.instance.path(), "guarded", 1).unwrap();
    let err = late.mark_running(1).unwrap_err();
    assert!(matches!(
        err,
        StateStoreError::InvalidTransition {
            index: 1,
            from: StepStatus::Running,
            ..
        }
    ));
}
