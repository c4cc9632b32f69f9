//! Test: a failing step halts the run and resume picks up at that step

use crate::helpers::*;
use conveyor::core::StepStatus;
use conveyor::execution::RunError;
use conveyor::persistence::StateStore;

const DEPLOYMENTS: &str = r#"
file_type: deployments-1
setup:
  "1.0": ${root}/bin/setup
flaky:
  "1.0": ${root}/bin/flaky
final:
  "1.0": ${root}/bin/final
"#;

const PIPELINE: &str = r#"
file_type: pipeline-1
executables:
  setup: "1.0"
  flaky: "1.0"
  final: "1.0"
steps:
  - executable: setup
  - executable: flaky
  - executable: final
"#;

fn flaky_rig() -> (TestRig, conveyor::core::DeploymentTable, conveyor::core::Pipeline) {
    let rig = TestRig::new();
    rig.write_probe("setup", "echo ran >> setup_runs");
    // Fails with exit 3 until the operator drops a `fixed` marker.
    rig.write_probe(
        "flaky",
        "echo ran >> flaky_runs\nif [ -f fixed ]; then exit 0; else exit 3; fi",
    );
    rig.write_probe("final", "echo ran >> final_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("flaky-pipeline", PIPELINE);
    (rig, deployments, pipeline)
}

#[tokio::test]
async fn test_failure_halts_later_steps() {
    let (rig, deployments, pipeline) = flaky_rig();

    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    match err {
        RunError::StepFailed {
            index,
            name,
            exit_code,
        } => {
            assert_eq!(index, 2);
            assert_eq!(name, "flaky");
            assert_eq!(exit_code, 3);
        }
        other => panic!("expected step failure, got {other:?}"),
    }

    assert_statuses(
        &rig,
        &[StepStatus::Finished, StepStatus::Failed, StepStatus::NeverRun],
    );
    assert_eq!(rig.execution_count("final_runs"), 0);
}

#[tokio::test]
async fn test_rerun_without_reset_reports_failure_without_executing() {
    let (rig, deployments, pipeline) = flaky_rig();

    rig.run(&pipeline, &deployments).await.unwrap_err();
    assert_eq!(rig.execution_count("flaky_runs"), 1);

    let err = rig.run(&pipeline, &deployments).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::PreviouslyFailed {
            index: 2,
            exit_code: 3
        }
    ));

    // Nothing re-executed: not the failed step, not the finished one.
    assert_eq!(rig.execution_count("setup_runs"), 1);
    assert_eq!(rig.execution_count("flaky_runs"), 1);
    assert_statuses(
        &rig,
        &[StepStatus::Finished, StepStatus::Failed, StepStatus::NeverRun],
    );
}

#[tokio::test]
async fn test_reset_then_rerun_resumes_at_failed_step() {
    let (rig, deployments, pipeline) = flaky_rig();

    rig.run(&pipeline, &deployments).await.unwrap_err();

    // Operator intervention: fix the cause, then explicitly reset step 2.
    std::fs::write(rig.instance_path("fixed"), "").unwrap();
    let mut store = StateStore::open_existing(rig.instance.path()).unwrap();
    store.reset(2).unwrap();

    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 2);
    assert_statuses(
        &rig,
        &[StepStatus::Finished, StepStatus::Finished, StepStatus::Finished],
    );

    // Step 1 was never re-executed; step 2 ran once per attempt.
    assert_eq!(rig.execution_count("setup_runs"), 1);
    assert_eq!(rig.execution_count("flaky_runs"), 2);
    assert_eq!(rig.execution_count("final_runs"), 1);
}

#[tokio::test]
async fn test_finished_steps_always_form_a_prefix() {
    let (rig, deployments, pipeline) = flaky_rig();
    rig.run(&pipeline, &deployments).await.unwrap_err();

    let statuses = rig.statuses();
    let first_unfinished = statuses
        .iter()
        .position(|status| *status != StepStatus::Finished)
        .unwrap_or(statuses.len());
    assert!(statuses[..first_unfinished]
        .iter()
        .all(|status| *status == StepStatus::Finished));
    assert!(statuses[first_unfinished..]
        .iter()
        .all(|status| *status != StepStatus::Finished));
}
