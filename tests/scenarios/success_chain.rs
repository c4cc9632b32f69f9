//! Test: a pipeline runs to completion, in order, exactly once

use crate::helpers::*;
use conveyor::core::StepStatus;

const DEPLOYMENTS: &str = r#"
file_type: deployments-1
record-one:
  "1.0": ${root}/bin/record-one
record-two:
  "1.0": ${root}/bin/record-two
"#;

const PIPELINE: &str = r#"
file_type: pipeline-1
executables:
  record-one: "1.0"
  record-two: "1.0"
steps:
  - command: mkdir
    arguments: [work]
  - executable: record-one
  - executable: record-two
"#;

#[tokio::test]
async fn test_full_run_finishes_every_step_in_order() {
    let rig = TestRig::new();
    rig.write_probe("record-one", "echo one >> order.txt");
    rig.write_probe("record-two", "echo two >> order.txt");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("success-chain", PIPELINE);

    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 3);
    assert_eq!(report.total_steps, 3);
    assert!(!report.already_complete);

    assert_statuses(
        &rig,
        &[StepStatus::Finished, StepStatus::Finished, StepStatus::Finished],
    );

    // Steps ran strictly in declaration order.
    let order = std::fs::read_to_string(rig.instance_path("order.txt")).unwrap();
    assert_eq!(order, "one\ntwo\n");
    assert!(rig.instance_path("work").is_dir());
}

#[tokio::test]
async fn test_rerun_of_complete_pipeline_executes_nothing() {
    let rig = TestRig::new();
    rig.write_probe("record-one", "echo ran >> first_runs");
    rig.write_probe("record-two", "echo ran >> second_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("success-chain", PIPELINE);

    rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(rig.execution_count("first_runs"), 1);

    // Idempotent: the second run is a no-op and still succeeds.
    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 0);
    assert!(report.already_complete);
    assert_eq!(rig.execution_count("first_runs"), 1);
    assert_eq!(rig.execution_count("second_runs"), 1);
}
