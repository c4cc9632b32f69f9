//! Test: resume executes exactly the steps after the cursor

use crate::helpers::*;
use conveyor::core::StepStatus;
use conveyor::persistence::StateStore;

const DEPLOYMENTS: &str = r#"
file_type: deployments-1
first:
  "1.0": ${root}/bin/first
second:
  "1.0": ${root}/bin/second
third:
  "1.0": ${root}/bin/third
"#;

const PIPELINE: &str = r#"
file_type: pipeline-1
executables:
  first: "1.0"
  second: "1.0"
  third: "1.0"
steps:
  - executable: first
  - executable: second
  - executable: third
"#;

#[tokio::test]
async fn test_resume_skips_finished_prefix() {
    let rig = TestRig::new();
    rig.write_probe("first", "echo ran >> first_runs");
    rig.write_probe("second", "echo ran >> second_runs");
    rig.write_probe("third", "echo ran >> third_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("resumable", PIPELINE);

    // Step 1 already finished in some earlier invocation.
    {
        let mut store = StateStore::open_or_init(rig.instance.path(), "resumable", 3).unwrap();
        store.mark_running(1).unwrap();
        store.mark_finished(1, Some(0)).unwrap();
    }

    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 2);
    assert_statuses(
        &rig,
        &[StepStatus::Finished, StepStatus::Finished, StepStatus::Finished],
    );

    // Exactly steps 2..3 executed; the finished prefix was never re-run.
    assert_eq!(rig.execution_count("first_runs"), 0);
    assert_eq!(rig.execution_count("second_runs"), 1);
    assert_eq!(rig.execution_count("third_runs"), 1);
}

#[tokio::test]
async fn test_cursor_is_rederived_not_incremented() {
    let rig = TestRig::new();
    rig.write_probe("first", "echo ran >> first_runs");
    rig.write_probe("second", "echo ran >> second_runs");
    rig.write_probe("third", "echo ran >> third_runs");
    let deployments = rig.write_deployments(DEPLOYMENTS);
    let pipeline = rig.pipeline("resumable", PIPELINE);

    // Steps 1 and 2 finished, step 3 pending: the cursor must land on 3.
    {
        let mut store = StateStore::open_or_init(rig.instance.path(), "resumable", 3).unwrap();
        for index in 1..=2 {
            store.mark_running(index).unwrap();
            store.mark_finished(index, Some(0)).unwrap();
        }
    }

    let report = rig.run(&pipeline, &deployments).await.unwrap();
    assert_eq!(report.steps_run, 1);
    assert_eq!(rig.execution_count("first_runs"), 0);
    assert_eq!(rig.execution_count("second_runs"), 0);
    assert_eq!(rig.execution_count("third_runs"), 1);
}
