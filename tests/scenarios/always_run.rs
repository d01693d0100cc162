//! always_run stages across fatal aborts

use crate::helpers::*;
use conveyor::core::status::{RunStatus, StageStatus};

const ABORTING: &str = r#"
name: "aborting"
stages:
  - id: build
    run:
      - command: "build"
  - id: publish
    run:
      - command: "publish"
  - id: stop-container
    always_run: true
    on_failure: ignored
    run:
      - command: "stop-container"
  - id: remove-image
    always_run: true
    on_failure: ignored
    run:
      - command: "remove-image"
"#;

#[tokio::test]
async fn test_always_run_stages_execute_after_fatal_abort() {
    let adapter = MockTool::new();
    adapter.script("build", vec![MockResponse::Exit(1)]);

    let run = run_yaml(ABORTING, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.result("publish").unwrap().status, StageStatus::Skipped);
    assert_eq!(
        run.result("stop-container").unwrap().status,
        StageStatus::Success
    );
    assert_eq!(
        run.result("remove-image").unwrap().status,
        StageStatus::Success
    );
    assert_eq!(adapter.count("publish"), 0);
    assert_eq!(adapter.count("stop-container"), 1);
    assert_eq!(adapter.count("remove-image"), 1);
}

#[tokio::test]
async fn test_cleanup_failures_after_abort_stay_ignored() {
    let adapter = MockTool::new();
    adapter.script("build", vec![MockResponse::Exit(1)]);
    adapter.script("stop-container", vec![MockResponse::Exit(1)]);

    let run = run_yaml(ABORTING, adapter.clone(), &[]).await.unwrap();

    // The cleanup failure is recorded but changes nothing
    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(
        run.result("stop-container").unwrap().status,
        StageStatus::Failure
    );
    assert_eq!(
        run.result("remove-image").unwrap().status,
        StageStatus::Success
    );
}

#[tokio::test]
async fn test_always_run_executes_normally_without_abort() {
    let adapter = MockTool::new();
    let run = run_yaml(ABORTING, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.result("publish").unwrap().status, StageStatus::Success);
    assert_eq!(
        run.result("stop-container").unwrap().status,
        StageStatus::Success
    );
}
