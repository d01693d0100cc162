//! Overall status precedence: FAILURE > UNSTABLE > SUCCESS

use crate::helpers::*;
use conveyor::core::status::{RunStatus, StageStatus};

#[tokio::test]
async fn test_one_unstable_stage_makes_the_run_unstable() {
    let yaml = r#"
name: "precedence"
stages:
  - id: fragile
    on_failure: unstable
    run:
      - command: "fragile"
  - id: solid
    run:
      - command: "solid"
"#;
    let adapter = MockTool::new();
    adapter.script("fragile", vec![MockResponse::Exit(1)]);

    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.result("fragile").unwrap().status, StageStatus::Unstable);
    // Pipeline continued past the unstable stage
    assert_eq!(run.result("solid").unwrap().status, StageStatus::Success);
    assert_eq!(run.status, RunStatus::Unstable);
}

#[tokio::test]
async fn test_failure_wins_over_later_unstable_and_success() {
    let yaml = r#"
name: "precedence"
stages:
  - id: broken
    run:
      - command: "broken"
  - id: fragile
    always_run: true
    on_failure: unstable
    run:
      - command: "fragile"
  - id: fine
    always_run: true
    on_failure: ignored
    run:
      - command: "fine"
"#;
    let adapter = MockTool::new();
    adapter.script("broken", vec![MockResponse::Exit(1)]);
    adapter.script("fragile", vec![MockResponse::Exit(1)]);

    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.result("fragile").unwrap().status, StageStatus::Unstable);
    assert_eq!(run.result("fine").unwrap().status, StageStatus::Success);
    assert_eq!(run.status, RunStatus::Failure);
}

#[tokio::test]
async fn test_ignored_failures_leave_the_run_green() {
    let yaml = r#"
name: "precedence"
stages:
  - id: optional
    on_failure: ignored
    run:
      - command: "optional"
  - id: main-work
    run:
      - command: "main-work"
"#;
    let adapter = MockTool::new();
    adapter.script("optional", vec![MockResponse::Exit(1)]);

    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    // The failure is recorded on the stage but not the run
    assert_eq!(run.result("optional").unwrap().status, StageStatus::Failure);
    assert_eq!(run.status, RunStatus::Success);
}

#[tokio::test]
async fn test_all_green_run_is_success() {
    let yaml = r#"
name: "precedence"
stages:
  - id: a
    run: [{ command: "a-work" }]
  - id: b
    run: [{ command: "b-work" }]
"#;
    let adapter = MockTool::new();
    let run = run_yaml(yaml, adapter, &[]).await.unwrap();
    assert_eq!(run.status, RunStatus::Success);
}
