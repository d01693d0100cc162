//! Retry accounting at the stage level

use crate::helpers::*;
use conveyor::core::status::{RunStatus, StageStatus};

fn retry_pipeline(max_attempts: usize) -> String {
    format!(
        r#"
name: "retry"
stages:
  - id: flaky
    retry:
      max_attempts: {}
      delay_secs: 0
    run:
      - command: "flaky-tool"
"#,
        max_attempts
    )
}

#[tokio::test]
async fn test_succeeds_when_failures_fit_in_budget() {
    // Fails twice, succeeds on the third of three attempts
    let adapter = MockTool::new();
    adapter.script(
        "flaky-tool",
        vec![MockResponse::Exit(1), MockResponse::Exit(1)],
    );

    let run = run_yaml(&retry_pipeline(3), adapter.clone(), &[])
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Success);
    let flaky = run.result("flaky").unwrap();
    assert_eq!(flaky.status, StageStatus::Success);
    assert_eq!(flaky.attempts, 3);
    assert_eq!(adapter.count("flaky-tool"), 3);
}

#[tokio::test]
async fn test_exhausted_attempts_fail_the_stage() {
    // Fails three times against a budget of three total attempts
    let adapter = MockTool::new();
    adapter.script(
        "flaky-tool",
        vec![
            MockResponse::Exit(1),
            MockResponse::Exit(1),
            MockResponse::Exit(1),
        ],
    );

    let run = run_yaml(&retry_pipeline(3), adapter.clone(), &[])
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.result("flaky").unwrap().attempts, 3);
    assert_eq!(adapter.count("flaky-tool"), 3);
}

#[tokio::test]
async fn test_invocations_are_min_of_failures_plus_one_and_budget() {
    for (fail_times, max_attempts, expected) in [(0, 4, 1), (1, 4, 2), (3, 4, 4), (9, 4, 4)] {
        let adapter = MockTool::new();
        adapter.script(
            "flaky-tool",
            (0..fail_times).map(|_| MockResponse::Exit(1)).collect(),
        );
        let _ = run_yaml(&retry_pipeline(max_attempts), adapter.clone(), &[])
            .await
            .unwrap();
        assert_eq!(
            adapter.count("flaky-tool"),
            expected,
            "fail_times={} max_attempts={}",
            fail_times,
            max_attempts
        );
    }
}

#[tokio::test]
async fn test_stage_without_retry_runs_once() {
    let adapter = MockTool::new();
    adapter.script("flaky-tool", vec![MockResponse::Exit(1)]);

    let yaml = r#"
name: "no-retry"
stages:
  - id: once
    run:
      - command: "flaky-tool"
"#;
    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.result("once").unwrap().attempts, 1);
    assert_eq!(adapter.count("flaky-tool"), 1);
}

#[tokio::test]
async fn test_retry_reruns_the_whole_body() {
    // A two-command body: the second command fails on the first pass, so the
    // retry re-invokes both commands
    let adapter = MockTool::new();
    adapter.script("second", vec![MockResponse::Exit(1)]);

    let yaml = r#"
name: "body-retry"
stages:
  - id: pair
    retry:
      max_attempts: 2
      delay_secs: 0
    run:
      - command: "first"
      - command: "second"
"#;
    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(adapter.count("first"), 2);
    assert_eq!(adapter.count("second"), 2);
}
