//! Parallel group semantics

use crate::helpers::*;
use conveyor::core::state::Value;
use conveyor::core::status::{RunStatus, StageStatus};
use std::time::{Duration, Instant};

const GROUPED: &str = r#"
name: "grouped"
stages:
  - id: unit-tests
    group: verify
    run:
      - command: "unit-tests"
    outputs:
      - key: unit_report
        from: stdout

  - id: static-analysis
    group: verify
    run:
      - command: "static-analysis"
    outputs:
      - key: analysis_report
        from: stdout

  - id: package
    run:
      - command: "package {{ unit_report }} {{ analysis_report }}"
"#;

#[tokio::test]
async fn test_all_members_succeed_and_outputs_flow_downstream() {
    let adapter = MockTool::new();
    adapter.script(
        "unit-tests",
        vec![MockResponse::ExitWith {
            code: 0,
            stdout: "unit.xml\n".to_string(),
        }],
    );
    adapter.script(
        "static-analysis",
        vec![MockResponse::ExitWith {
            code: 0,
            stdout: "analysis.sarif\n".to_string(),
        }],
    );

    let run = run_yaml(GROUPED, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert!(adapter
        .invocations()
        .contains(&"package unit.xml analysis.sarif".to_string()));
}

#[tokio::test]
async fn test_one_failing_member_fails_the_group_but_keeps_sibling_outputs() {
    let adapter = MockTool::new();
    adapter.script("static-analysis", vec![MockResponse::Exit(1)]);

    let run = run_yaml(GROUPED, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    let unit = run.result("unit-tests").unwrap();
    assert_eq!(unit.status, StageStatus::Success);
    // The successful sibling's outputs are still recorded
    assert_eq!(
        unit.outputs.get("unit_report"),
        Some(&Value::String("unit-tests output".to_string()))
    );
    assert_eq!(
        run.result("static-analysis").unwrap().status,
        StageStatus::Failure
    );
    // The stage after the group never runs
    assert_eq!(run.result("package").unwrap().status, StageStatus::Skipped);
    assert_eq!(adapter.count("package"), 0);
}

#[tokio::test]
async fn test_fail_fast_cancels_sibling_retry_sleeps() {
    // One member fails at once; the other would retry for 30 seconds unless
    // the group's fail-fast cancellation cuts its sleep short.
    let yaml = r#"
name: "fail-fast"
stages:
  - id: quick-fail
    group: verify
    run:
      - command: "quick-fail"
  - id: slow-retry
    group: verify
    retry:
      max_attempts: 5
      delay_secs: 30
    run:
      - command: "slow-retry"
"#;
    let adapter = MockTool::new();
    adapter.script("quick-fail", vec![MockResponse::Exit(1)]);
    adapter.script(
        "slow-retry",
        vec![
            MockResponse::Exit(1),
            MockResponse::Exit(1),
            MockResponse::Exit(1),
            MockResponse::Exit(1),
            MockResponse::Exit(1),
        ],
    );

    let started = Instant::now();
    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    // Well under a single 30s retry sleep
    assert!(started.elapsed() < Duration::from_secs(10));
    // The sibling gave up instead of exhausting its five attempts
    assert!(run.result("slow-retry").unwrap().attempts < 5);
}

#[tokio::test]
async fn test_fail_fast_disabled_lets_stragglers_retry() {
    let yaml = r#"
name: "no-fail-fast"
fail_fast: false
stages:
  - id: quick-fail
    group: verify
    run:
      - command: "quick-fail"
  - id: slow-retry
    group: verify
    retry:
      max_attempts: 3
      delay_secs: 0
    run:
      - command: "slow-retry"
"#;
    let adapter = MockTool::new();
    adapter.script("quick-fail", vec![MockResponse::Exit(1)]);
    adapter.script(
        "slow-retry",
        vec![MockResponse::Exit(1), MockResponse::Exit(1)],
    );

    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    // With fail_fast off the sibling used its whole budget and recovered
    let slow = run.result("slow-retry").unwrap();
    assert_eq!(slow.status, StageStatus::Success);
    assert_eq!(slow.attempts, 3);
}

#[tokio::test]
async fn test_ignored_member_failure_does_not_fail_the_group() {
    let yaml = r#"
name: "tolerant-group"
stages:
  - id: required
    group: verify
    run:
      - command: "required"
  - id: optional
    group: verify
    on_failure: ignored
    run:
      - command: "optional"
  - id: after
    run:
      - command: "after"
"#;
    let adapter = MockTool::new();
    adapter.script("optional", vec![MockResponse::Exit(1)]);

    let run = run_yaml(yaml, adapter.clone(), &[]).await.unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.result("after").unwrap().status, StageStatus::Success);
}
