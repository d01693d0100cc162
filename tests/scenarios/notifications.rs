//! Notification and downstream-trigger dispatch rules

use crate::helpers::*;
use conveyor::exec::Engine;

const NOTIFIED: &str = r#"
name: "notified"

parameters:
  - name: enabled
    type: boolean
    default: true

notify:
  to: "team@example.com"

downstream:
  job: "deploy"

stages:
  - id: work
    when:
      truthy: { key: enabled }
    run:
      - command: "work"
"#;

#[tokio::test]
async fn test_success_dispatches_exactly_one_notification() {
    let adapter = MockTool::new();
    let notifier = CountingNotifier::new();
    let engine = Engine::new(adapter).with_notifier(notifier.clone());

    let run = run_yaml_with_engine(NOTIFIED, engine, &[]).await.unwrap();

    assert!(run.is_finalized());
    assert_eq!(notifier.count(), 1);
    assert!(notifier.subjects.lock().unwrap()[0].contains("SUCCESS"));
}

#[tokio::test]
async fn test_failure_dispatches_exactly_one_notification() {
    let adapter = MockTool::new();
    adapter.script("work", vec![MockResponse::Exit(1)]);
    let notifier = CountingNotifier::new();
    let engine = Engine::new(adapter).with_notifier(notifier.clone());

    let _ = run_yaml_with_engine(NOTIFIED, engine, &[]).await.unwrap();

    assert_eq!(notifier.count(), 1);
    assert!(notifier.subjects.lock().unwrap()[0].contains("FAILURE"));
}

#[tokio::test]
async fn test_skipped_only_run_sends_nothing() {
    let adapter = MockTool::new();
    let notifier = CountingNotifier::new();
    let trigger = RecordingTrigger::new();
    let engine = Engine::new(adapter.clone())
        .with_notifier(notifier.clone())
        .with_trigger(trigger.clone());

    let run = run_yaml_with_engine(NOTIFIED, engine, &[("enabled", "false")])
        .await
        .unwrap();

    assert!(!run.executed_any());
    assert_eq!(notifier.count(), 0);
    // A run with no executed stage triggers nothing downstream either
    assert_eq!(trigger.count(), 0);
    assert!(adapter.invocations().is_empty());
}

#[tokio::test]
async fn test_downstream_fires_only_on_success() {
    for (work_exit, expected_triggers) in [(0, 1), (1, 0)] {
        let adapter = MockTool::new();
        adapter.script("work", vec![MockResponse::Exit(work_exit)]);
        let trigger = RecordingTrigger::new();
        let engine = Engine::new(adapter).with_trigger(trigger.clone());

        let _ = run_yaml_with_engine(NOTIFIED, engine, &[]).await.unwrap();

        assert_eq!(trigger.count(), expected_triggers, "exit {}", work_exit);
    }
}
