//! Scan-status gating through the whole engine

use crate::helpers::*;
use conveyor::core::status::StageStatus;

const GATED: &str = r#"
name: "gated-publish"

parameters:
  - name: severity_filter
    type: choice
    choices: ["LOW", "LOW,MEDIUM", "HIGH,CRITICAL"]
    default: "HIGH,CRITICAL"

stages:
  - id: scan
    run:
      - command: "trivy image app:latest"
        ok_exit_codes: [0, 1, 2, 3]
    outputs:
      - key: scan_status
        from: scan_status

  - id: publish
    when:
      scan_gate:
        status_key: scan_status
        filter_key: severity_filter
        tolerated: ["LOW", "LOW,MEDIUM"]
    run:
      - command: "publish"
"#;

async fn publish_ran(scan_exit: i32, filter: &str) -> bool {
    let adapter = MockTool::new();
    adapter.script("trivy", vec![MockResponse::Exit(scan_exit)]);
    let run = run_yaml(GATED, adapter.clone(), &[("severity_filter", filter)])
        .await
        .unwrap();
    let published = run.result("publish").unwrap().status == StageStatus::Success;
    assert_eq!(published, adapter.count("publish") == 1);
    published
}

/// The full table over {0,1,2,3} x {tolerated, not-tolerated}, driven
/// through scan execution, output recording, and the publish predicate
#[tokio::test]
async fn test_publish_gate_table() {
    let cases = [
        (0, "LOW,MEDIUM", true),
        (0, "HIGH,CRITICAL", true),
        (1, "LOW,MEDIUM", true),
        (1, "HIGH,CRITICAL", false),
        (2, "LOW,MEDIUM", false),
        (2, "HIGH,CRITICAL", false),
        (3, "LOW,MEDIUM", false),
        (3, "HIGH,CRITICAL", false),
    ];
    for (exit, filter, expected) in cases {
        assert_eq!(
            publish_ran(exit, filter).await,
            expected,
            "scan exit {} with filter {}",
            exit,
            filter
        );
    }
}

/// A scanner error status fails the scan stage even though its exit code was
/// listed as acceptable, so the gate never even evaluates against it
#[tokio::test]
async fn test_error_status_is_always_fatal() {
    let adapter = MockTool::new();
    adapter.script("trivy", vec![MockResponse::Exit(2)]);
    let run = run_yaml(GATED, adapter, &[("severity_filter", "LOW,MEDIUM")])
        .await
        .unwrap();

    assert_eq!(run.result("scan").unwrap().status, StageStatus::Failure);
    assert_eq!(run.result("publish").unwrap().status, StageStatus::Skipped);
}
