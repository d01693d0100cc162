//! Parameter validation at the invocation surface

use crate::helpers::*;
use conveyor::core::config::ConfigError;

const PARAMETERIZED: &str = r#"
name: "parameterized"

parameters:
  - name: branch
    type: string
    default: "main"
  - name: deploy_env
    type: choice
    choices: ["staging", "prod"]
    default: "staging"
  - name: skip_tests
    type: boolean
    default: false

env:
  image_ref: "registry.example.com/app:{{ branch }}"

stages:
  - id: build
    run:
      - command: "build {{ image_ref }}"
  - id: deploy
    when:
      equals: { key: deploy_env, value: "prod" }
    run:
      - command: "deploy {{ image_ref }}"
"#;

#[tokio::test]
async fn test_invalid_choice_runs_zero_stages() {
    let adapter = MockTool::new();
    let err = run_yaml(PARAMETERIZED, adapter.clone(), &[("deploy_env", "qa")])
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidChoice { .. }));
    assert!(adapter.invocations().is_empty());
}

#[tokio::test]
async fn test_unknown_parameter_runs_zero_stages() {
    let adapter = MockTool::new();
    let err = run_yaml(PARAMETERIZED, adapter.clone(), &[("tag", "v1")])
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::UnknownParameter(_)));
    assert!(adapter.invocations().is_empty());
}

#[tokio::test]
async fn test_bad_boolean_runs_zero_stages() {
    let adapter = MockTool::new();
    let err = run_yaml(PARAMETERIZED, adapter.clone(), &[("skip_tests", "maybe")])
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidBoolean { .. }));
    assert!(adapter.invocations().is_empty());
}

#[tokio::test]
async fn test_parameters_flow_into_env_and_predicates() {
    let adapter = MockTool::new();
    let run = run_yaml(
        PARAMETERIZED,
        adapter.clone(),
        &[("branch", "release-1.2"), ("deploy_env", "prod")],
    )
    .await
    .unwrap();

    assert_eq!(run.status, conveyor::core::status::RunStatus::Success);
    let invoked = adapter.invocations();
    assert_eq!(invoked[0], "build registry.example.com/app:release-1.2");
    assert_eq!(invoked[1], "deploy registry.example.com/app:release-1.2");
}

#[tokio::test]
async fn test_defaults_gate_off_the_deploy() {
    let adapter = MockTool::new();
    let run = run_yaml(PARAMETERIZED, adapter.clone(), &[]).await.unwrap();

    assert_eq!(
        run.result("deploy").unwrap().status,
        conveyor::core::status::StageStatus::Skipped
    );
    assert_eq!(adapter.count("deploy"), 0);
}

#[tokio::test]
async fn test_missing_required_parameter_is_a_config_error() {
    let yaml = r#"
name: "required"
parameters:
  - name: registry
    type: string
stages:
  - id: push
    run:
      - command: "push {{ registry }}"
"#;
    let adapter = MockTool::new();
    let err = run_yaml(yaml, adapter.clone(), &[]).await.unwrap_err();

    assert!(matches!(err, ConfigError::MissingParameter(_)));
    assert!(adapter.invocations().is_empty());
}
