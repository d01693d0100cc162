//! Stage runner - executes one stage body through the tool adapter
//!
//! Outcomes are explicit values, never exceptions: the engine pattern
//! matches on the returned result to decide aborting, downgrading, or
//! continuing.

use crate::core::stage::{OutputSource, Stage};
use crate::core::state::{render_template, PipelineState, StateDelta, Value};
use crate::core::status::{FailurePolicy, ScanStatus, StageStatus};
use crate::core::run::StageResult;
use crate::exec::cancel::CancelSignal;
use crate::exec::retry::with_retry;
use crate::tools::{Invocation, ToolAdapter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Result of one successful body execution
struct BodyOk {
    exit_code: Option<i32>,
    stdout: String,
}

/// Result of a failed body execution. Launch problems and rejected exit
/// codes both land here; the message keeps the deepest tool detail.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct BodyError {
    exit_code: Option<i32>,
    message: String,
}

/// Execute a stage: render and invoke each body command in order, wrapped in
/// the stage's retry policy, then collect declared outputs off the final
/// command. Returns the stage record plus the state delta to apply.
pub async fn run_stage(
    adapter: Arc<dyn ToolAdapter>,
    stage: Arc<Stage>,
    state: Arc<PipelineState>,
    cancel: CancelSignal,
) -> (StageResult, StateDelta) {
    let started = Instant::now();
    let attempts = Arc::new(AtomicUsize::new(0));
    info!("stage {} starting", stage.id);

    let (max_attempts, delay) = match stage.retry {
        Some(policy) => (policy.max_attempts, policy.delay),
        None => (1, Duration::ZERO),
    };

    let body_result = with_retry(max_attempts, delay, &cancel, || {
        let adapter = adapter.clone();
        let stage = stage.clone();
        let state = state.clone();
        let attempts = attempts.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            run_body(adapter.as_ref(), &stage, &state).await
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    let duration_ms = started.elapsed().as_millis() as u64;

    match body_result {
        Ok(body) => collect_outputs(&stage, body, attempts, duration_ms),
        Err(err) => {
            error!("stage {} failed: {}", stage.id, err);
            let status = match stage.failure_policy {
                FailurePolicy::Unstable => StageStatus::Unstable,
                FailurePolicy::Fatal | FailurePolicy::Ignored => StageStatus::Failure,
            };
            (
                StageResult {
                    stage_id: stage.id.clone(),
                    status,
                    exit_code: err.exit_code,
                    duration_ms,
                    attempts,
                    message: Some(err.message),
                    outputs: HashMap::new(),
                },
                StateDelta::default(),
            )
        }
    }
}

async fn run_body(
    adapter: &dyn ToolAdapter,
    stage: &Stage,
    state: &PipelineState,
) -> Result<BodyOk, BodyError> {
    let mut last: Option<Invocation> = None;

    for cmd in &stage.body {
        let line = render_template(&cmd.line, state).map_err(|e| BodyError {
            exit_code: None,
            message: e.to_string(),
        })?;
        let mut env = HashMap::new();
        for (key, template) in &cmd.env {
            let value = render_template(template, state).map_err(|e| BodyError {
                exit_code: None,
                message: e.to_string(),
            })?;
            env.insert(key.clone(), value);
        }

        let invocation = adapter
            .invoke(&line, &env, cmd.timeout)
            .await
            .map_err(|e| BodyError {
                exit_code: None,
                message: e.to_string(),
            })?;

        if !cmd.accepts(invocation.exit_code) {
            return Err(BodyError {
                exit_code: Some(invocation.exit_code),
                message: format!(
                    "command `{}` exited with code {}: {}",
                    line,
                    invocation.exit_code,
                    invocation.error_detail()
                ),
            });
        }
        last = Some(invocation);
    }

    // Validation guarantees a non-empty body
    match last {
        Some(inv) => Ok(BodyOk {
            exit_code: Some(inv.exit_code),
            stdout: inv.stdout,
        }),
        None => Err(BodyError {
            exit_code: None,
            message: format!("stage `{}` has an empty body", stage.id),
        }),
    }
}

/// Read declared outputs off the final command. Recording a findings scan
/// status downgrades the stage to unstable; recording an error scan status
/// fails it outright, whatever the command's accepted exit codes said.
fn collect_outputs(
    stage: &Stage,
    body: BodyOk,
    attempts: usize,
    duration_ms: u64,
) -> (StageResult, StateDelta) {
    let mut delta = StateDelta::default();
    let mut outputs = HashMap::new();
    let mut status = StageStatus::Success;

    for spec in &stage.outputs {
        let value = match &spec.from {
            OutputSource::ExitCode => Value::Int(i64::from(body.exit_code.unwrap_or(-1))),
            OutputSource::Stdout => Value::String(body.stdout.trim().to_string()),
            OutputSource::ScanStatus => {
                let code = body.exit_code.unwrap_or(-1);
                match ScanStatus::from_exit_code(code) {
                    ScanStatus::Clean => {}
                    ScanStatus::Findings => {
                        info!("stage {} reported findings, marking unstable", stage.id);
                        status = StageStatus::Unstable;
                    }
                    ScanStatus::Error(code) => {
                        error!("stage {} scanner error status {}", stage.id, code);
                        return (
                            StageResult {
                                stage_id: stage.id.clone(),
                                status: StageStatus::Failure,
                                exit_code: body.exit_code,
                                duration_ms,
                                attempts,
                                message: Some(format!(
                                    "scanner reported error status {}",
                                    code
                                )),
                                outputs: HashMap::new(),
                            },
                            StateDelta::default(),
                        );
                    }
                }
                Value::Int(i64::from(code))
            }
            OutputSource::Const(value) => value.clone(),
        };
        delta.push(&stage.id, &spec.key, value.clone());
        outputs.insert(spec.key.clone(), value);
    }

    info!("stage {} finished {:?}", stage.id, status);
    (
        StageResult {
            stage_id: stage.id.clone(),
            status,
            exit_code: body.exit_code,
            duration_ms,
            attempts,
            message: None,
            outputs,
        },
        delta,
    )
}
