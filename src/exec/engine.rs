//! Pipeline executor
//!
//! Walks the batch list in declared order, gating each stage on its
//! predicate, aggregating outcomes into the overall run status, and halting
//! forward progress on a fatal failure while still running always_run
//! stages. Parallel group members execute concurrently against a state
//! snapshot; their writes become visible only after the whole group is done.

use crate::core::config::ConfigError;
use crate::core::parameter::resolve_parameters;
use crate::core::pipeline::{Batch, Pipeline};
use crate::core::run::{PipelineRun, StageResult};
use crate::core::stage::Stage;
use crate::core::state::{render_template, PipelineState, StateDelta, StateError, Value};
use crate::core::status::{FailurePolicy, RunStatus, StageStatus};
use crate::exec::cancel::CancelSignal;
use crate::exec::stage_runner::run_stage;
use crate::notify::{LogNotifier, Notifier};
use crate::tools::collab::{DownstreamTrigger, TriggerOutcome};
use crate::tools::ToolAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Single-run pipeline executor
pub struct Engine {
    adapter: Arc<dyn ToolAdapter>,
    notifier: Arc<dyn Notifier>,
    trigger: Option<Arc<dyn DownstreamTrigger>>,
}

impl Engine {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            notifier: Arc::new(LogNotifier),
            trigger: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn DownstreamTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Run the pipeline with the supplied parameter set. Parameter or
    /// environment resolution problems fail the run before any stage
    /// executes; everything after that is captured in the returned
    /// [`PipelineRun`], which is finalized exactly once.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        supplied: &HashMap<String, String>,
    ) -> Result<PipelineRun, ConfigError> {
        let params = resolve_parameters(&pipeline.parameters, supplied)?;
        let env = render_environment(pipeline, &params)?;
        let mut state = PipelineState::new(params, env);

        let mut run = PipelineRun::new(&pipeline.name);
        let mut overall = RunStatus::Success;
        let mut aborting = false;
        info!("run {} of {} starting", run.run_id, pipeline.name);

        for batch in pipeline.batches() {
            match batch {
                Batch::Single(idx) => {
                    let stage = &pipeline.stages[*idx];
                    if let Some(reason) = skip_reason(stage, aborting, &state) {
                        info!("stage {} skipped: {}", stage.id, reason);
                        run.record(StageResult::skipped(&stage.id, &reason));
                        continue;
                    }

                    let (result, delta) = run_stage(
                        self.adapter.clone(),
                        Arc::new(stage.clone()),
                        Arc::new(state.clone()),
                        CancelSignal::new(),
                    )
                    .await;
                    apply_delta(&mut state, &delta);
                    absorb(&mut overall, &mut aborting, &result, stage);
                    run.record(result);
                }
                Batch::Group { id, members } => {
                    self.execute_group(
                        pipeline,
                        id,
                        members,
                        &mut state,
                        &mut run,
                        &mut overall,
                        &mut aborting,
                    )
                    .await;
                }
            }
        }

        run.finalize(overall);
        info!("run {} finished {:?}", run.run_id, run.status);

        self.dispatch_notification(pipeline, &run).await;
        self.fire_downstream(pipeline, &run, &state).await;

        Ok(run)
    }

    /// Run one parallel group. Members execute against a snapshot of the
    /// state taken before the group; with fail_fast, the first fatal member
    /// marks the group FAILURE and cancels the siblings' retry sleeps -
    /// their in-flight invocations still run to completion and every
    /// member's result and outputs are recorded.
    #[allow(clippy::too_many_arguments)]
    async fn execute_group(
        &self,
        pipeline: &Pipeline,
        group_id: &str,
        members: &[usize],
        state: &mut PipelineState,
        run: &mut PipelineRun,
        overall: &mut RunStatus,
        aborting: &mut bool,
    ) {
        let cancel = CancelSignal::new();
        let snapshot = Arc::new(state.clone());
        let mut join_set: JoinSet<(usize, StageResult, StateDelta)> = JoinSet::new();
        let mut collected: Vec<(usize, StageResult, StateDelta)> = Vec::new();

        for &idx in members {
            let stage = &pipeline.stages[idx];
            if let Some(reason) = skip_reason(stage, *aborting, state) {
                info!("stage {} skipped: {}", stage.id, reason);
                collected.push((
                    idx,
                    StageResult::skipped(&stage.id, &reason),
                    StateDelta::default(),
                ));
                continue;
            }

            let adapter = self.adapter.clone();
            let stage = Arc::new(stage.clone());
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let (result, delta) = run_stage(adapter, stage, snapshot, cancel).await;
                (idx, result, delta)
            });
        }

        let mut group_failed = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result, delta)) => {
                    let policy = pipeline.stages[idx].failure_policy;
                    if pipeline.fail_fast
                        && !group_failed
                        && result.status == StageStatus::Failure
                        && policy == FailurePolicy::Fatal
                    {
                        group_failed = true;
                        warn!(
                            "group {} marked FAILURE on member {}, cancelling siblings",
                            group_id, result.stage_id
                        );
                        cancel.cancel();
                    }
                    collected.push((idx, result, delta));
                }
                Err(join_err) => {
                    error!("group {} member task panicked: {}", group_id, join_err);
                }
            }
        }

        // Writes become visible only now, after the whole group completed
        collected.sort_by_key(|(idx, _, _)| *idx);
        for (idx, result, delta) in collected {
            let stage = &pipeline.stages[idx];
            apply_delta(state, &delta);
            absorb(overall, aborting, &result, stage);
            run.record(result);
        }
    }

    /// Dispatch the terminal notification - once per run, never for a run
    /// in which no stage executed. Dispatch problems are logged, never
    /// escalated.
    async fn dispatch_notification(&self, pipeline: &Pipeline, run: &PipelineRun) {
        let Some(settings) = &pipeline.notify else {
            return;
        };
        if !run.executed_any() {
            info!("no stage executed, skipping notification");
            return;
        }
        let subject = crate::notify::subject(run);
        let body = crate::notify::render_html(run);
        if let Err(err) = self.notifier.send(&settings.to, &subject, &body, &[]).await {
            warn!("notification failed: {}", err);
        }
    }

    /// Trigger the configured downstream job, only on overall SUCCESS
    async fn fire_downstream(&self, pipeline: &Pipeline, run: &PipelineRun, state: &PipelineState) {
        let (Some(settings), Some(trigger)) = (&pipeline.downstream, &self.trigger) else {
            return;
        };
        if run.status != RunStatus::Success || !run.executed_any() {
            return;
        }

        let mut params = HashMap::new();
        for (key, template) in &settings.params {
            match render_template(template, state) {
                Ok(rendered) => {
                    params.insert(key.clone(), rendered);
                }
                Err(err) => {
                    warn!("downstream param {} unresolvable: {}", key, err);
                }
            }
        }
        match trigger.trigger_job(&settings.job, &params).await {
            Ok(TriggerOutcome::Accepted) => info!("downstream job {} accepted", settings.job),
            Ok(TriggerOutcome::Rejected) => warn!("downstream job {} rejected", settings.job),
            Err(err) => warn!("downstream trigger failed: {}", err),
        }
    }
}

/// Render the environment partition from parameters, once, at run start
fn render_environment(
    pipeline: &Pipeline,
    params: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, ConfigError> {
    let param_state = PipelineState::new(params.clone(), HashMap::new());
    let mut env = HashMap::new();
    for (key, template) in &pipeline.env_templates {
        let rendered = render_template(template, &param_state).map_err(|err| {
            let missing = match err {
                StateError::UnknownKey(k) => k,
                other => other.to_string(),
            };
            ConfigError::UndeclaredKeyIn {
                target: format!("env value `{}`", key),
                key: missing,
            }
        })?;
        env.insert(key.clone(), Value::String(rendered));
    }
    Ok(env)
}

/// Why a stage will not run, if it won't
fn skip_reason(stage: &Stage, aborting: bool, state: &PipelineState) -> Option<String> {
    if aborting && !stage.always_run {
        return Some("pipeline aborted".to_string());
    }
    match stage.predicate.evaluate(state) {
        Ok(true) => None,
        Ok(false) => Some("run condition not met".to_string()),
        Err(err) => Some(format!("run condition unresolvable: {}", err)),
    }
}

fn apply_delta(state: &mut PipelineState, delta: &StateDelta) {
    // Validation makes collisions impossible; a violation here is a bug
    if let Err(err) = state.apply(delta) {
        error!("state write rejected: {}", err);
    }
}

fn absorb(overall: &mut RunStatus, aborting: &mut bool, result: &StageResult, stage: &Stage) {
    if result.status == StageStatus::Failure && stage.failure_policy == FailurePolicy::Ignored {
        warn!(
            "stage {} failed but its failure policy is ignored",
            result.stage_id
        );
    }
    overall.absorb(result.status, stage.failure_policy);
    if result.status == StageStatus::Failure && stage.failure_policy == FailurePolicy::Fatal {
        *aborting = true;
    }
}
