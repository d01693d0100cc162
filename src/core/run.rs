//! Run records - per-stage results and the accumulated pipeline run

use crate::core::state::Value;
use crate::core::status::{RunStatus, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Immutable record of one stage execution (or skip)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub status: StageStatus,

    /// Exit code of the last command that ran, if any
    pub exit_code: Option<i32>,

    pub duration_ms: u64,

    /// Total body invocations, including retries
    pub attempts: usize,

    /// Failure message from the deepest collaborator call, or the skip reason
    pub message: Option<String>,

    /// Outputs this execution published
    pub outputs: HashMap<String, Value>,
}

impl StageResult {
    pub fn skipped(stage_id: &str, reason: &str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            status: StageStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            attempts: 0,
            message: Some(reason.to_string()),
            outputs: HashMap::new(),
        }
    }
}

/// Accumulated record of one pipeline run. Finalized exactly once, even on
/// early termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<StageResult>,
    finalized: bool,
}

impl PipelineRun {
    pub fn new(pipeline_name: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.to_string(),
            status: RunStatus::Success,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            finalized: false,
        }
    }

    pub fn record(&mut self, result: StageResult) {
        self.results.push(result);
    }

    /// Close the run with the executor's computed overall status. A second
    /// call is a logged no-op.
    pub fn finalize(&mut self, overall: RunStatus) {
        if self.finalized {
            warn!("run {} already finalized", self.run_id);
            return;
        }
        self.status = overall;
        self.finished_at = Some(Utc::now());
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn result(&self, stage_id: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_id == stage_id)
    }

    /// Whether any stage actually executed (a skipped-only run dispatches no
    /// notification)
    pub fn executed_any(&self) -> bool {
        self.results.iter().any(|r| r.status.executed())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at.map(|end| {
            end.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64
        })
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for result in &self.results {
            match result.status {
                StageStatus::Success => counts.succeeded += 1,
                StageStatus::Failure => counts.failed += 1,
                StageStatus::Unstable => counts.unstable += 1,
                StageStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

/// Per-status stage tallies for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub unstable: usize,
    pub skipped: usize,
}

impl RunCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.unstable + self.skipped
    }
}
