//! Status models: per-stage outcomes, overall run status, scan status codes

use serde::{Deserialize, Serialize};

/// Terminal status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Stage body completed and every command exited acceptably
    Success,
    /// Stage body failed
    Failure,
    /// Stage completed with tolerated findings, or failed under an
    /// `unstable` failure policy
    Unstable,
    /// Predicate was false, or the pipeline aborted before the stage ran
    Skipped,
}

impl StageStatus {
    /// Whether the stage actually executed its body
    pub fn executed(&self) -> bool {
        !matches!(self, StageStatus::Skipped)
    }
}

/// Overall status of a pipeline run. Worst wins: Failure > Unstable > Success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Unstable,
    Failure,
}

impl RunStatus {
    /// Downgrade to at-best `Unstable`
    pub fn downgrade(&mut self) {
        if matches!(self, RunStatus::Success) {
            *self = RunStatus::Unstable;
        }
    }

    /// Absorb a finished stage's status under its failure policy
    pub fn absorb(&mut self, status: StageStatus, policy: FailurePolicy) {
        match status {
            StageStatus::Success | StageStatus::Skipped => {}
            StageStatus::Unstable => self.downgrade(),
            StageStatus::Failure => match policy {
                FailurePolicy::Fatal => *self = RunStatus::Failure,
                FailurePolicy::Unstable => self.downgrade(),
                FailurePolicy::Ignored => {}
            },
        }
    }

    /// Process exit code for the run: 0 for success (unstable counts as
    /// pass), 1 for failure
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::Unstable => 0,
            RunStatus::Failure => 1,
        }
    }
}

/// How a stage failure impacts the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the pipeline; only always_run stages execute afterwards
    #[default]
    Fatal,
    /// Continue, downgrading the overall status to at-best Unstable
    Unstable,
    /// Log the failure and continue without affecting the overall status
    Ignored,
}

/// Interpreted result of a vulnerability scan, keyed off the scanner's exit
/// code: 0 clean, 1 findings present, anything else a tool error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Clean,
    Findings,
    Error(i32),
}

impl ScanStatus {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => ScanStatus::Clean,
            1 => ScanStatus::Findings,
            other => ScanStatus::Error(other),
        }
    }

    /// The original numeric code
    pub fn code(&self) -> i32 {
        match self {
            ScanStatus::Clean => 0,
            ScanStatus::Findings => 1,
            ScanStatus::Error(code) => *code,
        }
    }
}
