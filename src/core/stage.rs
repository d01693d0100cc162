//! Stage domain model

use crate::core::predicate::Predicate;
use crate::core::state::Value;
use crate::core::status::FailurePolicy;
use std::collections::HashMap;
use std::time::Duration;

/// A single stage in a pipeline
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique stage identifier
    pub id: String,

    /// Run condition, evaluated against the state before the stage starts
    pub predicate: Predicate,

    /// Ordered adapter invocations making up the stage body
    pub body: Vec<Command>,

    /// How a body failure impacts the overall run
    pub failure_policy: FailurePolicy,

    /// Re-invocation policy for the whole body; `None` runs the body once
    pub retry: Option<RetryPolicy>,

    /// Outputs this stage publishes into the pipeline state
    pub outputs: Vec<OutputSpec>,

    /// Stages sharing a group id execute concurrently
    pub parallel_group: Option<String>,

    /// Execute even after a fatal failure has aborted the run
    pub always_run: bool,
}

/// One adapter invocation in a stage body
#[derive(Debug, Clone)]
pub struct Command {
    /// Shell command line; `{{ key }}` placeholders are rendered against the
    /// state just before invocation
    pub line: String,

    /// Extra environment variables for this invocation (values templated)
    pub env: HashMap<String, String>,

    /// Exit codes treated as acceptable (default: just 0). A scan command
    /// that reports findings via exit code 1 lists `[0, 1]` here.
    pub ok_exit_codes: Vec<i32>,

    /// Per-command timeout
    pub timeout: Duration,
}

impl Command {
    pub fn accepts(&self, exit_code: i32) -> bool {
        self.ok_exit_codes.contains(&exit_code)
    }
}

/// Fixed-interval retry policy: `max_attempts` total invocations with a
/// constant sleep between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

/// Where a declared output's value comes from, read off the final command
/// of the body after a successful execution
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSource {
    /// The exit code, as an integer
    ExitCode,
    /// Trimmed stdout
    Stdout,
    /// The exit code interpreted as a scan status; recording a findings
    /// status downgrades the stage to unstable
    ScanStatus,
    /// A fixed value
    Const(Value),
}

/// A declared stage output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub key: String,
    pub from: OutputSource,
}

/// Pipeline-level defaults applied to stages that do not override them
#[derive(Debug, Clone)]
pub struct StageDefaults {
    pub timeout_secs: u64,
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self { timeout_secs: 600 }
    }
}
