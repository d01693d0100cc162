//! External tool invocation
//!
//! The adapter is the single seam between the engine and the outside world.
//! It runs a command, captures what happened, and interprets nothing: a
//! nonzero exit code is a normal result for the caller to inspect. Only a
//! process that cannot start or outlives its timeout is an error.

pub mod collab;
pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub use collab::{
    Analyzer, BuildTool, CommandTrigger, ContainerRuntime, DownstreamTrigger, HttpHealthCheck,
    ObjectStore, Registry, ScanOutcome, Scanner, SourceControl, TriggerOutcome,
};
pub use process::ProcessAdapter;

/// Errors for invocations that never produced a result
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{command}`: {message}")]
    Launch { command: String, message: String },

    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("network error: {0}")]
    Network(String),
}

/// Captured result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl Invocation {
    /// First non-empty stderr line, falling back to stdout - used for
    /// failure messages
    pub fn error_detail(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .find(|line| !line.trim().is_empty())
            .unwrap_or("(no output)")
            .trim()
            .to_string()
    }
}

/// Uniform interface for invoking any external collaborator
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Run a command with extra environment variables under a timeout.
    /// Nonzero exit codes are returned, not raised.
    async fn invoke(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Invocation, ToolError>;
}
