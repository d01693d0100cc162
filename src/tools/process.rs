//! Process-backed tool adapter - runs commands through the system shell

use crate::tools::{Invocation, ToolAdapter, ToolError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Adapter that invokes commands via `sh -c`
#[derive(Debug, Clone)]
pub struct ProcessAdapter {
    shell: String,
}

impl ProcessAdapter {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a specific shell binary instead of `sh`
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for ProcessAdapter {
    async fn invoke(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        limit: Duration,
    ) -> Result<Invocation, ToolError> {
        debug!("invoking `{}` (timeout {}s)", command, limit.as_secs());
        let started = Instant::now();

        let result = timeout(
            limit,
            Command::new(&self.shell)
                .arg("-c")
                .arg(command)
                .envs(env)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolError::Timeout {
            command: command.to_string(),
            timeout_secs: limit.as_secs(),
        })?;

        let output = result.map_err(|e| ToolError::Launch {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let invocation = Invocation {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            "`{}` exited {} in {}ms",
            command, invocation.exit_code, invocation.duration_ms
        );
        Ok(invocation)
    }
}
