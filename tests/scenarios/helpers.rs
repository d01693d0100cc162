//! Test utility functions for conveyor scenarios

use async_trait::async_trait;
use conveyor::core::config::{ConfigError, PipelineConfig};
use conveyor::core::run::PipelineRun;
use conveyor::exec::Engine;
use conveyor::notify::{Notifier, NotifyError};
use conveyor::tools::collab::{CollabError, DownstreamTrigger, TriggerOutcome};
use conveyor::tools::{Invocation, ToolAdapter, ToolError};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted adapter response
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Exit with a code, empty stdout
    Exit(i32),
    /// Exit with a code and stdout
    ExitWith { code: i32, stdout: String },
    /// Fail to launch
    Launch,
}

/// Mock tool adapter scripted per command token (the first word of the
/// rendered command line). Responses are consumed in order; an exhausted or
/// unscripted token answers exit 0.
pub struct MockTool {
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    log: Mutex<Vec<String>>,
}

impl MockTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, token: &str, responses: Vec<MockResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(token.to_string(), responses.into());
    }

    /// Every command line the engine invoked, in order
    pub fn invocations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// How many invocations started with the given token
    pub fn count(&self, token: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.split_whitespace().next() == Some(token))
            .count()
    }
}

#[async_trait]
impl ToolAdapter for MockTool {
    async fn invoke(
        &self,
        command: &str,
        _env: &HashMap<String, String>,
        _timeout: Duration,
    ) -> Result<Invocation, ToolError> {
        self.log.lock().unwrap().push(command.to_string());
        let token = command.split_whitespace().next().unwrap_or("").to_string();
        let response = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&token)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(MockResponse::Exit(0));

        match response {
            MockResponse::Exit(code) => Ok(Invocation {
                exit_code: code,
                stdout: format!("{} output\n", token),
                stderr: if code == 0 {
                    String::new()
                } else {
                    format!("{} failed\n", token)
                },
                duration_ms: 1,
            }),
            MockResponse::ExitWith { code, stdout } => Ok(Invocation {
                exit_code: code,
                stdout,
                stderr: String::new(),
                duration_ms: 1,
            }),
            MockResponse::Launch => Err(ToolError::Launch {
                command: command.to_string(),
                message: "cannot start process".to_string(),
            }),
        }
    }
}

/// Notifier that counts dispatches and remembers subjects
pub struct CountingNotifier {
    pub sent: AtomicUsize,
    pub subjects: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: AtomicUsize::new(0),
            subjects: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(
        &self,
        _to: &str,
        subject: &str,
        _html_body: &str,
        _attachments: &[PathBuf],
    ) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.subjects.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

/// Downstream trigger that records calls and accepts them
pub struct RecordingTrigger {
    pub calls: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl RecordingTrigger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DownstreamTrigger for RecordingTrigger {
    async fn trigger_job(
        &self,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<TriggerOutcome, CollabError> {
        self.calls
            .lock()
            .unwrap()
            .push((job.to_string(), params.clone()));
        Ok(TriggerOutcome::Accepted)
    }
}

/// Parse, validate and execute a pipeline definition against a mock adapter
pub async fn run_yaml(
    yaml: &str,
    adapter: Arc<MockTool>,
    params: &[(&str, &str)],
) -> Result<PipelineRun, ConfigError> {
    let pipeline = PipelineConfig::from_yaml(yaml)?.to_pipeline()?;
    let supplied: HashMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Engine::new(adapter).execute(&pipeline, &supplied).await
}

/// Same, with a custom-built engine
pub async fn run_yaml_with_engine(
    yaml: &str,
    engine: Engine,
    params: &[(&str, &str)],
) -> Result<PipelineRun, ConfigError> {
    let pipeline = PipelineConfig::from_yaml(yaml)?.to_pipeline()?;
    let supplied: HashMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    engine.execute(&pipeline, &supplied).await
}
