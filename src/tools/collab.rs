//! Typed collaborator clients
//!
//! Thin wrappers over the tool adapter that know how to invoke one external
//! collaborator and interpret its result. The engine itself never depends on
//! these - stage bodies stay plain commands - but they are the contract a
//! pipeline definition builds on, and the scan/publish gating consumes their
//! interpretation.

use crate::core::status::ScanStatus;
use crate::exec::cancel::CancelSignal;
use crate::exec::retry::with_retry;
use crate::tools::{ToolAdapter, ToolError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from collaborator calls
#[derive(Debug, Error)]
pub enum CollabError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{tool} exited with code {code}: {detail}")]
    Failed {
        tool: String,
        code: i32,
        detail: String,
    },
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Source-control collaborator: `checkout(branch, credentialsRef)`
pub struct SourceControl {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
}

impl SourceControl {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Clone a branch into a directory named after the repository, returning
    /// the working directory path. Any failure here is fatal to the owning
    /// stage.
    pub async fn checkout(
        &self,
        repo_url: &str,
        branch: &str,
        credentials_ref: Option<&str>,
    ) -> Result<PathBuf, CollabError> {
        let dir = repo_url
            .rsplit('/')
            .next()
            .unwrap_or("workspace")
            .trim_end_matches(".git")
            .to_string();
        let mut env = HashMap::new();
        if let Some(cred) = credentials_ref {
            env.insert("CREDENTIALS_REF".to_string(), cred.to_string());
        }
        let command = format!("git clone --branch {} {} {}", branch, repo_url, dir);
        let inv = self.adapter.invoke(&command, &env, self.timeout).await?;
        if inv.exit_code != 0 {
            return Err(CollabError::Failed {
                tool: "checkout".to_string(),
                code: inv.exit_code,
                detail: inv.error_detail(),
            });
        }
        Ok(PathBuf::from(dir))
    }
}

/// Build-tool collaborator: `build(projectPath, skipTests)`
pub struct BuildTool {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
}

impl BuildTool {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Package the project, returning the produced artifact paths
    pub async fn build(
        &self,
        project_path: &Path,
        skip_tests: bool,
    ) -> Result<Vec<PathBuf>, CollabError> {
        let mut command = format!("mvn -B -f {} package", project_path.display());
        if skip_tests {
            command.push_str(" -DskipTests");
        }
        let inv = self
            .adapter
            .invoke(&command, &HashMap::new(), self.timeout)
            .await?;
        if inv.exit_code != 0 {
            return Err(CollabError::Failed {
                tool: "build".to_string(),
                code: inv.exit_code,
                detail: inv.error_detail(),
            });
        }

        let list = format!("ls {}/target/*.jar", project_path.display());
        let listing = self
            .adapter
            .invoke(&list, &HashMap::new(), self.timeout)
            .await?;
        Ok(listing
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| PathBuf::from(l.trim()))
            .collect())
    }
}

/// Static-analysis collaborator: `analyze(binariesPath, projectKey, orgKey)`
pub struct Analyzer {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Run the analysis and return a report reference. Errors carry the
    /// underlying tool message so the final report can show it.
    pub async fn analyze(
        &self,
        binaries_path: &Path,
        project_key: &str,
        org_key: &str,
    ) -> Result<String, CollabError> {
        let command = format!(
            "sonar-scanner -Dsonar.projectKey={} -Dsonar.organization={} -Dsonar.java.binaries={}",
            project_key,
            org_key,
            binaries_path.display()
        );
        let inv = self
            .adapter
            .invoke(&command, &HashMap::new(), self.timeout)
            .await?;
        if inv.exit_code != 0 {
            return Err(CollabError::Failed {
                tool: "analyze".to_string(),
                code: inv.exit_code,
                detail: inv.error_detail(),
            });
        }
        Ok(inv.stdout.trim().to_string())
    }
}

/// Result of a completed vulnerability scan
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub report_path: PathBuf,
}

/// Vulnerability-scan collaborator: `scanImage(imageRef, severityFilter,
/// cacheDir)`. A completed scan is always `Ok` - the caller feeds the status
/// into the publish gate; only a scanner that could not run is an error.
pub struct Scanner {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
}

impl Scanner {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub async fn scan_image(
        &self,
        image_ref: &str,
        severity_filter: &str,
        cache_dir: &Path,
    ) -> Result<ScanOutcome, CollabError> {
        let report_path = cache_dir.join("scan-report.json");
        let command = format!(
            "trivy image --severity {} --exit-code 1 --format json --output {} {}",
            severity_filter,
            report_path.display(),
            image_ref
        );
        let mut env = HashMap::new();
        env.insert(
            "TRIVY_CACHE_DIR".to_string(),
            cache_dir.display().to_string(),
        );
        let inv = self.adapter.invoke(&command, &env, self.timeout).await?;
        Ok(ScanOutcome {
            status: ScanStatus::from_exit_code(inv.exit_code),
            report_path,
        })
    }
}

/// Artifact/object-storage collaborator: `upload(localPath, remoteKey)`.
/// Returns `None` when the local file is absent or empty - a missing report
/// is a skip, not an error.
pub struct ObjectStore {
    adapter: Arc<dyn ToolAdapter>,
    bucket: String,
    timeout: Duration,
}

impl ObjectStore {
    pub fn new(adapter: Arc<dyn ToolAdapter>, bucket: impl Into<String>) -> Self {
        Self {
            adapter,
            bucket: bucket.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub async fn upload(
        &self,
        local: &Path,
        remote_key: &str,
    ) -> Result<Option<String>, CollabError> {
        match tokio::fs::metadata(local).await {
            Ok(meta) if meta.len() == 0 => {
                info!("skipping upload of empty file {}", local.display());
                return Ok(None);
            }
            Err(_) => {
                info!("skipping upload, {} does not exist", local.display());
                return Ok(None);
            }
            Ok(_) => {}
        }

        let remote_url = format!("s3://{}/{}", self.bucket, remote_key);
        let command = format!("aws s3 cp {} {}", local.display(), remote_url);
        let inv = self
            .adapter
            .invoke(&command, &HashMap::new(), self.timeout)
            .await?;
        if inv.exit_code != 0 {
            return Err(CollabError::Failed {
                tool: "upload".to_string(),
                code: inv.exit_code,
                detail: inv.error_detail(),
            });
        }
        Ok(Some(remote_url))
    }
}

/// Registry collaborator: `push(imageRef)`, wrapped in the retry wrapper
pub struct Registry {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
    max_attempts: usize,
    delay: Duration,
}

impl Registry {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: usize, delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.delay = delay;
        self
    }

    pub async fn push(&self, image_ref: &str) -> Result<(), CollabError> {
        let cancel = CancelSignal::new();
        let command = format!("docker push {}", image_ref);
        with_retry(self.max_attempts, self.delay, &cancel, || {
            let adapter = self.adapter.clone();
            let command = command.clone();
            let timeout = self.timeout;
            async move {
                let inv = adapter.invoke(&command, &HashMap::new(), timeout).await?;
                if inv.exit_code != 0 {
                    return Err(CollabError::Failed {
                        tool: "push".to_string(),
                        code: inv.exit_code,
                        detail: inv.error_detail(),
                    });
                }
                Ok(())
            }
        })
        .await
    }
}

/// Container-runtime collaborator. The cleanup calls are best-effort:
/// failures are logged and swallowed so teardown never fails a run.
pub struct ContainerRuntime {
    adapter: Arc<dyn ToolAdapter>,
    timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Start a container, returning its id
    pub async fn run(
        &self,
        image_ref: &str,
        port_map: &[(u16, u16)],
    ) -> Result<String, CollabError> {
        let ports: String = port_map
            .iter()
            .map(|(host, container)| format!(" -p {}:{}", host, container))
            .collect();
        let command = format!("docker run -d{} {}", ports, image_ref);
        let inv = self
            .adapter
            .invoke(&command, &HashMap::new(), self.timeout)
            .await?;
        if inv.exit_code != 0 {
            return Err(CollabError::Failed {
                tool: "container run".to_string(),
                code: inv.exit_code,
                detail: inv.error_detail(),
            });
        }
        Ok(inv.stdout.trim().to_string())
    }

    pub async fn stop(&self, container_id: &str) {
        self.best_effort(&format!("docker stop {}", container_id))
            .await;
    }

    pub async fn remove(&self, container_id: &str) {
        self.best_effort(&format!("docker rm {}", container_id))
            .await;
    }

    pub async fn remove_image(&self, image_ref: &str) {
        self.best_effort(&format!("docker rmi {}", image_ref)).await;
    }

    async fn best_effort(&self, command: &str) {
        match self.adapter.invoke(command, &HashMap::new(), self.timeout).await {
            Ok(inv) if inv.exit_code != 0 => {
                warn!("cleanup `{}` exited {}: {}", command, inv.exit_code, inv.error_detail());
            }
            Err(err) => warn!("cleanup `{}` could not run: {}", command, err),
            Ok(_) => {}
        }
    }
}

/// Health-check collaborator: `httpGet(url) -> statusCode`, retried a fixed
/// number of times with a fixed sleep between attempts
pub struct HttpHealthCheck {
    client: reqwest::Client,
    max_attempts: usize,
    delay: Duration,
}

impl HttpHealthCheck {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts,
            delay,
        }
    }

    /// Probe the URL until it answers with a success status. Exhausted
    /// retries surface the last failure, which the owning stage treats as
    /// fatal.
    pub async fn probe(&self, url: &str) -> Result<u16, CollabError> {
        let cancel = CancelSignal::new();
        with_retry(self.max_attempts, self.delay, &cancel, || {
            let client = self.client.clone();
            let url = url.to_string();
            async move {
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| CollabError::Tool(ToolError::Network(e.to_string())))?;
                let status = response.status();
                if status.is_success() {
                    Ok(status.as_u16())
                } else {
                    Err(CollabError::Failed {
                        tool: "health check".to_string(),
                        code: status.as_u16() as i32,
                        detail: format!("{} answered {}", url, status),
                    })
                }
            }
        })
        .await
    }
}

/// Outcome of a downstream job trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted,
    Rejected,
}

/// Downstream-trigger collaborator: `triggerJob(jobName, params)`, invoked
/// by the engine only when the run finishes SUCCESS
#[async_trait]
pub trait DownstreamTrigger: Send + Sync {
    async fn trigger_job(
        &self,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<TriggerOutcome, CollabError>;
}

/// Trigger that shells out to a CI client binary
pub struct CommandTrigger {
    adapter: Arc<dyn ToolAdapter>,
    program: String,
    timeout: Duration,
}

impl CommandTrigger {
    pub fn new(adapter: Arc<dyn ToolAdapter>, program: impl Into<String>) -> Self {
        Self {
            adapter,
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
impl DownstreamTrigger for CommandTrigger {
    async fn trigger_job(
        &self,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<TriggerOutcome, CollabError> {
        let mut pairs: Vec<_> = params.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let args: String = pairs
            .iter()
            .map(|(k, v)| format!(" {}={}", k, v))
            .collect();
        let command = format!("{} trigger {}{}", self.program, job, args);
        let inv = self
            .adapter
            .invoke(&command, &HashMap::new(), self.timeout)
            .await?;
        Ok(if inv.exit_code == 0 {
            TriggerOutcome::Accepted
        } else {
            TriggerOutcome::Rejected
        })
    }
}
