//! Terminal-run notification
//!
//! A run dispatches exactly one notification when it finalizes with at least
//! one executed stage. The report carries the job identity, every stage's
//! terminal status, and links to published artifacts.

use crate::core::run::PipelineRun;
use crate::core::state::Value;
use crate::core::status::RunStatus;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Notification collaborator: `send(to, subject, htmlBody, attachments)`
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError>;
}

/// Stub notifier that writes the report to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        _attachments: &[PathBuf],
    ) -> Result<(), NotifyError> {
        info!("notification to {}: {}", to, subject);
        info!("{}", html_body);
        Ok(())
    }
}

/// Subject line for a finalized run
pub fn subject(run: &PipelineRun) -> String {
    let verdict = match run.status {
        RunStatus::Success => "SUCCESS",
        RunStatus::Unstable => "UNSTABLE",
        RunStatus::Failure => "FAILURE",
    };
    format!("[conveyor] {} - {} ({})", run.pipeline_name, verdict, run.run_id)
}

/// Artifact links published into stage outputs: any string value that looks
/// like a URL
pub fn artifact_links(run: &PipelineRun) -> Vec<String> {
    let mut links = Vec::new();
    for result in &run.results {
        for value in result.outputs.values() {
            if let Value::String(s) = value {
                if s.starts_with("http://") || s.starts_with("https://") || s.starts_with("s3://") {
                    links.push(s.clone());
                }
            }
        }
    }
    links
}

/// HTML body with the stage-by-stage breakdown and, for failures, the
/// deepest captured error message
pub fn render_html(run: &PipelineRun) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<h2>{}</h2>\n<p>Run {} finished {:?} in {}ms</p>\n<table>\n",
        run.pipeline_name,
        run.run_id,
        run.status,
        run.duration_ms().unwrap_or(0),
    ));
    html.push_str("<tr><th>Stage</th><th>Status</th><th>Duration</th><th>Detail</th></tr>\n");
    for result in &run.results {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:?}</td><td>{}ms</td><td>{}</td></tr>\n",
            result.stage_id,
            result.status,
            result.duration_ms,
            result.message.as_deref().unwrap_or(""),
        ));
    }
    html.push_str("</table>\n");

    let links = artifact_links(run);
    if !links.is_empty() {
        html.push_str("<ul>\n");
        for link in links {
            html.push_str(&format!("<li><a href=\"{}\">{}</a></li>\n", link, link));
        }
        html.push_str("</ul>\n");
    }
    html
}
