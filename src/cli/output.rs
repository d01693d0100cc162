//! CLI output formatting

use crate::core::run::{PipelineRun, StageResult};
use crate::core::status::{RunStatus, StageStatus};
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");

/// Spinner shown while a run is executing
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a stage status for display
pub fn format_stage_status(status: StageStatus) -> String {
    match status {
        StageStatus::Success => style("SUCCESS").green().to_string(),
        StageStatus::Failure => style("FAILURE").red().to_string(),
        StageStatus::Unstable => style("UNSTABLE").yellow().to_string(),
        StageStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Unstable => style("UNSTABLE").yellow().to_string(),
        RunStatus::Failure => style("FAILURE").red().to_string(),
    }
}

/// One line per stage for the final report
pub fn format_stage_line(result: &StageResult) -> String {
    let icon = match result.status {
        StageStatus::Success => CHECK,
        StageStatus::Failure => CROSS,
        StageStatus::Unstable => WARN,
        StageStatus::Skipped => INFO,
    };
    let mut line = format!(
        "{}{:<20} {:<10} {:>8}",
        icon,
        result.stage_id,
        format_stage_status(result.status),
        format_duration_ms(result.duration_ms),
    );
    if result.attempts > 1 {
        line.push_str(&format!(" ({} attempts)", result.attempts));
    }
    if let Some(message) = &result.message {
        line.push_str(&format!("  {}", style(message).dim()));
    }
    line
}

/// Print the stage-by-stage report of a finalized run
pub fn print_run_report(run: &PipelineRun) {
    println!();
    for result in &run.results {
        println!("  {}", format_stage_line(result));
    }
    println!();
    println!(
        "{} {} - {} in {}",
        match run.status {
            RunStatus::Success => CHECK,
            RunStatus::Unstable => WARN,
            RunStatus::Failure => CROSS,
        },
        style(&run.pipeline_name).bold(),
        format_run_status(run.status),
        format_duration_ms(run.duration_ms().unwrap_or(0)),
    );
}

/// Format a run summary line for history listings
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = match summary.status {
        RunStatus::Success => CHECK,
        RunStatus::Unstable => WARN,
        RunStatus::Failure => CROSS,
    };
    format!(
        "{}{} - {} - {} ({} stages, {} failed, {} skipped)",
        icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_run_status(summary.status),
        summary.counts.total(),
        summary.counts.failed,
        summary.counts.skipped,
    )
}

/// Human-readable duration
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 1 {
        format!("{}ms", ms)
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
