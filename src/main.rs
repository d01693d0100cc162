mod cli;
mod core;
mod exec;
mod notify;
mod persistence;
mod tools;

use anyhow::{Context, Result};
use cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use cli::output::*;
use cli::{Cli, Command};
use crate::core::config::PipelineConfig;
use exec::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tools::ProcessAdapter;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(err) => {
            println!("{} {}", CROSS, style(&err).red());
            std::process::exit(2);
        }
    };

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let pipeline = match config.to_pipeline() {
        Ok(pipeline) => pipeline,
        Err(err) => {
            println!("{} {}", CROSS, style(&err).red());
            std::process::exit(2);
        }
    };

    let supplied: HashMap<String, String> = cmd.param.iter().cloned().collect();
    for (key, value) in &supplied {
        println!(
            "{} Parameter: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let engine = Engine::new(Arc::new(ProcessAdapter::new()));

    let spinner = create_spinner(&format!("Running {}", pipeline.name));
    let result = engine.execute(&pipeline, &supplied).await;
    spinner.finish_and_clear();

    let run = match result {
        Ok(run) => run,
        Err(err) => {
            println!("{} {}", CROSS, style(&err).red());
            std::process::exit(2);
        }
    };

    print_run_report(&run);

    if !cmd.no_history {
        save_history(&run).await;
    }

    let exit_code = run.status.exit_code();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn save_history(run: &crate::core::run::PipelineRun) {
    use persistence::{create_summary, PersistenceBackend, SqliteRunStore};

    match SqliteRunStore::with_default_path().await {
        Ok(store) => {
            let summary = create_summary(run);
            match store.save_run(&summary).await {
                Ok(()) => println!(
                    "{} Run saved to history (ID: {})",
                    INFO,
                    style(&summary.run_id.to_string()[..8]).dim()
                ),
                Err(err) => println!("{} Could not save history: {}", WARN, err),
            }
        }
        Err(err) => println!("{} Could not open history store: {}", WARN, err),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn save_history(_run: &crate::core::run::PipelineRun) {
    println!("{} History requires the `sqlite` feature", INFO);
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline definition...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Parameters: {}", style(config.parameters.len()).cyan());
            println!("  Stages: {}", style(config.stages.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(err) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(err).red());
            std::process::exit(2);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    use persistence::{PersistenceBackend, SqliteRunStore};

    let store = SqliteRunStore::with_default_path().await?;

    if let Some(run_id_str) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id_str).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => {
                if cmd.json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    println!("{}", format_run_summary(&summary));
                }
            }
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_runs(pipeline_name).await?
    } else {
        let mut all = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all.extend(store.list_runs(&pipeline).await?);
        }
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    };
    let runs: Vec<_> = runs.into_iter().take(cmd.limit).collect();

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn show_history(_cmd: &HistoryCommand) -> Result<()> {
    println!("{} History requires the `sqlite` feature", INFO);
    Ok(())
}
