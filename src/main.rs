use anyhow::{Context, Result};
use chrono::Utc;
use conveyor::cli::commands::{ResetCommand, RunCommand, StatusCommand, ValidateCommand};
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::core::context::{self, EngineContext};
use conveyor::core::state::StepStatus;
use conveyor::core::{DeploymentTable, Pipeline};
use conveyor::execution::{RunController, RunEvent};
use conveyor::persistence::{StateStore, StateStoreError, StatusSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(feature = "sqlite")]
use conveyor::cli::commands::HistoryCommand;
#[cfg(feature = "sqlite")]
use conveyor::persistence::{HistoryBackend, RunStatus, SqliteHistoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Status(cmd) => show_status(cmd)?,
        Command::Reset(cmd) => reset_instance(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        #[cfg(feature = "sqlite")]
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Manifest root from the flag or the environment
fn manifest_root(flag: &Option<PathBuf>) -> Result<PathBuf> {
    flag.clone().or_else(context::root_from_env).with_context(|| {
        format!(
            "--root or {} must point at the manifest root",
            context::ROOT_ENV_VAR
        )
    })
}

/// Load the pipeline and deployment table for a manifest root
fn load_definitions(root: &Path, pipeline_ref: &str, instance: &Path) -> Result<(Pipeline, DeploymentTable)> {
    let ctx = EngineContext::new(root, instance);
    let pipeline_path = ctx.resolve_pipeline_ref(pipeline_ref);
    let pipeline = Pipeline::load(&pipeline_path)
        .with_context(|| format!("Failed to load pipeline {}", pipeline_path.display()))?;
    let deployments = DeploymentTable::load(&ctx.deployments_path(), ctx.root())
        .with_context(|| format!("Failed to load deployments from {}", ctx.root().display()))?;
    Ok((pipeline, deployments))
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let root = manifest_root(&cmd.root)?;
    let (pipeline, deployments) = load_definitions(&root, &cmd.pipeline, &cmd.dir)?;

    println!(
        "{} Loaded pipeline: {} ({} steps)",
        INFO,
        style(pipeline.name()).bold(),
        style(pipeline.len()).cyan()
    );

    let progress = Arc::new(create_progress_bar(pipeline.len()));
    let progress_events = progress.clone();
    let controller = RunController::new(&pipeline, &deployments, &cmd.dir).on_event(move |event| {
        progress_events.println(format_run_event(event));
        match event {
            RunEvent::StepFinished { .. } => progress_events.inc(1),
            RunEvent::RunStarted { .. } => {
                // Resumed instances start with finished steps already on the bar.
            }
            _ => {}
        }
    });

    let started_at = Utc::now();
    let result = controller.run().await;
    progress.finish_and_clear();

    // Record the invocation in history, success or failure.
    #[cfg(feature = "sqlite")]
    if !cmd.no_history {
        let status = if result.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        match conveyor::persistence::create_summary(pipeline.name(), &cmd.dir, status, started_at) {
            Ok(summary) => {
                let store = SqliteHistoryStore::with_default_path().await?;
                store.record_run(&summary).await?;
                println!(
                    "{} Run recorded in history (ID: {})",
                    INFO,
                    style(&summary.run_id.to_string()[..8]).dim()
                );
            }
            Err(StateStoreError::NotInitialized(_)) => {
                // Nothing ran, nothing to record.
            }
            Err(e) => return Err(e.into()),
        }
    }
    #[cfg(not(feature = "sqlite"))]
    let _ = started_at;

    match result {
        Ok(report) => {
            if report.already_complete {
                println!(
                    "{} {} was already complete; nothing to do",
                    CHECK,
                    style(pipeline.name()).bold()
                );
            } else {
                println!(
                    "{} {} completed {}",
                    CHECK,
                    style(pipeline.name()).bold(),
                    style("successfully").green()
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {} {}", CROSS, style(pipeline.name()).bold(), style("failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Read-only status report. Always exits 0; failures are reported textually.
fn show_status(cmd: &StatusCommand) -> Result<()> {
    match StatusSnapshot::read(&cmd.dir) {
        Ok(snapshot) => {
            if cmd.json {
                let entries: Vec<_> = snapshot
                    .entries()
                    .map(|(index, record)| {
                        serde_json::json!({
                            "step": index,
                            "status": record.status.token(),
                            "exit_code": record.exit_code,
                        })
                    })
                    .collect();
                let data = serde_json::json!({
                    "pipeline": snapshot.pipeline_name(),
                    "steps": entries,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!(
                    "{} Pipeline {} ({} steps)",
                    INFO,
                    style(snapshot.pipeline_name()).bold(),
                    style(snapshot.len()).cyan()
                );
                for (index, record) in snapshot.entries() {
                    println!("{}", format_status_line(index, record));
                }
            }
        }
        Err(StateStoreError::NotInitialized(_)) => match &cmd.pipeline {
            // Not initialized: with a pipeline reference we can still report
            // one never_run per declared step.
            Some(pipeline_ref) => {
                if let Err(e) = report_fresh_instance(cmd, pipeline_ref) {
                    println!("{} {}", WARN, style(e).red());
                }
            }
            None => {
                println!(
                    "{} {} has no recorded state (pass --pipeline to report a fresh instance)",
                    INFO,
                    style(cmd.dir.display()).bold()
                );
            }
        },
        Err(e) => {
            println!("{} {}", WARN, style(e).red());
        }
    }
    Ok(())
}

/// Status report for an instance that has never been initialized: one
/// `never_run` per declared step.
fn report_fresh_instance(cmd: &StatusCommand, pipeline_ref: &str) -> Result<()> {
    let root = manifest_root(&cmd.root)?;
    let ctx = EngineContext::new(&root, &cmd.dir);
    let pipeline = Pipeline::load(&ctx.resolve_pipeline_ref(pipeline_ref))?;
    if cmd.json {
        let entries: Vec<_> = (1..=pipeline.len())
            .map(|index| {
                serde_json::json!({
                    "step": index,
                    "status": StepStatus::NeverRun.token(),
                    "exit_code": null,
                })
            })
            .collect();
        let data = serde_json::json!({
            "pipeline": pipeline.name(),
            "steps": entries,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!(
            "{} Pipeline {} ({} steps, instance not initialized)",
            INFO,
            style(pipeline.name()).bold(),
            style(pipeline.len()).cyan()
        );
        for index in 1..=pipeline.len() {
            println!("{:>4}  {}", index, format_step_status(StepStatus::NeverRun));
        }
    }
    Ok(())
}

fn reset_instance(cmd: &ResetCommand) -> Result<()> {
    if cmd.all {
        StateStore::wipe(&cmd.dir)?;
        println!(
            "{} Cleared all recorded state for {}",
            CHECK,
            style(cmd.dir.display()).bold()
        );
        return Ok(());
    }

    let mut store = StateStore::open_existing(&cmd.dir)?;
    let index = match cmd.step {
        Some(index) => index,
        None => store
            .first_unfinished_index()?
            .context("every step is finished; use --all to start the instance over")?,
    };

    store.reset(index)?;
    println!(
        "{} Step {} reset to {}",
        CHECK,
        style(index).bold(),
        format_step_status(StepStatus::NeverRun)
    );
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let root = manifest_root(&cmd.root)?;
    // Validation never touches an instance; any placeholder target works.
    let result = load_definitions(&root, &cmd.pipeline, Path::new("."));

    match result {
        Ok((pipeline, deployments)) => {
            for (name, version) in pipeline.required_executables() {
                if let Err(e) = deployments.resolve(&name, &version) {
                    println!("{} Validation failed:", CROSS);
                    println!("  {}", style(e).red());
                    std::process::exit(1);
                }
            }

            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(pipeline.name()).bold());
            println!("  Steps: {}", style(pipeline.len()).cyan());
            println!(
                "  Executables: {}",
                style(pipeline.required_executables().len()).cyan()
            );

            if cmd.json {
                let config = conveyor::core::config::PipelineConfig::from_file(
                    EngineContext::new(&root, Path::new(".")).resolve_pipeline_ref(&cmd.pipeline),
                )?;
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteHistoryStore::with_default_path().await?;

    // If a specific run is requested
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
            None => {
                println!("{} Run not found", WARN);
            }
        }
        return Ok(());
    }

    let runs = if let Some(pipeline_name) = &cmd.pipeline {
        store.runs_for(pipeline_name).await?
    } else {
        let pipelines = store.pipelines().await?;
        let mut all_runs = Vec::new();
        for pipeline in &pipelines {
            all_runs.extend(store.runs_for(pipeline).await?);
        }
        all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_runs
    };
    let runs: Vec<_> = runs.into_iter().take(cmd.limit).collect();

    if runs.is_empty() {
        println!("{} No runs recorded", INFO);
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
