//! CLI output formatting

use crate::core::state::{StepRecord, StepStatus};
use crate::execution::RunEvent;
use crate::persistence::{RunStatus, RunSummary};
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
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over the pipeline's steps
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step status token for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::NeverRun => style("never_run").dim().to_string(),
        StepStatus::Running => style("running").yellow().to_string(),
        StepStatus::Finished => style("finished").green().to_string(),
        StepStatus::Failed => style("failed").red().to_string(),
    }
}

/// Format one status report line: index, token, exit indicator when terminal
pub fn format_status_line(index: usize, record: &StepRecord) -> String {
    let mut line = format!("{:>4}  {}", index, format_step_status(record.status));
    if record.status.is_terminal() {
        let exit = match record.exit_code {
            Some(code) => format!("exit {code}"),
            None => "no exit code".to_string(),
        };
        line.push_str(&format!("  {}", style(format!("({exit})")).dim()));
    }
    line
}

/// Format a run event for display
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            pipeline,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({} steps)",
            ROCKET,
            style(pipeline).bold(),
            style(total_steps).cyan()
        ),
        RunEvent::StepStarted { index, name } => {
            format!("{} step {} ({})", SPINNER, index, style(name).cyan())
        }
        RunEvent::StepFinished { index, name } => {
            format!("{} step {} ({})", CHECK, index, style(name).green())
        }
        RunEvent::StepFailed {
            index,
            name,
            exit_code,
        } => {
            let exit = match exit_code {
                Some(code) => format!("exit {code}"),
                None => "no exit code".to_string(),
            };
            format!(
                "{} step {} ({}) {}",
                CROSS,
                index,
                style(name).red(),
                style(exit).dim()
            )
        }
        RunEvent::RunCompleted {
            steps_run,
            total_steps,
        } => {
            if *steps_run == 0 {
                format!(
                    "{} Pipeline already complete ({} steps)",
                    INFO,
                    style(total_steps).cyan()
                )
            } else {
                format!(
                    "{} Pipeline complete ({} of {} steps run now)",
                    INFO,
                    style(steps_run).green(),
                    style(total_steps).cyan()
                )
            }
        }
    }
}

/// Format a run status for display
pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("completed").green().to_string(),
        RunStatus::Failed => style("failed").red().to_string(),
    }
}

/// Format a run history entry for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
    };

    format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_run_status(summary.status),
        summary.steps_finished,
        summary.steps_total,
        style(&summary.instance).dim()
    )
}
