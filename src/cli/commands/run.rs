//! `taskpilot run`: drive one task through plan, execute, verify and iterate.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::application::{ExecuteOptions, TaskOrchestrator, TaskReport};
use crate::cli::output::{create_spinner, output, CommandOutput, ProgressBarExt, TableFormatter};
use crate::cli::service::{self, MockScript};
use crate::domain::models::{Config, ProgressEvent, TaskStatus};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Natural-language task description
    pub prompt: String,

    /// Maximum repair iterations before giving up
    #[arg(long)]
    pub iteration_limit: Option<u32>,

    /// Wall-clock budget for the task in milliseconds
    #[arg(long)]
    pub max_time_ms: Option<u64>,

    /// Cancel the task when the time budget runs out
    #[arg(long)]
    pub cancel_on_deadline: bool,

    /// Mock handler: one-based step number that should fail
    #[arg(long)]
    pub mock_fail_step: Option<usize>,

    /// Mock handler: how many attempts of that step fail
    #[arg(long, default_value_t = 1)]
    pub mock_fail_times: u32,
}

#[derive(Serialize)]
struct RunOutput {
    #[serde(flatten)]
    report: TaskReport,
    rating: &'static str,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let headline = if report.success {
            style("Task completed").green().bold().to_string()
        } else {
            style(format!("Task {}", report.status)).red().bold().to_string()
        };
        format!(
            "{headline}\n  Task ID: {}\n  Iterations: {}\n  Duration: {}ms\n  Agenticality: {:.3} ({})\n\n{}",
            report.task_id,
            report.iterations,
            report.duration_ms,
            report.agenticality_score,
            self.rating,
            TableFormatter::new().format_step_results(&report.results),
        )
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let recorder = service::open_recorder(config).await?;
    let (handler, planner) = service::build_handler(
        config,
        MockScript {
            fail_step: args.mock_fail_step,
            fail_times: args.mock_fail_times,
        },
    )?;

    let orchestrator = Arc::new(
        TaskOrchestrator::new(handler, Arc::clone(&recorder), config.orchestrator.clone())
            .with_planner(planner),
    );
    let options = ExecuteOptions {
        iteration_limit: args.iteration_limit,
        max_time: args.max_time_ms.map(Duration::from_millis),
        cancel_on_deadline: args.cancel_on_deadline.then_some(true),
    };

    let mut progress = orchestrator.subscribe_progress();
    let spinner = create_spinner("Starting...", json_mode);
    let (task_id, mut handle) = orchestrator.spawn(&args.prompt, options).await;

    let result = loop {
        tokio::select! {
            joined = &mut handle => break joined.context("Task runner panicked")?,
            event = progress.recv() => match event {
                Ok(envelope) => render_progress(&spinner, &envelope.payload),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress display lagged");
                }
                Err(RecvError::Closed) => break (&mut handle).await.context("Task runner panicked")?,
            },
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel(task_id).await;
            }
        }
    };

    match result {
        Ok(report) => {
            spinner.finish_success(format!("Task {task_id} completed"));
            let rating = recorder.rating().await;
            output(&RunOutput { report, rating }, json_mode);
            Ok(())
        }
        Err(e) => {
            spinner.finish_error(format!("Task {task_id} failed"));
            Err(e).with_context(|| format!("Task {task_id} did not complete"))
        }
    }
}

fn render_progress(spinner: &ProgressBar, event: &ProgressEvent) {
    let prefix = match event.phase {
        TaskStatus::Completed => style("done").green(),
        TaskStatus::Failed | TaskStatus::Cancelled => style(event.phase.as_str()).red(),
        _ => style(event.phase.as_str()).cyan(),
    };
    if event.total_steps > 0 {
        spinner.set_message(format!(
            "{prefix} [{}/{}] {}",
            event.current_step, event.total_steps, event.message
        ));
    } else {
        spinner.set_message(format!("{prefix} {}", event.message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "taskpilot",
            "run",
            "build a parser and test it",
            "--iteration-limit",
            "3",
            "--mock-fail-step",
            "2",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.prompt, "build a parser and test it");
        assert_eq!(args.iteration_limit, Some(3));
        assert_eq!(args.mock_fail_step, Some(2));
        assert_eq!(args.mock_fail_times, 1);
    }

    #[tokio::test]
    async fn test_run_with_mock_handler() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.diagnostics.log_path = dir.path().join("diag.jsonl");

        let args = RunArgs {
            prompt: "create a file and run it".to_string(),
            iteration_limit: None,
            max_time_ms: None,
            cancel_on_deadline: false,
            mock_fail_step: Some(1),
            mock_fail_times: 1,
        };
        execute(args, &config, true).await.unwrap();

        let contents = std::fs::read_to_string(&config.diagnostics.log_path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
