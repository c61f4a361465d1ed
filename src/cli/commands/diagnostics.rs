//! Diagnostics CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::service;
use crate::domain::models::{AgenticalityBreakdown, Config, DiagnosticReport, SelfCheck};

#[derive(Args, Debug)]
pub struct DiagnosticsArgs {
    #[command(subcommand)]
    pub command: DiagnosticsCommand,
}

#[derive(Subcommand, Debug)]
pub enum DiagnosticsCommand {
    /// Full report: metrics, recent sessions and averages
    Report,
    /// Health score and label
    Health,
    /// Per-dimension agenticality breakdown
    Breakdown,
    /// Evaluate capabilities and limitations
    SelfCheck,
    /// Write the report as pretty JSON
    Export {
        /// Destination file
        path: PathBuf,
    },
    /// Zero all metrics; history before the reset is ignored on restart
    Reset,
}

pub async fn execute(args: DiagnosticsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let recorder = service::open_recorder(config).await?;

    match args.command {
        DiagnosticsCommand::Report => output(&ReportOutput(recorder.report().await), json_mode),
        DiagnosticsCommand::Health => {
            let health_score = recorder.health_score().await;
            output(
                &HealthOutput {
                    health_score,
                    health_label: recorder.health_label().await,
                    agenticality_score: recorder.agenticality_score().await,
                    rating: recorder.rating().await,
                },
                json_mode,
            );
        }
        DiagnosticsCommand::Breakdown => output(
            &BreakdownOutput(recorder.agenticality_breakdown().await),
            json_mode,
        ),
        DiagnosticsCommand::SelfCheck => {
            output(&SelfCheckOutput(recorder.self_check().await), json_mode);
        }
        DiagnosticsCommand::Export { path } => {
            recorder
                .export_report(&path)
                .await
                .with_context(|| format!("Failed to export report to {}", path.display()))?;
            output(&ExportOutput { exported: path }, json_mode);
        }
        DiagnosticsCommand::Reset => {
            recorder.reset_metrics().await;
            output(&ResetOutput { reset: true }, json_mode);
        }
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(transparent)]
struct ReportOutput(DiagnosticReport);

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        let report = &self.0;
        let formatter = TableFormatter::new();
        let perf = &report.performance;
        let mut out = format!(
            "{}\n  Rating: {}\n  Health: {:.1} ({})\n\n{}\n",
            style("Diagnostics Report").bold().underlined(),
            report.rating,
            report.health_score,
            report.health_label,
            formatter.format_metrics(&report.metrics),
        );
        out.push_str(&format!(
            "\n{}\n  Avg duration: {:.0}ms\n  Avg steps: {:.2}\n  Avg iterations: {:.2}\n  Avg errors: {:.2}\n",
            style("Performance").bold(),
            perf.avg_duration_ms,
            perf.avg_steps,
            perf.avg_iterations,
            perf.avg_errors,
        ));
        if report.recent_sessions.is_empty() {
            out.push_str("\nNo sessions recorded yet.");
        } else {
            out.push_str(&format!(
                "\n{}\n{}",
                style("Recent sessions").bold(),
                formatter.format_sessions(&report.recent_sessions)
            ));
        }
        out
    }
}

#[derive(Serialize)]
struct HealthOutput {
    health_score: f64,
    health_label: &'static str,
    agenticality_score: f64,
    rating: &'static str,
}

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let label = match self.health_label {
            "Excellent" | "Good" => style(self.health_label).green(),
            "Fair" => style(self.health_label).yellow(),
            _ => style(self.health_label).red(),
        };
        format!(
            "Health: {:.1} ({label})\nAgenticality: {:.3} ({})",
            self.health_score, self.agenticality_score, self.rating
        )
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct BreakdownOutput(AgenticalityBreakdown);

impl CommandOutput for BreakdownOutput {
    fn to_human(&self) -> String {
        TableFormatter::new().format_breakdown(&self.0)
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct SelfCheckOutput(SelfCheck);

impl CommandOutput for SelfCheckOutput {
    fn to_human(&self) -> String {
        let check = &self.0;
        let capabilities: Vec<String> = check
            .capabilities
            .iter()
            .map(|c| {
                let mark = if c.available {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                format!("  {mark} {}", c.name)
            })
            .collect();
        let limitations = if check.limitations.is_empty() {
            "No limitations detected.".to_string()
        } else {
            TableFormatter::new().format_self_check(check)
        };
        format!(
            "Health: {:.1}  Agenticality: {:.3}\n\n{}\n{}\n\n{}",
            check.health_score,
            check.agenticality_score,
            style("Capabilities").bold(),
            capabilities.join("\n"),
            limitations,
        )
    }
}

#[derive(Serialize)]
struct ExportOutput {
    exported: PathBuf,
}

impl CommandOutput for ExportOutput {
    fn to_human(&self) -> String {
        format!("{} Report written to {}", style("✓").green().bold(), self.exported.display())
    }
}

#[derive(Serialize)]
struct ResetOutput {
    reset: bool,
}

impl CommandOutput for ResetOutput {
    fn to_human(&self) -> String {
        format!("{} Diagnostics metrics reset", style("✓").green().bold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.diagnostics.log_path = dir.path().join("diag.jsonl");
        config
    }

    fn args(command: DiagnosticsCommand) -> DiagnosticsArgs {
        DiagnosticsArgs { command }
    }

    #[tokio::test]
    async fn test_export_writes_report() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let target = dir.path().join("out").join("report.json");

        execute(
            args(DiagnosticsCommand::Export {
                path: target.clone(),
            }),
            &config,
            true,
        )
        .await
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(json["metrics"]["totalTasks"], 0);
    }

    #[tokio::test]
    async fn test_reset_appends_marker() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        execute(args(DiagnosticsCommand::Reset), &config, true)
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&config.diagnostics.log_path).unwrap();
        assert!(contents.contains("\"reset\""));
    }

    #[tokio::test]
    async fn test_read_only_commands_succeed_on_empty_log() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        for command in [
            DiagnosticsCommand::Report,
            DiagnosticsCommand::Health,
            DiagnosticsCommand::Breakdown,
            DiagnosticsCommand::SelfCheck,
        ] {
            execute(args(command), &config, true).await.unwrap();
        }
    }
}
