//! Table output formatting for CLI commands
//!
//! Renders step results, swarm outcomes and diagnostics with comfy-table.
//! Colors are dropped when `NO_COLOR` is set or the terminal is dumb.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::collections::BTreeMap;
use std::env;

use super::truncate;
use crate::domain::models::{
    AgentKind, AgenticalityBreakdown, Metrics, SelfCheck, SessionOutcome, SessionSummary,
    Severity, StepResult, UnitOutcome,
};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Latest result per step.
    pub fn format_step_results(&self, results: &[StepResult]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Step", "Status", "Attempts", "Detail"]));

        for result in results {
            let detail = result
                .error
                .clone()
                .or_else(|| result.payload.as_ref().map(ToString::to_string))
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(result.step_index + 1),
                self.outcome_cell(result.success),
                Cell::new(result.attempt + 1),
                Cell::new(truncate(&detail, 60)),
            ]);
        }

        table.to_string()
    }

    /// One row per work unit of a swarm run.
    pub fn format_unit_outcomes(&self, outcomes: &[UnitOutcome]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Unit", "Agent", "Kind", "Status", "Duration", "Error"]));

        for outcome in outcomes {
            table.add_row(vec![
                Cell::new(&outcome.unit_id),
                Cell::new(&outcome.agent_id),
                Cell::new(outcome.agent_kind.as_str()),
                self.outcome_cell(outcome.success),
                Cell::new(format!("{}ms", outcome.duration_ms)),
                Cell::new(truncate(outcome.error.as_deref().unwrap_or("-"), 40)),
            ]);
        }

        table.to_string()
    }

    pub fn format_distribution(&self, distribution: &BTreeMap<AgentKind, usize>) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Kind", "Specialization", "Agents"]));
        for (kind, count) in distribution {
            table.add_row(vec![
                Cell::new(kind.as_str()),
                Cell::new(kind.specialization()),
                Cell::new(count),
            ]);
        }
        table.to_string()
    }

    pub fn format_metrics(&self, metrics: &Metrics) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Metric", "Value"]));
        let rows: [(&str, String); 11] = [
            ("Total tasks", metrics.total_tasks.to_string()),
            ("Successful", metrics.successful_tasks.to_string()),
            ("Failed", metrics.failed_tasks.to_string()),
            ("Total iterations", metrics.total_iterations.to_string()),
            ("Average iterations", format!("{:.2}", metrics.average_iterations)),
            ("Autonomous executions", metrics.autonomous_executions.to_string()),
            ("Manual interventions", metrics.manual_interventions.to_string()),
            ("Self-healing events", metrics.self_healing_events.to_string()),
            ("Predicted failures", metrics.predicted_failures.to_string()),
            ("Prevented failures", metrics.prevented_failures.to_string()),
            ("Agenticality score", format!("{:.3}", metrics.agenticality_score)),
        ];
        for (name, value) in rows {
            table.add_row(vec![Cell::new(name), Cell::new(value)]);
        }
        table.to_string()
    }

    pub fn format_breakdown(&self, breakdown: &AgenticalityBreakdown) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Dimension", "Score"]));
        for (name, value) in [
            ("Autonomy", breakdown.autonomy),
            ("Iteration", breakdown.iteration),
            ("Complexity", breakdown.complexity),
            ("Self-awareness", breakdown.self_awareness),
        ] {
            table.add_row(vec![Cell::new(name), Cell::new(format!("{:.1}%", value * 100.0))]);
        }
        table.to_string()
    }

    pub fn format_sessions(&self, sessions: &[SessionSummary]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["When", "Task", "Outcome", "Steps", "Iterations", "Score"]));
        for session in sessions {
            let outcome = Cell::new(session.outcome.as_str());
            let outcome = if self.use_colors {
                outcome.fg(match session.outcome {
                    SessionOutcome::Success => Color::Green,
                    SessionOutcome::Failure => Color::Red,
                })
            } else {
                outcome
            };
            table.add_row(vec![
                Cell::new(session.timestamp.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(truncate(&session.task, 40)),
                outcome,
                Cell::new(session.steps),
                Cell::new(session.iterations),
                Cell::new(format!("{:.3}", session.agenticality_score)),
            ]);
        }
        table.to_string()
    }

    pub fn format_self_check(&self, check: &SelfCheck) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Kind", "Severity", "Description"]));
        for limitation in &check.limitations {
            let severity = Cell::new(format!("{:?}", limitation.severity).to_lowercase());
            let severity = if self.use_colors {
                severity.fg(severity_color(limitation.severity))
            } else {
                severity
            };
            table.add_row(vec![
                Cell::new(&limitation.kind),
                severity,
                Cell::new(&limitation.description),
            ]);
        }
        table.to_string()
    }

    fn outcome_cell(&self, success: bool) -> Cell {
        match (success, self.use_colors) {
            (true, true) => Cell::new("ok").fg(Color::Green),
            (false, true) => Cell::new("failed").fg(Color::Red),
            (true, false) => Cell::new("✓ ok"),
            (false, false) => Cell::new("✗ failed"),
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

const fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Low => Color::Blue,
        Severity::Medium => Color::Yellow,
        Severity::High => Color::Red,
    }
}
