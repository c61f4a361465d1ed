//! Process-wide diagnostics metrics and the persisted log record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::{Session, SessionOutcome};

/// Running counters plus derived scores.
///
/// Serialized in camelCase since every diagnostic log line embeds a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub successful_tasks: u64,
    #[serde(default)]
    pub failed_tasks: u64,
    #[serde(default)]
    pub total_iterations: u64,
    #[serde(default)]
    pub autonomous_executions: u64,
    #[serde(default)]
    pub manual_interventions: u64,
    #[serde(default)]
    pub self_healing_events: u64,
    #[serde(default)]
    pub predicted_failures: u64,
    #[serde(default)]
    pub prevented_failures: u64,
    #[serde(default)]
    pub average_iterations: f64,
    #[serde(default, alias = "agentialityScore")]
    pub agenticality_score: f64,
    #[serde(default = "default_context_retention")]
    pub context_retention_score: f64,
    /// Sum of sealed session scores, so the average survives restarts.
    #[serde(default)]
    pub cumulative_session_score: f64,
}

fn default_context_retention() -> f64 {
    100.0
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            total_iterations: 0,
            autonomous_executions: 0,
            manual_interventions: 0,
            self_healing_events: 0,
            predicted_failures: 0,
            prevented_failures: 0,
            average_iterations: 0.0,
            agenticality_score: 0.0,
            context_retention_score: default_context_retention(),
            cumulative_session_score: 0.0,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

impl Metrics {
    pub fn task_success_rate(&self) -> Option<f64> {
        ratio(self.successful_tasks, self.total_tasks)
    }

    pub fn autonomy_rate(&self) -> Option<f64> {
        ratio(
            self.autonomous_executions,
            self.autonomous_executions + self.manual_interventions,
        )
    }

    /// Prevented over predicted failures, capped at 1.
    pub fn healing_effectiveness(&self) -> Option<f64> {
        ratio(self.prevented_failures, self.predicted_failures).map(|r| r.min(1.0))
    }

    pub fn average_session_score(&self) -> Option<f64> {
        (self.total_tasks > 0).then(|| self.cumulative_session_score / self.total_tasks as f64)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failed_tasks as f64 / self.total_tasks.max(1) as f64
    }
}

/// Compact view of a sealed session as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub task: String,
    pub duration: i64,
    pub steps: usize,
    pub iterations: u32,
    pub autonomous_actions: u32,
    pub manual_actions: u32,
    pub errors: usize,
    #[serde(default)]
    pub fixes: usize,
    pub outcome: SessionOutcome,
    #[serde(alias = "agentialityScore")]
    pub agenticality_score: f64,
    pub metrics: Metrics,
}

impl SessionSummary {
    pub fn from_session(session: &Session, metrics: &Metrics) -> Self {
        Self {
            timestamp: session.end_time.unwrap_or_else(Utc::now),
            session_id: session.id,
            task: session.task_description.clone(),
            duration: session.duration_ms(),
            steps: session.steps.len(),
            iterations: session.iterations,
            autonomous_actions: session.autonomous_actions,
            manual_actions: session.manual_actions,
            errors: session.errors.len(),
            fixes: session.fixes.len(),
            outcome: session.outcome.unwrap_or(SessionOutcome::Failure),
            agenticality_score: session.agenticality_score,
            metrics: metrics.clone(),
        }
    }
}

/// Marker written when an operator resets metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRecord {
    pub timestamp: DateTime<Utc>,
    pub metrics: Metrics,
}

/// One line of the diagnostic log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticLogEntry {
    Session(SessionSummary),
    Reset(ResetRecord),
}

impl DiagnosticLogEntry {
    pub fn metrics(&self) -> &Metrics {
        match self {
            Self::Session(summary) => &summary.metrics,
            Self::Reset(reset) => &reset.metrics,
        }
    }
}

/// Averages over recently sealed sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub avg_duration_ms: f64,
    pub avg_steps: f64,
    pub avg_iterations: f64,
    pub avg_errors: f64,
}

/// Per-category breakdown, each in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgenticalityBreakdown {
    pub autonomy: f64,
    pub iteration: f64,
    pub complexity: f64,
    pub self_awareness: f64,
}

/// Severity of a detected limitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limitation {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
}

/// Result of one self-check pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfCheck {
    pub checked_at: DateTime<Utc>,
    pub health_score: f64,
    pub agenticality_score: f64,
    pub capabilities: Vec<Capability>,
    pub limitations: Vec<Limitation>,
}

/// Full diagnostic report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: Metrics,
    pub performance: PerformanceSummary,
    pub recent_sessions: Vec<SessionSummary>,
    pub breakdown: AgenticalityBreakdown,
    pub health_score: f64,
    pub health_label: String,
    pub rating: String,
    pub last_self_check: Option<SelfCheck>,
}
