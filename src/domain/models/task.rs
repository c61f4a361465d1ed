//! Task domain model.
//!
//! A task is one natural-language request driven through the
//! plan, execute, verify, iterate state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Planner is producing the step list
    Planning,
    /// Steps are running in order
    Executing,
    /// Aggregate outcome is being checked
    Verifying,
    /// Failed steps are being re-run
    Iterating,
    /// All steps succeeded
    Completed,
    /// Planning failed or the iteration budget ran out
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Planning
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Iterating => "iterating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planning" => Some(Self::Planning),
            "executing" => Some(Self::Executing),
            "verifying" => Some(Self::Verifying),
            "iterating" => Some(Self::Iterating),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Get valid next states from this state.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Planning => &[Self::Executing, Self::Failed, Self::Cancelled],
            Self::Executing => &[Self::Verifying, Self::Failed, Self::Cancelled],
            Self::Verifying => &[Self::Iterating, Self::Completed, Self::Failed, Self::Cancelled],
            Self::Iterating => &[Self::Verifying, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    /// Check if transition to the given state is valid.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of step actions a plan may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Analyze,
    Create,
    Test,
    Execute,
    Verify,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Create => "create",
            Self::Test => "test",
            Self::Execute => "execute",
            Self::Verify => "verify",
        }
    }

    /// Human-readable description used when a planner gives none.
    pub fn default_description(&self) -> &'static str {
        match self {
            Self::Analyze => "Analyze requirements",
            Self::Create => "Create implementation",
            Self::Test => "Test implementation",
            Self::Execute => "Execute code",
            Self::Verify => "Verify results",
        }
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic phase-action of a plan. Never mutated after planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    pub description: String,
}

impl Step {
    pub fn new(action: StepAction, description: impl Into<String>) -> Self {
        Self {
            action,
            description: description.into(),
        }
    }

    /// Step with the stock description for its action.
    pub fn of(action: StepAction) -> Self {
        Self::new(action, action.default_description())
    }
}

/// Heuristic complexity class of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub complexity: Complexity,
    pub estimated_time_ms: u64,
}

/// Outcome of executing one step. Retries overwrite the entry for the same index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Zero for the first attempt, incremented on every retry.
    pub attempt: u32,
}

impl StepResult {
    pub fn succeeded(step_index: usize, payload: serde_json::Value, attempt: u32) -> Self {
        Self {
            step_index,
            success: true,
            payload: Some(payload),
            error: None,
            attempt,
        }
    }

    pub fn failed(step_index: usize, error: impl Into<String>, attempt: u32) -> Self {
        Self {
            step_index,
            success: false,
            payload: None,
            error: Some(error.into()),
            attempt,
        }
    }
}

/// Result of the verify phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub all_steps_completed: bool,
    pub all_successful: bool,
    pub needs_iteration: bool,
    pub reason: Option<String>,
}

/// A task owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub prompt: String,
    pub status: TaskStatus,
    pub plan: Option<Plan>,
    pub steps: Vec<Step>,
    /// Index of the most recently executed step.
    pub current_step: usize,
    /// Ordered by step index, at most one entry per index.
    pub results: Vec<StepResult>,
    pub iteration_count: u32,
    pub iteration_limit: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(prompt: impl Into<String>, iteration_limit: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            status: TaskStatus::Planning,
            plan: None,
            steps: Vec::new(),
            current_step: 0,
            results: Vec::new(),
            iteration_count: 0,
            iteration_limit,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition_to(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn apply_plan(&mut self, plan: Plan) {
        self.steps = plan.steps.clone();
        self.plan = Some(plan);
    }

    /// Store a step result, replacing any earlier result for the same index.
    pub fn record_result(&mut self, result: StepResult) {
        self.current_step = result.step_index.min(self.steps.len());
        match self
            .results
            .binary_search_by_key(&result.step_index, |r| r.step_index)
        {
            Ok(pos) => self.results[pos] = result,
            Err(pos) => self.results.insert(pos, result),
        }
    }

    pub fn result_for(&self, step_index: usize) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_index == step_index)
    }

    /// Indices of steps whose latest result is a failure.
    pub fn failed_steps(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.step_index)
            .collect()
    }

    /// Indices of steps that have never run, in plan order.
    pub fn pending_steps(&self) -> Vec<usize> {
        (0..self.steps.len())
            .filter(|i| self.result_for(*i).is_none())
            .collect()
    }

    pub fn verify(&self) -> Verification {
        let last_index = self.steps.len().saturating_sub(1);
        let all_steps_completed = !self.steps.is_empty()
            && self.current_step == last_index
            && self.results.len() == self.steps.len();
        let all_successful = self.results.iter().all(|r| r.success);
        let needs_iteration = !(all_steps_completed && all_successful);

        let reason = if !all_successful {
            Some("Some steps failed".to_string())
        } else if !all_steps_completed {
            Some("Not all steps were executed".to_string())
        } else {
            None
        };

        Verification {
            all_steps_completed,
            all_successful,
            needs_iteration,
            reason,
        }
    }
}
