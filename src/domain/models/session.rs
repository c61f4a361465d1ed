//! Diagnostics session model.
//!
//! A session is the diagnostics-facing record of one task run. It is
//! mutated by decision, step and self-healing events while active and
//! sealed (scored, persisted) exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Who made a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Autonomous,
    Supervised,
    Manual,
}

/// A decision taken during a session. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub action: String,
    pub reasoning: String,
    pub confidence: f64,
    /// "pending" until resolved.
    pub outcome: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// Input for recording a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInput {
    pub decision_type: DecisionType,
    pub action: String,
    pub reasoning: String,
    pub confidence: f64,
    pub alternatives: Vec<String>,
}

impl DecisionInput {
    pub fn autonomous(action: impl Into<String>, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            decision_type: DecisionType::Autonomous,
            action: action.into(),
            reasoning: reasoning.into(),
            confidence,
            alternatives: Vec::new(),
        }
    }

    pub fn manual(action: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::Manual,
            action: action.into(),
            reasoning: reasoning.into(),
            confidence: 1.0,
            alternatives: Vec::new(),
        }
    }
}

/// One executed step as seen by diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    /// Plan index when the step belongs to a plan; retries share the index.
    pub step_index: Option<usize>,
    pub action: String,
    pub command: Option<String>,
    pub result: Option<serde_json::Value>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Input for recording a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInput {
    pub step_index: Option<usize>,
    pub action: String,
    pub command: Option<String>,
    pub result: Option<serde_json::Value>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub retry_count: u32,
}

/// How a self-healing event came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingType {
    Predicted,
    Reactive,
    Proactive,
}

/// A self-healing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    #[serde(rename = "type")]
    pub healing_type: HealingType,
    pub issue: String,
    pub action: String,
    pub success: bool,
    pub prevented: bool,
}

/// Input for recording a self-healing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealingInput {
    pub healing_type: HealingType,
    pub issue: String,
    pub action: String,
    pub success: bool,
    pub prevented: bool,
}

/// Final outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Failure,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics record of one task lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub task_description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    pub iterations: u32,
    pub decisions: Vec<Decision>,
    pub autonomous_actions: u32,
    pub manual_actions: u32,
    pub errors: Vec<String>,
    pub fixes: Vec<String>,
    pub healing: Vec<HealingRecord>,
    pub outcome: Option<SessionOutcome>,
    pub agenticality_score: f64,
}

impl Session {
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_description: task_description.into(),
            start_time: Utc::now(),
            end_time: None,
            steps: Vec::new(),
            iterations: 0,
            decisions: Vec::new(),
            autonomous_actions: 0,
            manual_actions: 0,
            errors: Vec::new(),
            fixes: Vec::new(),
            healing: Vec::new(),
            outcome: None,
            agenticality_score: 0.0,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Share of steps that succeeded, 0 when no steps ran.
    ///
    /// Records sharing a plan index count once, using the latest attempt.
    pub fn success_rate(&self) -> f64 {
        let (succeeded, total) = self.step_outcomes();
        if total == 0 {
            return 0.0;
        }
        succeeded as f64 / total as f64
    }

    /// (succeeded, total) over distinct steps.
    pub fn step_outcomes(&self) -> (usize, usize) {
        let mut indexed: BTreeMap<usize, bool> = BTreeMap::new();
        let mut succeeded = 0;
        let mut total = 0;
        for record in &self.steps {
            match record.step_index {
                Some(index) => {
                    indexed.insert(index, record.succeeded());
                }
                None => {
                    total += 1;
                    if record.succeeded() {
                        succeeded += 1;
                    }
                }
            }
        }
        total += indexed.len();
        succeeded += indexed.values().filter(|ok| **ok).count();
        (succeeded, total)
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .map_or(0, |end| (end - self.start_time).num_milliseconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session: &Session, index: Option<usize>, error: Option<&str>) -> StepRecord {
        StepRecord {
            timestamp: Utc::now(),
            session_id: session.id,
            step_index: index,
            action: "create".to_string(),
            command: None,
            result: None,
            exit_code: None,
            duration_ms: 5,
            error: error.map(String::from),
            retry_count: 0,
        }
    }

    #[test]
    fn test_success_rate_empty_session_is_zero() {
        let session = Session::new("noop");
        assert!(session.success_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_uses_latest_attempt_per_index() {
        let mut session = Session::new("fix bug");
        session.steps.push(record(&session, Some(0), None));
        session.steps.push(record(&session, Some(1), Some("failed")));
        session.steps.push(record(&session, Some(1), None));
        assert!((session.success_rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(session.step_outcomes(), (2, 2));
    }

    #[test]
    fn test_unindexed_records_count_individually() {
        let mut session = Session::new("adhoc");
        session.steps.push(record(&session, None, None));
        session.steps.push(record(&session, None, Some("exit 1")));
        assert!((session.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decision_serializes_type_field() {
        let decision = Decision {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            decision_type: DecisionType::Supervised,
            action: "install".to_string(),
            reasoning: "missing dependency".to_string(),
            confidence: 0.6,
            outcome: "pending".to_string(),
            alternatives: vec![],
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["type"], "supervised");
    }
}
