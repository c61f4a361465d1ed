//! Event payloads published on the typed subscription channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::{Decision, HealingRecord, SessionOutcome, StepRecord};
use super::task::TaskStatus;

/// Orchestrator phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub task_id: Uuid,
    pub phase: TaskStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Swarm batch lifecycle marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwarmEventKind {
    BatchStart,
    BatchComplete,
    SwarmComplete,
}

/// Swarm progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmEvent {
    pub event: SwarmEventKind,
    /// Zero-based; equals `total_batches` on swarm-complete.
    pub batch_index: usize,
    pub total_batches: usize,
    pub units_in_batch: usize,
    /// Units settled so far across the run.
    pub completed: usize,
    pub successful: usize,
    pub total: usize,
    pub elapsed_ms: u64,
}

/// Diagnostics recorder activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DiagnosticsEvent {
    SessionStarted {
        session_id: Uuid,
        task: String,
    },
    DecisionRecorded(Decision),
    StepRecorded(StepRecord),
    SelfHealing(HealingRecord),
    SessionSealed {
        session_id: Uuid,
        outcome: SessionOutcome,
        agenticality_score: f64,
    },
    PersistenceFailed {
        session_id: Option<Uuid>,
        error: String,
    },
    SelfCheckCompleted {
        health_score: f64,
        agenticality_score: f64,
    },
    MetricsReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_event_wire_names() {
        let event = SwarmEvent {
            event: SwarmEventKind::BatchComplete,
            batch_index: 2,
            total_batches: 13,
            units_in_batch: 16,
            completed: 48,
            successful: 47,
            total: 200,
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch-complete");
        assert_eq!(json["batchIndex"], 2);
        assert_eq!(json["unitsInBatch"], 16);
    }
}
