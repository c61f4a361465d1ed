//! Step handler port - the external collaborator that performs one step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::StepError;
use crate::domain::models::{Step, StepResult, WorkUnit};

/// Everything a handler may need about the task a step belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub prompt: String,
    pub step_index: usize,
    pub total_steps: usize,
    /// Zero on the first attempt of this step.
    pub attempt: u32,
    /// Latest results of the steps executed so far.
    pub previous_results: Vec<StepResult>,
}

/// Handler response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub success: bool,
    pub payload: serde_json::Value,
}

impl StepOutput {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload,
        }
    }
}

/// Uniform request/response contract for analyze, create, test, execute and verify.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, step: &Step, ctx: &TaskContext) -> Result<StepOutput, StepError>;

    /// Independent work units for steps that can fan out across the swarm.
    ///
    /// `None` runs the step through `handle`.
    fn split(&self, _step: &Step, _ctx: &TaskContext) -> Option<Vec<WorkUnit>> {
        None
    }
}
