//! Mock step handler for tests and offline runs.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::StepError;
use crate::domain::models::{Step, StepAction, WorkUnit};
use crate::domain::ports::{StepHandler, StepOutput, TaskContext};

/// Scripted handler: every step succeeds unless configured to fail.
#[derive(Debug, Default)]
pub struct MockStepHandler {
    /// Step index -> number of leading attempts that fail.
    failures: HashMap<usize, u32>,
    delay: Option<Duration>,
    split: Option<(StepAction, usize)>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MockStepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` attempts of step `index`.
    pub fn fail_step(mut self, index: usize, times: u32) -> Self {
        self.failures.insert(index, times);
        self
    }

    /// Fail step `index` on every attempt.
    pub fn always_fail_step(self, index: usize) -> Self {
        self.fail_step(index, u32::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Split steps of `action` into `units` work units.
    pub fn split_action(mut self, action: StepAction, units: usize) -> Self {
        self.split = Some((action, units));
        self
    }

    /// Step indices in the order `handle` saw them.
    pub fn calls(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl StepHandler for MockStepHandler {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn handle(&self, step: &Step, ctx: &TaskContext) -> Result<StepOutput, StepError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ctx.step_index);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing_attempts = self.failures.get(&ctx.step_index).copied().unwrap_or(0);
        if ctx.attempt < failing_attempts {
            return Err(StepError::Failed(format!(
                "simulated failure of step {} ({})",
                ctx.step_index + 1,
                step.action
            )));
        }

        Ok(StepOutput::ok(json!({
            "action": step.action.as_str(),
            "description": step.description,
            "attempt": ctx.attempt,
        })))
    }

    fn split(&self, step: &Step, ctx: &TaskContext) -> Option<Vec<WorkUnit>> {
        let (action, units) = self.split?;
        if step.action != action {
            return None;
        }
        Some(
            (0..units)
                .map(|i| {
                    WorkUnit::new(
                        format!("{}-{}-{i}", ctx.task_id, ctx.step_index),
                        format!("{} part {}", step.description, i + 1),
                    )
                })
                .collect(),
        )
    }
}
