//! Task orchestrator: drives a task through plan, execute, verify and
//! iterate.
//!
//! The orchestrator owns the task map. Phases of one task run strictly in
//! sequence; separate tasks run concurrently and share nothing but the
//! map. Cancellation and the optional deadline are observed at every
//! suspension point (before planning, before each step, before verify).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::swarm_dispatcher::{BatchOptions, SwarmDispatcher};
use crate::domain::errors::{
    DiagnosticsResult, ExecutionError, ExecutionResult, PoolError, StepError,
};
use crate::domain::models::{
    DecisionInput, HealingInput, HealingType, OrchestratorConfig, ProgressEvent, SessionOutcome,
    Step, StepInput, StepResult, Task, TaskStatus,
};
use crate::domain::ports::{validate_plan, Planner, StepHandler, StepOutput, TaskContext};
use crate::services::diagnostics_recorder::DiagnosticsRecorder;
use crate::services::event_bus::{Envelope, EventChannel};
use crate::services::heuristic_planner::HeuristicPlanner;

const FIRST_ATTEMPT_CONFIDENCE: f64 = 0.9;
const RETRY_CONFIDENCE: f64 = 0.7;

/// Per-task overrides of the orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub iteration_limit: Option<u32>,
    pub max_time: Option<Duration>,
    pub cancel_on_deadline: Option<bool>,
}

/// Successful outcome of `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub session_id: Uuid,
    pub success: bool,
    pub status: TaskStatus,
    /// Latest result per step, in plan order.
    pub results: Vec<StepResult>,
    pub iterations: u32,
    pub duration_ms: u64,
    pub agenticality_score: f64,
}

/// Bookkeeping for one running task.
struct Run {
    task_id: Uuid,
    session_id: Uuid,
    started: Instant,
    deadline: Option<Instant>,
    cancel_on_deadline: bool,
    deadline_hit: bool,
}

pub struct TaskOrchestrator {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    planner: Arc<dyn Planner>,
    handler: Arc<dyn StepHandler>,
    recorder: Arc<DiagnosticsRecorder>,
    dispatcher: Option<Arc<SwarmDispatcher>>,
    batch_options: BatchOptions,
    config: OrchestratorConfig,
    progress: EventChannel<ProgressEvent>,
}

impl TaskOrchestrator {
    pub fn new(
        handler: Arc<dyn StepHandler>,
        recorder: Arc<DiagnosticsRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        let progress = EventChannel::new(config.progress_buffer);
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            planner: Arc::new(HeuristicPlanner::default()),
            handler,
            recorder,
            dispatcher: None,
            batch_options: BatchOptions::default(),
            config,
            progress,
        }
    }

    /// Replace the default heuristic planner.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Run splittable steps across a swarm.
    pub fn with_dispatcher(mut self, dispatcher: Arc<SwarmDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Overrides passed to every delegated `run_batch`.
    pub fn with_batch_options(mut self, options: BatchOptions) -> Self {
        self.batch_options = options;
        self
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<Envelope<ProgressEvent>> {
        self.progress.subscribe()
    }

    pub fn recorder(&self) -> &Arc<DiagnosticsRecorder> {
        &self.recorder
    }

    /// Plan, execute, verify and iterate one task to completion.
    pub async fn execute(&self, prompt: &str, options: ExecuteOptions) -> ExecutionResult<TaskReport> {
        let task_id = self.create_task(prompt, &options).await;
        self.run_task(task_id, options).await
    }

    /// Start a task in the background and return its id immediately.
    pub async fn spawn(
        self: &Arc<Self>,
        prompt: &str,
        options: ExecuteOptions,
    ) -> (Uuid, JoinHandle<ExecutionResult<TaskReport>>) {
        let task_id = self.create_task(prompt, &options).await;
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.run_task(task_id, options).await });
        (task_id, handle)
    }

    /// Snapshot of a task.
    pub async fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(&task_id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Mark a live task cancelled. Returns false for unknown or finished tasks.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&task_id) else {
            return false;
        };
        if !task.transition_to(TaskStatus::Cancelled) {
            return false;
        }
        info!(task_id = %task_id, "task cancelled");
        self.progress.publish(progress_event(task, "Task cancelled"));
        true
    }

    async fn create_task(&self, prompt: &str, options: &ExecuteOptions) -> Uuid {
        let limit = options.iteration_limit.unwrap_or(self.config.iteration_limit);
        let task = Task::new(prompt, limit);
        let task_id = task.id;
        self.tasks.write().await.insert(task_id, task);
        task_id
    }

    async fn run_task(&self, task_id: Uuid, options: ExecuteOptions) -> ExecutionResult<TaskReport> {
        let prompt = self
            .get_task(task_id)
            .await
            .map(|t| t.prompt)
            .ok_or(ExecutionError::TaskNotFound(task_id))?;

        let started = Instant::now();
        let max_time = options
            .max_time
            .or_else(|| self.config.max_time_ms.map(Duration::from_millis));
        let mut run = Run {
            task_id,
            session_id: self.recorder.start_session(&prompt).await,
            started,
            deadline: max_time.map(|budget| started + budget),
            cancel_on_deadline: options
                .cancel_on_deadline
                .unwrap_or(self.config.cancel_on_deadline),
            deadline_hit: false,
        };

        info!(task_id = %task_id, session_id = %run.session_id, planner = self.planner.name(), "task started");

        match self.drive(&prompt, &mut run).await {
            Ok(()) => {
                let session = self
                    .recorder
                    .end_session(run.session_id, SessionOutcome::Success)
                    .await;
                let task = self
                    .get_task(task_id)
                    .await
                    .ok_or(ExecutionError::TaskNotFound(task_id))?;
                let duration_ms = elapsed_ms(&run.started);

                info!(
                    task_id = %task_id,
                    iterations = task.iteration_count,
                    duration_ms,
                    "task completed"
                );
                Ok(TaskReport {
                    task_id,
                    session_id: run.session_id,
                    success: true,
                    status: task.status,
                    results: task.results,
                    iterations: task.iteration_count,
                    duration_ms,
                    agenticality_score: session.map(|s| s.agenticality_score).unwrap_or_default(),
                })
            }
            Err(e) => {
                if !matches!(e, ExecutionError::Cancelled(_)) {
                    self.fail(task_id, &e).await;
                }
                note(
                    self.recorder
                        .end_session(run.session_id, SessionOutcome::Failure)
                        .await,
                );
                Err(e)
            }
        }
    }

    async fn drive(&self, prompt: &str, run: &mut Run) -> ExecutionResult<()> {
        self.checkpoint(run).await?;
        self.emit(run.task_id, "Planning task...").await?;

        let plan = self.planner.plan(prompt).await?;
        validate_plan(&plan)?;
        self.checkpoint(run).await?;

        let step_count = plan.steps.len();
        info!(
            task_id = %run.task_id,
            steps = step_count,
            complexity = %plan.complexity,
            "plan created"
        );
        self.advance(run.task_id, TaskStatus::Executing, |task| {
            task.apply_plan(plan);
            format!("Plan created: {step_count} steps")
        })
        .await?;

        self.execute_steps(run, (0..step_count).collect()).await?;

        loop {
            self.checkpoint(run).await?;
            self.advance(run.task_id, TaskStatus::Verifying, |_| {
                "Verifying results...".to_string()
            })
            .await?;

            let task = self
                .get_task(run.task_id)
                .await
                .ok_or(ExecutionError::TaskNotFound(run.task_id))?;
            let verification = task.verify();
            if !verification.needs_iteration {
                self.advance(run.task_id, TaskStatus::Completed, |_| "Task completed".to_string())
                    .await?;
                return Ok(());
            }

            if task.iteration_count >= task.iteration_limit {
                return Err(ExecutionError::IterationLimitExceeded {
                    limit: task.iteration_limit,
                    failed_steps: task.failed_steps(),
                });
            }

            debug!(
                task_id = %run.task_id,
                reason = verification.reason.as_deref().unwrap_or_default(),
                "verification requires iteration"
            );
            self.advance(run.task_id, TaskStatus::Iterating, |task| {
                task.iteration_count += 1;
                format!("Iteration {}: Fixing issues...", task.iteration_count)
            })
            .await?;
            note(self.recorder.record_iteration(run.session_id).await);

            let mut retry = task.failed_steps();
            retry.extend(task.pending_steps());
            self.execute_steps(run, retry).await?;
        }
    }

    /// Run `indices` in order, stopping at the first failing step.
    async fn execute_steps(&self, run: &mut Run, indices: Vec<usize>) -> ExecutionResult<()> {
        for index in indices {
            self.checkpoint(run).await?;

            let (step, ctx) = {
                let mut tasks = self.tasks.write().await;
                let task = tasks
                    .get_mut(&run.task_id)
                    .ok_or(ExecutionError::TaskNotFound(run.task_id))?;
                if task.status == TaskStatus::Cancelled {
                    return Err(ExecutionError::Cancelled(run.task_id));
                }
                let Some(step) = task.steps.get(index).cloned() else {
                    continue;
                };
                let attempt = task.result_for(index).map_or(0, |r| r.attempt + 1);
                let ctx = TaskContext {
                    task_id: task.id,
                    prompt: task.prompt.clone(),
                    step_index: index,
                    total_steps: task.steps.len(),
                    attempt,
                    previous_results: task.results.clone(),
                };

                let message = if attempt > 0 {
                    format!("Step {} still failing, trying alternative...", index + 1)
                } else {
                    format!("Step {}/{}: {}", index + 1, ctx.total_steps, step.description)
                };
                let mut event = progress_event(task, message);
                event.current_step = index + 1;
                self.progress.publish(event);
                (step, ctx)
            };

            let (result, fault) = self.perform_step(run, &step, &ctx).await;
            let succeeded = result.success;

            {
                let mut tasks = self.tasks.write().await;
                if let Some(task) = tasks.get_mut(&run.task_id) {
                    if !task.status.is_terminal() {
                        task.record_result(result);
                    }
                }
            }

            if let Some(fault) = fault {
                return Err(fault.into());
            }
            if !succeeded {
                break;
            }
        }
        Ok(())
    }

    /// Run one step; the second value is a pool fault that ends the task.
    async fn perform_step(
        &self,
        run: &Run,
        step: &Step,
        ctx: &TaskContext,
    ) -> (StepResult, Option<PoolError>) {
        let confidence = if ctx.attempt == 0 {
            FIRST_ATTEMPT_CONFIDENCE
        } else {
            RETRY_CONFIDENCE
        };
        let decision = self
            .recorder
            .record_decision(
                run.session_id,
                DecisionInput::autonomous(
                    step.action.as_str(),
                    format!("{} (attempt {})", step.description, ctx.attempt + 1),
                    confidence,
                ),
            )
            .await;

        let started = Instant::now();
        let outcome = self.dispatch(step, ctx).await;
        let duration_ms = elapsed_ms(&started);

        let fault = match &outcome {
            Err(StepError::Pool(e)) => Some(e.clone()),
            _ => None,
        };
        let result = match outcome {
            Ok(output) if output.success => {
                StepResult::succeeded(ctx.step_index, output.payload, ctx.attempt)
            }
            Ok(output) => StepResult::failed(ctx.step_index, failure_message(&output), ctx.attempt),
            Err(e) => StepResult::failed(ctx.step_index, e.to_string(), ctx.attempt),
        };

        match result.error {
            Some(ref err) => warn!(
                task_id = %run.task_id,
                step = ctx.step_index + 1,
                attempt = ctx.attempt,
                error = %err,
                "step failed"
            ),
            None => debug!(task_id = %run.task_id, step = ctx.step_index + 1, duration_ms, "step succeeded"),
        }

        note(
            self.recorder
                .record_step(
                    run.session_id,
                    StepInput {
                        step_index: Some(ctx.step_index),
                        action: step.action.as_str().to_string(),
                        command: Some(step.description.clone()),
                        result: result.payload.clone(),
                        exit_code: Some(if result.success { 0 } else { 1 }),
                        duration_ms,
                        error: result.error.clone(),
                        retry_count: ctx.attempt,
                    },
                )
                .await,
        );

        if let Ok(decision) = decision {
            let outcome = if result.success { "success" } else { "failure" };
            note(
                self.recorder
                    .resolve_decision(run.session_id, decision.id, outcome)
                    .await,
            );
        }

        if result.success && ctx.attempt > 0 {
            note(
                self.recorder
                    .record_self_healing(
                        run.session_id,
                        HealingInput {
                            healing_type: HealingType::Predicted,
                            issue: format!("step {} failed", ctx.step_index + 1),
                            action: format!("retried {} on attempt {}", step.action, ctx.attempt + 1),
                            success: true,
                            prevented: true,
                        },
                    )
                    .await,
            );
        }

        (result, fault)
    }

    /// Hand a step to the swarm when it splits into units, else to the handler.
    async fn dispatch(&self, step: &Step, ctx: &TaskContext) -> Result<StepOutput, StepError> {
        let Some(dispatcher) = &self.dispatcher else {
            return self.handler.handle(step, ctx).await;
        };
        let Some(units) = self.handler.split(step, ctx) else {
            return self.handler.handle(step, ctx).await;
        };

        let report = dispatcher
            .run_batch(units, self.batch_options)
            .await?;

        if !report.all_succeeded() {
            return Err(StepError::UnitsFailed {
                failed: report.failed_units,
                total: report.total_units,
            });
        }
        Ok(StepOutput::ok(json!({
            "units": report.total_units,
            "batches": report.batches,
            "agentsUsed": report.agents_used,
            "elapsedMs": report.elapsed_ms,
            "outputs": report.results.into_iter().filter_map(|r| r.output).collect::<Vec<_>>(),
        })))
    }

    /// Observe cancellation and the deadline.
    async fn checkpoint(&self, run: &mut Run) -> ExecutionResult<()> {
        let status = self
            .tasks
            .read()
            .await
            .get(&run.task_id)
            .map(|t| t.status)
            .ok_or(ExecutionError::TaskNotFound(run.task_id))?;
        if status == TaskStatus::Cancelled {
            return Err(ExecutionError::Cancelled(run.task_id));
        }

        let Some(deadline) = run.deadline else {
            return Ok(());
        };
        if run.deadline_hit || Instant::now() < deadline {
            return Ok(());
        }
        run.deadline_hit = true;
        warn!(
            task_id = %run.task_id,
            elapsed_ms = elapsed_ms(&run.started),
            cancel = run.cancel_on_deadline,
            "task exceeded its time budget"
        );
        note(self.recorder.record_error(run.session_id, "deadline exceeded").await);

        if run.cancel_on_deadline {
            self.cancel(run.task_id).await;
            return Err(ExecutionError::Cancelled(run.task_id));
        }
        Ok(())
    }

    /// Publish a progress event for the current phase.
    async fn emit(&self, task_id: Uuid, message: &str) -> ExecutionResult<()> {
        let tasks = self.tasks.read().await;
        let task = tasks.get(&task_id).ok_or(ExecutionError::TaskNotFound(task_id))?;
        self.progress.publish(progress_event(task, message));
        Ok(())
    }

    /// Transition and announce it. A cancelled task stays cancelled.
    async fn advance<F>(&self, task_id: Uuid, next: TaskStatus, apply: F) -> ExecutionResult<()>
    where
        F: FnOnce(&mut Task) -> String,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(ExecutionError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Cancelled {
            return Err(ExecutionError::Cancelled(task_id));
        }
        let message = apply(task);
        if !task.transition_to(next) {
            warn!(task_id = %task_id, from = %task.status, to = %next, "ignored invalid transition");
        }
        debug!(task_id = %task_id, status = %task.status, "phase transition");
        self.progress.publish(progress_event(task, message));
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &ExecutionError) {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&task_id) else {
            return;
        };
        if !task.transition_to(TaskStatus::Failed) {
            return;
        }
        task.error = Some(error.to_string());
        warn!(task_id = %task_id, error = %error, "task failed");
        self.progress
            .publish(progress_event(task, format!("Task failed: {error}")));
    }
}

fn progress_event(task: &Task, message: impl Into<String>) -> ProgressEvent {
    ProgressEvent {
        task_id: task.id,
        phase: task.status,
        current_step: if task.results.is_empty() { 0 } else { task.current_step + 1 },
        total_steps: task.steps.len(),
        message: message.into(),
        timestamp: Utc::now(),
    }
}

fn failure_message(output: &StepOutput) -> String {
    output
        .payload
        .get("error")
        .and_then(|e| e.as_str())
        .map_or_else(|| "step reported failure".to_string(), String::from)
}

/// Diagnostics never abort the observed task.
fn note<T>(result: DiagnosticsResult<T>) {
    if let Err(e) = result {
        warn!(error = %e, "diagnostics recording skipped");
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::handlers::mock::MockStepHandler;
    use crate::domain::errors::PlanningError;
    use crate::domain::models::{Plan, ScoringConfig};
    use crate::infrastructure::diagnostic_log::MemoryDiagnosticLog;
    use async_trait::async_trait;

    async fn orchestrator(handler: MockStepHandler) -> TaskOrchestrator {
        let recorder = DiagnosticsRecorder::open(
            Arc::new(MemoryDiagnosticLog::new()),
            ScoringConfig::default(),
            10,
            64,
        )
        .await;
        TaskOrchestrator::new(Arc::new(handler), Arc::new(recorder), OrchestratorConfig::default())
    }

    struct EmptyPlanner;

    #[async_trait]
    impl Planner for EmptyPlanner {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn plan(&self, _prompt: &str) -> Result<Plan, PlanningError> {
            Err(PlanningError::EmptyPlan)
        }
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let orchestrator = orchestrator(MockStepHandler::new()).await;
        let report = orchestrator
            .execute("write a script then run it", ExecuteOptions::default())
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.iterations, 0);
    }

    #[tokio::test]
    async fn test_planning_failure_fails_task() {
        let orchestrator = orchestrator(MockStepHandler::new())
            .await
            .with_planner(Arc::new(EmptyPlanner));
        let err = orchestrator
            .execute("anything", ExecuteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Planning(PlanningError::EmptyPlan));

        let tasks = orchestrator.list_tasks().await;
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(orchestrator.recorder().metrics().await.failed_tasks, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_then_retry_failed_step_only() {
        // create (0), test (1), execute (2), verify (3); test fails once
        let handler = MockStepHandler::new().fail_step(1, 1);
        let calls = handler.calls();
        let orchestrator = orchestrator(handler).await;

        let report = orchestrator
            .execute("build it, test it, then run it", ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(report.iterations, 1);
        assert!(report.results.iter().all(|r| r.success));
        assert_eq!(report.results[1].attempt, 1);
        // step 0 ran once; step 1 twice; steps 2 and 3 once each after the retry
        assert_eq!(calls.lock().unwrap().clone(), vec![0, 1, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let orchestrator = orchestrator(MockStepHandler::new()).await;
        assert!(!orchestrator.cancel(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_deadline_penalizes_without_cancelling() {
        let handler = MockStepHandler::new().with_delay(Duration::from_millis(20));
        let orchestrator = orchestrator(handler).await;
        let options = ExecuteOptions {
            max_time: Some(Duration::from_millis(1)),
            ..ExecuteOptions::default()
        };
        let report = orchestrator.execute("write a file", options).await.unwrap();
        assert!(report.success);
        // errors without fixes drop self-correction to zero
        assert!(report.agenticality_score < 0.8);
    }

    #[tokio::test]
    async fn test_deadline_can_cancel() {
        let handler = MockStepHandler::new().with_delay(Duration::from_millis(20));
        let orchestrator = orchestrator(handler).await;
        let options = ExecuteOptions {
            max_time: Some(Duration::from_millis(1)),
            cancel_on_deadline: Some(true),
            ..ExecuteOptions::default()
        };
        let err = orchestrator.execute("write a file", options).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled(_)));
        assert_eq!(orchestrator.list_tasks().await[0].status, TaskStatus::Cancelled);
    }
}
