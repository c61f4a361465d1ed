//! Diagnostics recorder.
//!
//! Aggregates per-session telemetry into agenticality scores and persists
//! one log line per sealed session. Process-wide metrics are restored from
//! the last log line on open.
//!
//! Metric deltas are applied only when a session is sealed, under a single
//! writer lock that also covers the log append, so the order of log lines
//! always matches the order of metric updates. Readers take a snapshot of
//! the whole state and never see a half-applied session.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DiagnosticsError, DiagnosticsResult, PersistenceResult};
use crate::domain::models::{
    AgenticalityBreakdown, Capability, Decision, DecisionInput, DecisionType, DiagnosticLogEntry,
    DiagnosticReport, DiagnosticsEvent, HealingInput, HealingRecord, HealingType, Limitation,
    Metrics, PerformanceSummary, ResetRecord, ScoringConfig, SelfCheck, Session, SessionOutcome,
    SessionSummary, Severity, StepInput, StepRecord,
};
use crate::domain::ports::DiagnosticLog;
use crate::services::event_bus::{Envelope, EventChannel};
use crate::services::scoring;

/// Confidence at or above which a decision counts as self-aware.
const CONFIDENT_DECISION: f64 = 0.8;

/// Sessions with at least this many steps count as complex.
const COMPLEX_SESSION_STEPS: usize = 5;

#[derive(Debug, Default)]
struct RecorderState {
    metrics: Metrics,
    active: HashMap<Uuid, Session>,
    recent: VecDeque<SessionSummary>,
    decisions_seen: u64,
    confident_decisions: u64,
    last_self_check: Option<SelfCheck>,
}

/// Records sessions and maintains process-wide diagnostics metrics.
pub struct DiagnosticsRecorder {
    state: RwLock<RecorderState>,
    writer: Mutex<()>,
    log: Arc<dyn DiagnosticLog>,
    scoring: ScoringConfig,
    recent_limit: usize,
    events: EventChannel<DiagnosticsEvent>,
}

impl DiagnosticsRecorder {
    /// Open a recorder backed by `log`, restoring metrics from its last line.
    ///
    /// An unreadable log is reported and treated as empty.
    pub async fn open(
        log: Arc<dyn DiagnosticLog>,
        scoring: ScoringConfig,
        recent_limit: usize,
        event_buffer: usize,
    ) -> Self {
        let metrics = match log.load_last_metrics().await {
            Ok(Some(metrics)) => {
                info!(
                    total_tasks = metrics.total_tasks,
                    score = metrics.agenticality_score,
                    "restored diagnostics metrics"
                );
                metrics
            }
            Ok(None) => {
                debug!("no diagnostic history found, starting fresh");
                Metrics::default()
            }
            Err(e) => {
                warn!(error = %e, "failed to restore diagnostics metrics, starting fresh");
                Metrics::default()
            }
        };

        let recent = match log.load_recent_sessions(recent_limit).await {
            Ok(sessions) => sessions.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "failed to load recent sessions");
                VecDeque::new()
            }
        };

        Self {
            state: RwLock::new(RecorderState {
                metrics,
                recent,
                ..RecorderState::default()
            }),
            writer: Mutex::new(()),
            log,
            scoring,
            recent_limit: recent_limit.max(1),
            events: EventChannel::new(event_buffer),
        }
    }

    /// Subscribe to diagnostics events.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope<DiagnosticsEvent>> {
        self.events.subscribe()
    }

    /// Start a new session and return its id.
    pub async fn start_session(&self, task_description: &str) -> Uuid {
        let session = Session::new(task_description);
        let id = session.id;
        self.state.write().await.active.insert(id, session);

        info!(session_id = %id, task = %task_description, "diagnostics session started");
        self.events.publish(DiagnosticsEvent::SessionStarted {
            session_id: id,
            task: task_description.to_string(),
        });
        id
    }

    pub async fn record_decision(
        &self,
        session_id: Uuid,
        input: DecisionInput,
    ) -> DiagnosticsResult<Decision> {
        let decision = Decision {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            decision_type: input.decision_type,
            action: input.action,
            reasoning: input.reasoning,
            confidence: input.confidence.clamp(0.0, 1.0),
            outcome: "pending".to_string(),
            alternatives: input.alternatives,
        };

        {
            let mut state = self.state.write().await;
            let session = state
                .active
                .get_mut(&session_id)
                .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
            match decision.decision_type {
                DecisionType::Autonomous => session.autonomous_actions += 1,
                DecisionType::Manual => session.manual_actions += 1,
                DecisionType::Supervised => {}
            }
            session.decisions.push(decision.clone());
            state.decisions_seen += 1;
            if decision.confidence >= CONFIDENT_DECISION {
                state.confident_decisions += 1;
            }
        }

        debug!(
            session_id = %session_id,
            action = %decision.action,
            decision_type = ?decision.decision_type,
            confidence = decision.confidence,
            "decision recorded"
        );
        self.events
            .publish(DiagnosticsEvent::DecisionRecorded(decision.clone()));
        Ok(decision)
    }

    /// Replace the pending outcome of a decision.
    pub async fn resolve_decision(
        &self,
        session_id: Uuid,
        decision_id: Uuid,
        outcome: &str,
    ) -> DiagnosticsResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .active
            .get_mut(&session_id)
            .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
        if let Some(decision) = session.decisions.iter_mut().find(|d| d.id == decision_id) {
            decision.outcome = outcome.to_string();
        }
        Ok(())
    }

    pub async fn record_step(
        &self,
        session_id: Uuid,
        input: StepInput,
    ) -> DiagnosticsResult<StepRecord> {
        let record = StepRecord {
            timestamp: Utc::now(),
            session_id,
            step_index: input.step_index,
            action: input.action,
            command: input.command,
            result: input.result,
            exit_code: input.exit_code,
            duration_ms: input.duration_ms,
            error: input.error,
            retry_count: input.retry_count,
        };

        {
            let mut state = self.state.write().await;
            let session = state
                .active
                .get_mut(&session_id)
                .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
            if let Some(ref err) = record.error {
                session.errors.push(format!("{}: {}", record.action, err));
            }
            session.steps.push(record.clone());
        }

        match record.error {
            Some(ref err) => debug!(
                session_id = %session_id,
                action = %record.action,
                retry = record.retry_count,
                error = %err,
                "step failed"
            ),
            None => debug!(
                session_id = %session_id,
                action = %record.action,
                duration_ms = record.duration_ms,
                "step succeeded"
            ),
        }
        self.events
            .publish(DiagnosticsEvent::StepRecorded(record.clone()));
        Ok(record)
    }

    pub async fn record_self_healing(
        &self,
        session_id: Uuid,
        input: HealingInput,
    ) -> DiagnosticsResult<HealingRecord> {
        let record = HealingRecord {
            timestamp: Utc::now(),
            session_id,
            healing_type: input.healing_type,
            issue: input.issue,
            action: input.action,
            success: input.success,
            prevented: input.prevented,
        };

        {
            let mut state = self.state.write().await;
            let session = state
                .active
                .get_mut(&session_id)
                .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
            if record.success {
                session.fixes.push(record.issue.clone());
            }
            session.healing.push(record.clone());
        }

        info!(
            session_id = %session_id,
            issue = %record.issue,
            action = %record.action,
            success = record.success,
            "self-healing recorded"
        );
        self.events
            .publish(DiagnosticsEvent::SelfHealing(record.clone()));
        Ok(record)
    }

    /// Count one iteration round of the observed task.
    pub async fn record_iteration(&self, session_id: Uuid) -> DiagnosticsResult<u32> {
        let mut state = self.state.write().await;
        let session = state
            .active
            .get_mut(&session_id)
            .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
        session.iterations += 1;
        Ok(session.iterations)
    }

    /// Record a session-level error that is not tied to a step.
    pub async fn record_error(&self, session_id: Uuid, message: &str) -> DiagnosticsResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .active
            .get_mut(&session_id)
            .ok_or(DiagnosticsError::SessionNotActive(session_id))?;
        session.errors.push(message.to_string());
        Ok(())
    }

    /// Seal a session: score it, fold it into metrics and append it to the log.
    ///
    /// A session can be sealed once; later calls return `SessionNotActive`.
    /// Log write failures are reported on the event channel, never returned.
    pub async fn end_session(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> DiagnosticsResult<Session> {
        let _writer = self.writer.lock().await;

        let (session, summary) = {
            let mut state = self.state.write().await;
            let mut session = state
                .active
                .remove(&session_id)
                .ok_or(DiagnosticsError::SessionNotActive(session_id))?;

            session.end_time = Some(Utc::now());
            session.outcome = Some(outcome);
            session.agenticality_score = scoring::session_score(&session, &self.scoring);

            apply_session(&mut state.metrics, &session);
            state.metrics.agenticality_score =
                scoring::overall_score(&state.metrics, &self.scoring);

            let summary = SessionSummary::from_session(&session, &state.metrics);
            state.recent.push_back(summary.clone());
            while state.recent.len() > self.recent_limit {
                state.recent.pop_front();
            }
            (session, summary)
        };

        info!(
            session_id = %session_id,
            outcome = %outcome,
            steps = session.steps.len(),
            iterations = session.iterations,
            success_rate = session.success_rate(),
            score = session.agenticality_score,
            "diagnostics session sealed"
        );

        self.persist(Some(session_id), DiagnosticLogEntry::Session(summary))
            .await;

        self.events.publish(DiagnosticsEvent::SessionSealed {
            session_id,
            outcome,
            agenticality_score: session.agenticality_score,
        });
        Ok(session)
    }

    async fn persist(&self, session_id: Option<Uuid>, entry: DiagnosticLogEntry) {
        if let Err(e) = self.log.append(&entry).await {
            error!(session_id = ?session_id, error = %e, "failed to write diagnostic log");
            self.events.publish(DiagnosticsEvent::PersistenceFailed {
                session_id,
                error: e.to_string(),
            });
        }
    }

    /// Zero all metrics and append a reset marker so restarts start from zero.
    pub async fn reset_metrics(&self) {
        let _writer = self.writer.lock().await;
        let metrics = {
            let mut state = self.state.write().await;
            state.metrics = Metrics::default();
            state.recent.clear();
            state.decisions_seen = 0;
            state.confident_decisions = 0;
            state.metrics.clone()
        };
        warn!("diagnostics metrics reset");
        self.persist(
            None,
            DiagnosticLogEntry::Reset(ResetRecord {
                timestamp: Utc::now(),
                metrics,
            }),
        )
        .await;
        self.events.publish(DiagnosticsEvent::MetricsReset);
    }

    pub async fn metrics(&self) -> Metrics {
        self.state.read().await.metrics.clone()
    }

    /// Snapshot of an active session.
    pub async fn active_session(&self, session_id: Uuid) -> Option<Session> {
        self.state.read().await.active.get(&session_id).cloned()
    }

    pub async fn active_session_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Health in [0, 100].
    pub async fn health_score(&self) -> f64 {
        scoring::health_score(&self.state.read().await.metrics)
    }

    /// Overall agenticality score in [0, 1].
    pub async fn agenticality_score(&self) -> f64 {
        self.state.read().await.metrics.agenticality_score
    }

    pub async fn rating(&self) -> &'static str {
        scoring::rating(self.agenticality_score().await)
    }

    pub async fn health_label(&self) -> &'static str {
        scoring::health_label(self.health_score().await)
    }

    pub async fn agenticality_breakdown(&self) -> AgenticalityBreakdown {
        let state = self.state.read().await;
        self.breakdown_of(&state)
    }

    fn breakdown_of(&self, state: &RecorderState) -> AgenticalityBreakdown {
        let metrics = &state.metrics;
        let iteration = if metrics.total_tasks > 0 && self.scoring.iteration_saturation > 0.0 {
            (metrics.average_iterations / self.scoring.iteration_saturation).min(1.0)
        } else {
            0.0
        };
        let complexity = if state.recent.is_empty() {
            0.0
        } else {
            state
                .recent
                .iter()
                .filter(|s| s.steps >= COMPLEX_SESSION_STEPS)
                .count() as f64
                / state.recent.len() as f64
        };
        let self_awareness = if state.decisions_seen > 0 {
            state.confident_decisions as f64 / state.decisions_seen as f64
        } else {
            0.0
        };

        AgenticalityBreakdown {
            autonomy: metrics.autonomy_rate().unwrap_or(0.0),
            iteration,
            complexity,
            self_awareness,
        }
    }

    pub async fn report(&self) -> DiagnosticReport {
        let state = self.state.read().await;
        let health = scoring::health_score(&state.metrics);
        DiagnosticReport {
            generated_at: Utc::now(),
            metrics: state.metrics.clone(),
            performance: performance_of(&state.recent),
            recent_sessions: state.recent.iter().cloned().collect(),
            breakdown: self.breakdown_of(&state),
            health_score: health,
            health_label: scoring::health_label(health).to_string(),
            rating: scoring::rating(state.metrics.agenticality_score).to_string(),
            last_self_check: state.last_self_check.clone(),
        }
    }

    /// Evaluate capabilities and limitations from current metrics.
    pub async fn self_check(&self) -> SelfCheck {
        let check = {
            let mut state = self.state.write().await;
            let check = evaluate(&state.metrics);
            state.last_self_check = Some(check.clone());
            check
        };

        info!(
            health = check.health_score,
            score = check.agenticality_score,
            limitations = check.limitations.len(),
            "self-check complete"
        );
        self.events.publish(DiagnosticsEvent::SelfCheckCompleted {
            health_score: check.health_score,
            agenticality_score: check.agenticality_score,
        });
        check
    }

    /// Run `self_check` every `period` until the returned handle is stopped.
    pub fn spawn_self_monitor(self: &Arc<Self>, period: Duration) -> SelfMonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let recorder = Arc::clone(self);

        let join = tokio::spawn(async move {
            let mut timer = interval(period);
            // First tick fires immediately
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        recorder.self_check().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("self monitor stopped");
        });

        SelfMonitorHandle { stop_tx, join }
    }

    /// Write the current report as pretty JSON.
    pub async fn export_report(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let report = self.report().await;
        let json = serde_json::to_string_pretty(&report)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "diagnostic report exported");
        Ok(())
    }
}

/// Handle for the background self-check task.
pub struct SelfMonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SelfMonitorHandle {
    /// Stop the monitor and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "self monitor task ended abnormally");
        }
    }
}

fn apply_session(metrics: &mut Metrics, session: &Session) {
    metrics.total_tasks += 1;
    match session.outcome {
        Some(SessionOutcome::Success) => metrics.successful_tasks += 1,
        _ => metrics.failed_tasks += 1,
    }
    metrics.total_iterations += u64::from(session.iterations);
    metrics.autonomous_executions += u64::from(session.autonomous_actions);
    metrics.manual_interventions += u64::from(session.manual_actions);
    metrics.self_healing_events += session.healing.len() as u64;
    metrics.predicted_failures += session
        .healing
        .iter()
        .filter(|h| h.healing_type == HealingType::Predicted)
        .count() as u64;
    metrics.prevented_failures += session.healing.iter().filter(|h| h.prevented).count() as u64;
    metrics.cumulative_session_score += session.agenticality_score;
    metrics.average_iterations = metrics.total_iterations as f64 / metrics.total_tasks as f64;
}

fn performance_of(recent: &VecDeque<SessionSummary>) -> PerformanceSummary {
    if recent.is_empty() {
        return PerformanceSummary::default();
    }
    let n = recent.len() as f64;
    PerformanceSummary {
        avg_duration_ms: recent.iter().map(|s| s.duration as f64).sum::<f64>() / n,
        avg_steps: recent.iter().map(|s| s.steps as f64).sum::<f64>() / n,
        avg_iterations: recent.iter().map(|s| f64::from(s.iterations)).sum::<f64>() / n,
        avg_errors: recent.iter().map(|s| s.errors as f64).sum::<f64>() / n,
    }
}

fn evaluate(metrics: &Metrics) -> SelfCheck {
    let capability = |name: &str, available: bool| Capability {
        name: name.to_string(),
        available,
    };
    let capabilities = vec![
        capability("file-creation", true),
        capability("command-execution", true),
        capability("error-iteration", metrics.total_iterations > 0),
        capability("dependency-install", true),
        capability("self-healing", metrics.self_healing_events > 0),
        capability("context-retention", metrics.context_retention_score > 80.0),
    ];

    let mut limitations = Vec::new();
    if metrics.failure_rate() > 0.2 {
        limitations.push(Limitation {
            kind: "high-failure-rate".to_string(),
            severity: Severity::Medium,
            description: "Task failure rate exceeds 20%".to_string(),
        });
    }
    let manual_ratio =
        metrics.manual_interventions as f64 / metrics.autonomous_executions.max(1) as f64;
    if manual_ratio > 0.3 {
        limitations.push(Limitation {
            kind: "low-autonomy".to_string(),
            severity: Severity::High,
            description: "Requires manual intervention in >30% of actions".to_string(),
        });
    }
    if metrics.average_iterations > 5.0 {
        limitations.push(Limitation {
            kind: "excessive-iteration".to_string(),
            severity: Severity::Low,
            description: "Average iterations higher than expected".to_string(),
        });
    }

    SelfCheck {
        checked_at: Utc::now(),
        health_score: scoring::health_score(metrics),
        agenticality_score: metrics.agenticality_score,
        capabilities,
        limitations,
    }
}
