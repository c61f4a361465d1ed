//! Common test utilities for integration tests
//!
//! Shared fixtures for building orchestrators, recorders and dispatchers
//! against in-memory or temp-dir backed diagnostic logs.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use taskpilot::adapters::handlers::MockStepHandler;
use taskpilot::application::TaskOrchestrator;
use taskpilot::domain::errors::UnitError;
use taskpilot::domain::models::{AgentKind, OrchestratorConfig, ScoringConfig, WorkUnit};
use taskpilot::domain::ports::UnitWorker;
use taskpilot::infrastructure::{JsonlDiagnosticLog, MemoryDiagnosticLog};
use taskpilot::services::DiagnosticsRecorder;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialize a tracing subscriber that writes through the test harness.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub async fn memory_recorder() -> Arc<DiagnosticsRecorder> {
    Arc::new(
        DiagnosticsRecorder::open(
            Arc::new(MemoryDiagnosticLog::new()),
            ScoringConfig::default(),
            10,
            256,
        )
        .await,
    )
}

pub async fn jsonl_recorder(path: &Path) -> Arc<DiagnosticsRecorder> {
    let log = JsonlDiagnosticLog::open(path)
        .await
        .expect("Failed to open diagnostic log");
    Arc::new(DiagnosticsRecorder::open(Arc::new(log), ScoringConfig::default(), 10, 256).await)
}

pub async fn orchestrator(handler: MockStepHandler) -> TaskOrchestrator {
    TaskOrchestrator::new(
        Arc::new(handler),
        memory_recorder().await,
        OrchestratorConfig::default(),
    )
}

/// Worker that sleeps and tracks how many units run at once.
#[derive(Default)]
pub struct CountingWorker {
    pub delay: Duration,
    pub current: AtomicUsize,
    pub max_seen: AtomicUsize,
    pub runs: AtomicUsize,
}

impl CountingWorker {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitWorker for CountingWorker {
    async fn run(&self, kind: AgentKind, unit: &WorkUnit) -> Result<Value, UnitError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);

        if unit.content.contains("fail") {
            return Err(UnitError(format!("unit {} rejected", unit.id)));
        }
        Ok(json!({ "unit": unit.id, "agent": kind.as_str() }))
    }
}

pub fn units(count: usize) -> Vec<WorkUnit> {
    (0..count)
        .map(|i| WorkUnit::new(format!("unit_{i}"), format!("payload {i}")))
        .collect()
}
