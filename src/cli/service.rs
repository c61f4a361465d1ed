//! Wiring shared by the CLI commands: configuration, logging, recorder
//! and step handler construction.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::handlers::{HttpPlanner, HttpStepHandler, InferenceClient, MockStepHandler};
use crate::domain::models::{Config, HandlerKind};
use crate::domain::ports::{Planner, StepHandler};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::infrastructure::JsonlDiagnosticLog;
use crate::services::{DiagnosticsRecorder, HeuristicPlanner};

/// Load `path` if given, otherwise the layered project configuration.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Install the global subscriber described by `config.logging`.
pub fn init_logging(config: &Config) -> Result<LoggerImpl> {
    LoggerImpl::init(&LogConfig::from(&config.logging)).context("Failed to initialize logging")
}

/// Open the JSONL diagnostic log and restore the recorder from it.
pub async fn open_recorder(config: &Config) -> Result<Arc<DiagnosticsRecorder>> {
    let log = JsonlDiagnosticLog::open(&config.diagnostics.log_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open diagnostic log at {}",
                config.diagnostics.log_path.display()
            )
        })?;
    let recorder = DiagnosticsRecorder::open(
        Arc::new(log),
        config.scoring.clone(),
        config.diagnostics.recent_sessions,
        config.diagnostics.event_buffer,
    )
    .await;
    Ok(Arc::new(recorder))
}

/// Scripted failures for the mock handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockScript {
    /// One-based step number to fail
    pub fail_step: Option<usize>,
    pub fail_times: u32,
}

/// Build the configured step handler and the planner that goes with it.
pub fn build_handler(
    config: &Config,
    script: MockScript,
) -> Result<(Arc<dyn StepHandler>, Arc<dyn Planner>)> {
    let heuristic = HeuristicPlanner::new(config.planner.clone());
    match config.handler.kind {
        HandlerKind::Mock => {
            let mut handler = MockStepHandler::new();
            if let Some(step) = script.fail_step {
                handler = handler.fail_step(step.saturating_sub(1), script.fail_times);
            }
            Ok((Arc::new(handler), Arc::new(heuristic)))
        }
        HandlerKind::Http => {
            let client = Arc::new(
                InferenceClient::new(config.handler.clone())
                    .context("Failed to build inference client")?,
            );
            Ok((
                Arc::new(HttpStepHandler::new(Arc::clone(&client))),
                Arc::new(HttpPlanner::new(client, heuristic)),
            ))
        }
    }
}
