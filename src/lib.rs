//! taskpilot - autonomous task execution engine
//!
//! Turns a natural-language request into a plan, runs the steps, verifies
//! the outcome and iterates on failures. Large inputs can be fanned out
//! across a bounded pool of specialized mini agents, and every task is
//! scored by a persistent diagnostics recorder.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, error taxonomy and port traits
//! - **Service Layer** (`services`): planning heuristics, scoring, event channels, diagnostics
//! - **Application Layer** (`application`): task orchestrator and swarm dispatcher
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, diagnostic log files
//! - **Adapters** (`adapters`): step handlers and unit workers
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskpilot::adapters::handlers::MockStepHandler;
//! use taskpilot::application::{ExecuteOptions, TaskOrchestrator};
//! use taskpilot::domain::models::{OrchestratorConfig, ScoringConfig};
//! use taskpilot::infrastructure::MemoryDiagnosticLog;
//! use taskpilot::services::DiagnosticsRecorder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let recorder = Arc::new(
//!         DiagnosticsRecorder::open(Arc::new(MemoryDiagnosticLog::new()), ScoringConfig::default(), 10, 64).await,
//!     );
//!     let orchestrator = TaskOrchestrator::new(
//!         Arc::new(MockStepHandler::new()),
//!         recorder,
//!         OrchestratorConfig::default(),
//!     );
//!     let report = orchestrator.execute("create a script and run it", ExecuteOptions::default()).await?;
//!     println!("{} steps, score {:.2}", report.results.len(), report.agenticality_score);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{
    BatchOptions, BatchReport, ExecuteOptions, SwarmDispatcher, TaskOrchestrator, TaskReport,
};
pub use domain::models::{Config, Task, TaskStatus};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::DiagnosticsRecorder;
