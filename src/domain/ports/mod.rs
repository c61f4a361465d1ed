//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the orchestration layer depends on:
//! - Planner: prompt to ordered steps
//! - StepHandler: performs one step against an external collaborator
//! - UnitWorker: runs one swarm work unit
//! - DiagnosticLog: durable session history

pub mod diagnostic_log;
pub mod planner;
pub mod step_handler;
pub mod unit_worker;

pub use diagnostic_log::DiagnosticLog;
pub use planner::{validate_plan, Planner};
pub use step_handler::{StepHandler, StepOutput, TaskContext};
pub use unit_worker::UnitWorker;
