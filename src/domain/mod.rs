//! Domain layer for the taskpilot engine
//!
//! Core models, error types and the port traits the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    DiagnosticsError, ExecutionError, PersistenceError, PlanningError, PoolError, StepError,
    UnitError,
};
