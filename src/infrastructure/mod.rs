//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging (tracing)
//! - Diagnostic log persistence (JSON Lines)
//!
//! Implementations here satisfy the port traits defined in the domain layer.

pub mod config;
pub mod diagnostic_log;
pub mod logging;

pub use diagnostic_log::{JsonlDiagnosticLog, MemoryDiagnosticLog};
