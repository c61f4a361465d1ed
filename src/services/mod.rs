//! Domain services: planning heuristics, scoring, event fan-out and the
//! diagnostics recorder.

pub mod diagnostics_recorder;
pub mod event_bus;
pub mod heuristic_planner;
pub mod scoring;

pub use diagnostics_recorder::{DiagnosticsRecorder, SelfMonitorHandle};
pub use event_bus::{Envelope, EventChannel, SequenceNumber};
pub use heuristic_planner::HeuristicPlanner;
