//! CLI command implementations.

pub mod diagnostics;
pub mod run;
pub mod swarm;
