//! Swarm unit workers.

pub mod code_analysis;

pub use code_analysis::{chunk_for_agents, chunk_lines, CodeAnalysisWorker};
