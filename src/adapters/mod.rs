//! Adapters for external collaborators: step handlers and swarm workers.

pub mod handlers;
pub mod workers;
