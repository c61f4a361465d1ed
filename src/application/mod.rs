pub mod swarm_dispatcher;
pub mod task_orchestrator;

pub use swarm_dispatcher::{BatchOptions, BatchReport, PoolStats, SwarmDispatcher};
pub use task_orchestrator::{ExecuteOptions, TaskOrchestrator, TaskReport};
