//! Domain errors for the taskpilot engine.

use thiserror::Error;
use uuid::Uuid;

/// Planning could not produce a usable step list. Fatal, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Planner produced an empty step list")]
    EmptyPlan,

    #[error("Plan must end with a verify step, found {0}")]
    MissingVerify(String),

    #[error("Planner backend failed: {0}")]
    Backend(String),
}

/// A single step failed. Recoverable through iteration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("Step handler failed: {0}")]
    Failed(String),

    #[error("Step handler unavailable: {0}")]
    Unavailable(String),

    #[error("Step timed out after {0}ms")]
    Timeout(u64),

    #[error("Delegated work failed: {failed} of {total} units")]
    UnitsFailed { failed: usize, total: usize },

    /// The swarm could not take the step at all. Not retried.
    #[error("Swarm pool fault: {0}")]
    Pool(#[from] PoolError),
}

/// A swarm unit failed. Isolated to that unit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UnitError(pub String);

/// Task-level failure surfaced to the caller of `execute`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("max iterations reached")]
    IterationLimitExceeded {
        limit: u32,
        failed_steps: Vec<usize>,
    },

    #[error("Task cancelled: {0}")]
    Cancelled(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Swarm delegation failed: {0}")]
    Pool(#[from] PoolError),
}

/// Worker pool faults. Fatal to the batch call only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool not initialized")]
    NotInitialized,

    #[error("Pool size must be at least 1")]
    NoWorkers,

    #[error("Insufficient agents: need {required}, pool has {available}")]
    InsufficientAgents { required: usize, available: usize },

    #[error("Parallelism must be at least 1")]
    InvalidParallelism,
}

/// Diagnostic log write or read failure. Reported, never propagated to the observed task.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Diagnostic log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Diagnostic log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Diagnostic log lock poisoned")]
    LockPoisoned,
}

/// Misuse of the diagnostics recorder API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("Session not active: {0}")]
    SessionNotActive(Uuid),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
pub type PoolResult<T> = Result<T, PoolError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;
