pub mod agent;
pub mod config;
pub mod events;
pub mod metrics;
pub mod session;
pub mod task;

pub use agent::{Agent, AgentKind, AgentStatus, UnitOutcome, WorkUnit};
pub use config::{
    Config, DiagnosticsConfig, HandlerConfig, HandlerKind, LoggingConfig, OrchestratorConfig,
    OverallWeights, PlannerConfig, ScoringConfig, SessionWeights, SwarmConfig,
};
pub use events::{DiagnosticsEvent, ProgressEvent, SwarmEvent, SwarmEventKind};
pub use metrics::{
    AgenticalityBreakdown, Capability, DiagnosticLogEntry, DiagnosticReport, Limitation, Metrics,
    PerformanceSummary, ResetRecord, SelfCheck, SessionSummary, Severity,
};
pub use session::{
    Decision, DecisionInput, DecisionType, HealingInput, HealingRecord, HealingType, Session,
    SessionOutcome, StepInput, StepRecord,
};
pub use task::{Complexity, Plan, Step, StepAction, StepResult, Task, TaskStatus, Verification};
