//! Mini-agent domain model for the swarm worker pool.

use serde::{Deserialize, Serialize};

/// Specialization of a pooled mini agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Parser,
    Validator,
    Optimizer,
    Tester,
    Documenter,
    Refactor,
    Security,
    Performance,
    Style,
    Dependency,
}

impl AgentKind {
    /// All kinds in pool assignment order.
    pub const ALL: [AgentKind; 10] = [
        Self::Parser,
        Self::Validator,
        Self::Optimizer,
        Self::Tester,
        Self::Documenter,
        Self::Refactor,
        Self::Security,
        Self::Performance,
        Self::Style,
        Self::Dependency,
    ];

    /// Kind for the agent at `index` in a freshly sized pool.
    pub fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parser => "parser",
            Self::Validator => "validator",
            Self::Optimizer => "optimizer",
            Self::Tester => "tester",
            Self::Documenter => "documenter",
            Self::Refactor => "refactor",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Dependency => "dependency",
        }
    }

    pub fn specialization(&self) -> &'static str {
        match self {
            Self::Parser => "Code parsing",
            Self::Validator => "Syntax validation",
            Self::Optimizer => "Code optimization",
            Self::Tester => "Unit testing",
            Self::Documenter => "Documentation generation",
            Self::Refactor => "Code refactoring",
            Self::Security => "Security analysis",
            Self::Performance => "Performance analysis",
            Self::Style => "Code style checking",
            Self::Dependency => "Dependency analysis",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent status within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Done,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pooled worker. Reused across batches until the pool shuts down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub current_unit: Option<String>,
    pub tasks_completed: u64,
}

impl Agent {
    pub fn new(index: usize) -> Self {
        Self {
            id: format!("mini_{index}"),
            kind: AgentKind::for_index(index),
            status: AgentStatus::Idle,
            current_unit: None,
            tasks_completed: 0,
        }
    }

    pub fn specialization(&self) -> &'static str {
        self.kind.specialization()
    }
}

/// One independent unit of swarm work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    pub content: String,
    /// Free-form context such as the line range a chunk came from.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Settled outcome of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit_id: String,
    pub agent_id: String,
    pub agent_kind: AgentKind,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}
