//! Unit worker port - what a pooled mini agent runs for one work unit.

use async_trait::async_trait;

use crate::domain::errors::UnitError;
use crate::domain::models::{AgentKind, WorkUnit};

#[async_trait]
pub trait UnitWorker: Send + Sync {
    /// Run `unit` as an agent specialized in `kind`.
    async fn run(&self, kind: AgentKind, unit: &WorkUnit) -> Result<serde_json::Value, UnitError>;
}
