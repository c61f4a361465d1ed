//! Diagnostic log port - durable append-only session history.

use async_trait::async_trait;

use crate::domain::errors::PersistenceResult;
use crate::domain::models::{DiagnosticLogEntry, Metrics, SessionSummary};

/// Append-only log. The last entry carries the authoritative metrics.
#[async_trait]
pub trait DiagnosticLog: Send + Sync {
    async fn append(&self, entry: &DiagnosticLogEntry) -> PersistenceResult<()>;

    /// Metrics from the last entry, `None` for an empty or missing log.
    async fn load_last_metrics(&self) -> PersistenceResult<Option<Metrics>>;

    /// Up to `limit` most recent session summaries, oldest first.
    async fn load_recent_sessions(&self, limit: usize) -> PersistenceResult<Vec<SessionSummary>>;
}
