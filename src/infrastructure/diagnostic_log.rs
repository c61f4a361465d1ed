//! Diagnostic log backends.
//!
//! The on-disk format is JSON Lines: one object per sealed session or
//! metrics reset, each embedding the full metrics snapshot as of that
//! line. Restoring state needs the last readable line; a torn tail left
//! by an interrupted append is skipped and terminated on the next open.

use async_trait::async_trait;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::{PersistenceError, PersistenceResult};
use crate::domain::models::{DiagnosticLogEntry, Metrics, SessionSummary};
use crate::domain::ports::DiagnosticLog;

/// Append-only JSONL file.
#[derive(Clone)]
pub struct JsonlDiagnosticLog {
    path: PathBuf,
    log_file: Arc<Mutex<File>>,
}

impl JsonlDiagnosticLog {
    /// Open (or create) the log at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if ends_mid_line(path)? {
            warn!(path = %path.display(), "diagnostic log ends mid-line, terminating it");
            writeln!(file)?;
            file.flush()?;
        }

        debug!(path = %path.display(), "diagnostic log opened");
        Ok(Self {
            path: path.to_path_buf(),
            log_file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_lines(&self) -> PersistenceResult<Vec<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DiagnosticLog for JsonlDiagnosticLog {
    async fn append(&self, entry: &DiagnosticLogEntry) -> PersistenceResult<()> {
        let json = serde_json::to_string(entry)?;

        let mut file = self
            .log_file
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    async fn load_last_metrics(&self) -> PersistenceResult<Option<Metrics>> {
        let lines = self.read_lines().await?;

        for (number, line) in lines.iter().enumerate().rev() {
            match snapshot_of(line) {
                Ok(Some(metrics)) => return Ok(Some(metrics)),
                Ok(None) => {
                    debug!(line = number + 1, "diagnostic log line carries no metrics");
                }
                Err(e) => {
                    warn!(line = number + 1, error = %e, "skipping unreadable diagnostic log line");
                }
            }
        }
        Ok(None)
    }

    async fn load_recent_sessions(&self, limit: usize) -> PersistenceResult<Vec<SessionSummary>> {
        let lines = self.read_lines().await?;
        let mut sessions = Vec::new();

        for (number, line) in lines.iter().enumerate() {
            match serde_json::from_str::<DiagnosticLogEntry>(line) {
                Ok(DiagnosticLogEntry::Session(summary)) => sessions.push(summary),
                Ok(DiagnosticLogEntry::Reset(_)) => sessions.clear(),
                Err(e) => {
                    warn!(line = number + 1, error = %e, "skipping unreadable diagnostic log line");
                }
            }
        }

        let skip = sessions.len().saturating_sub(limit);
        Ok(sessions.into_iter().skip(skip).collect())
    }
}

/// Metrics snapshot embedded in one log line.
///
/// The field is read directly so untagged lines still restore.
fn snapshot_of(line: &str) -> serde_json::Result<Option<Metrics>> {
    let mut value: Value = serde_json::from_str(line)?;
    value
        .get_mut("metrics")
        .map(Value::take)
        .map(serde_json::from_value)
        .transpose()
}

fn ends_mid_line(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// In-memory log for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryDiagnosticLog {
    entries: RwLock<Vec<DiagnosticLogEntry>>,
}

impl MemoryDiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DiagnosticLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl DiagnosticLog for MemoryDiagnosticLog {
    async fn append(&self, entry: &DiagnosticLogEntry) -> PersistenceResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn load_last_metrics(&self) -> PersistenceResult<Option<Metrics>> {
        Ok(self
            .entries
            .read()
            .await
            .last()
            .map(|entry| entry.metrics().clone()))
    }

    async fn load_recent_sessions(&self, limit: usize) -> PersistenceResult<Vec<SessionSummary>> {
        let entries = self.entries.read().await;
        let start = entries
            .iter()
            .rposition(|e| matches!(e, DiagnosticLogEntry::Reset(_)))
            .map_or(0, |i| i + 1);
        let sessions: Vec<SessionSummary> = entries[start..]
            .iter()
            .filter_map(|e| match e {
                DiagnosticLogEntry::Session(summary) => Some(summary.clone()),
                DiagnosticLogEntry::Reset(_) => None,
            })
            .collect();
        let skip = sessions.len().saturating_sub(limit);
        Ok(sessions.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ResetRecord, Session, SessionOutcome};
    use chrono::Utc;
    use tempfile::TempDir;

    fn summary(task: &str, total_tasks: u64) -> DiagnosticLogEntry {
        let mut session = Session::new(task);
        session.outcome = Some(SessionOutcome::Success);
        session.end_time = Some(Utc::now());
        let metrics = Metrics {
            total_tasks,
            successful_tasks: total_tasks,
            ..Metrics::default()
        };
        DiagnosticLogEntry::Session(SessionSummary::from_session(&session, &metrics))
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/diagnostics.jsonl");
        let log = JsonlDiagnosticLog::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(log.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_empty_log_has_no_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlDiagnosticLog::open(temp_dir.path().join("d.jsonl"))
            .await
            .unwrap();
        assert!(log.load_last_metrics().await.unwrap().is_none());
        assert!(log.load_recent_sessions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_line_wins() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlDiagnosticLog::open(temp_dir.path().join("d.jsonl"))
            .await
            .unwrap();
        for n in 1..=3 {
            log.append(&summary("task", n)).await.unwrap();
        }

        let metrics = log.load_last_metrics().await.unwrap().unwrap();
        assert_eq!(metrics.total_tasks, 3);

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_untagged_line_still_restores_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("d.jsonl");
        std::fs::write(
            &path,
            "{\"sessionId\":\"x\",\"metrics\":{\"totalTasks\":7,\"agentialityScore\":0.4}}\n",
        )
        .unwrap();

        let log = JsonlDiagnosticLog::open(&path).await.unwrap();
        let metrics = log.load_last_metrics().await.unwrap().unwrap();
        assert_eq!(metrics.total_tasks, 7);
        assert!((metrics.agenticality_score - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unreadable_log_has_no_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("d.jsonl");
        std::fs::write(&path, "{not json\n").unwrap();

        let log = JsonlDiagnosticLog::open(&path).await.unwrap();
        assert!(log.load_last_metrics().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_torn_tail_falls_back_to_last_whole_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("d.jsonl");
        {
            let log = JsonlDiagnosticLog::open(&path).await.unwrap();
            for n in 1..=3 {
                log.append(&summary("task", n)).await.unwrap();
            }
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"kind\":\"session\",\"timest").unwrap();
        drop(file);

        let log = JsonlDiagnosticLog::open(&path).await.unwrap();
        assert_eq!(log.load_last_metrics().await.unwrap().unwrap().total_tasks, 3);
        assert_eq!(log.load_recent_sessions(10).await.unwrap().len(), 3);

        // The next append lands on its own line
        log.append(&summary("after crash", 4)).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 5);
        assert_eq!(log.load_last_metrics().await.unwrap().unwrap().total_tasks, 4);
        let recent = log.load_recent_sessions(10).await.unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[3].task, "after crash");
    }

    #[tokio::test]
    async fn test_recent_sessions_restart_after_reset() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlDiagnosticLog::open(temp_dir.path().join("d.jsonl"))
            .await
            .unwrap();
        log.append(&summary("old", 1)).await.unwrap();
        log.append(&DiagnosticLogEntry::Reset(ResetRecord {
            timestamp: Utc::now(),
            metrics: Metrics::default(),
        }))
        .await
        .unwrap();
        for n in 1..=4 {
            log.append(&summary("new", n)).await.unwrap();
        }

        let recent = log.load_recent_sessions(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().all(|s| s.task == "new"));
        assert_eq!(recent.last().unwrap().metrics.total_tasks, 4);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_lines_whole() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlDiagnosticLog::open(temp_dir.path().join("d.jsonl"))
            .await
            .unwrap();

        let mut handles = vec![];
        for n in 0..10 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(&summary(&format!("task-{n}"), n)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(log.path()).unwrap();
        for line in content.lines() {
            let _: DiagnosticLogEntry = serde_json::from_str(line).unwrap();
        }
        assert_eq!(log.load_recent_sessions(100).await.unwrap().len(), 10);
    }
}
