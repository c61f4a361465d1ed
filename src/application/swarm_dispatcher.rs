//! Swarm dispatcher: bounded-concurrency batch scheduling over a pool of
//! mini agents.
//!
//! Units are partitioned into sequential batches of at most `parallelism`
//! units. Every unit of a batch runs on its own agent concurrently; the
//! next batch starts only after the previous one has fully settled and
//! its `batch-complete` event was published. Unit failures, timeouts and
//! panics are isolated to that unit.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::domain::errors::{PoolError, PoolResult};
use crate::domain::models::{
    Agent, AgentKind, AgentStatus, SwarmConfig, SwarmEvent, SwarmEventKind, UnitOutcome, WorkUnit,
};
use crate::domain::ports::UnitWorker;
use crate::services::event_bus::{Envelope, EventChannel};

/// Per-call overrides for `run_batch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallelism: Option<usize>,
    pub min_agents: Option<usize>,
}

/// Outcome of a `run_batch` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_units: usize,
    pub successful_units: usize,
    pub failed_units: usize,
    pub elapsed_ms: u64,
    pub agents_used: usize,
    pub batches: usize,
    pub parallelism: usize,
    /// One outcome per unit, in submission order.
    pub results: Vec<UnitOutcome>,
}

impl BatchReport {
    pub fn success_rate(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        self.successful_units as f64 / self.total_units as f64
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_units == 0
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub idle: usize,
    pub working: usize,
    pub completed_units: u64,
    pub peak_concurrency: usize,
    pub parallelism: usize,
}

/// Fixed facts about one `run_batch` call, shared by its events.
struct RunShape {
    total: usize,
    total_batches: usize,
    started: Instant,
}

/// Decrements the working count even if the worker panics.
struct WorkingGuard {
    working: Arc<AtomicUsize>,
}

impl WorkingGuard {
    fn enter(working: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = working.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            working: Arc::clone(working),
        }
    }
}

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        self.working.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SwarmDispatcher {
    worker: Arc<dyn UnitWorker>,
    config: SwarmConfig,
    agents: RwLock<Vec<Agent>>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
    /// Serializes runs against each other and against init/shutdown.
    run_lock: Mutex<()>,
    working: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed_units: AtomicU64,
    events: EventChannel<SwarmEvent>,
}

impl SwarmDispatcher {
    pub fn new(worker: Arc<dyn UnitWorker>, config: SwarmConfig) -> Self {
        let events = EventChannel::new(config.event_buffer);
        Self {
            worker,
            config,
            agents: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            run_lock: Mutex::new(()),
            working: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            completed_units: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope<SwarmEvent>> {
        self.events.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Create `size` agents, replacing any existing pool.
    pub async fn init_pool(&self, size: usize) -> PoolResult<()> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }
        let _run = self.run_lock.lock().await;

        *self.agents.write().await = (0..size).map(Agent::new).collect();
        self.initialized.store(true, Ordering::SeqCst);

        info!(pool_size = size, parallelism = self.config.parallelism, "agent pool initialized");
        Ok(())
    }

    /// Run `units` in sequential batches of bounded concurrency.
    pub async fn run_batch(&self, units: Vec<WorkUnit>, options: BatchOptions) -> PoolResult<BatchReport> {
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized);
        }
        let _run = self.run_lock.lock().await;
        // Shutdown may have completed while waiting for the lock
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized);
        }

        let pool_size = self.agents.read().await.len();
        let min_agents = options.min_agents.unwrap_or(self.config.min_agents);
        if pool_size < min_agents {
            return Err(PoolError::InsufficientAgents {
                required: min_agents,
                available: pool_size,
            });
        }
        let requested = options.parallelism.unwrap_or(self.config.parallelism);
        if requested == 0 {
            return Err(PoolError::InvalidParallelism);
        }
        let parallelism = requested.min(pool_size);

        let total = units.len();
        let total_batches = total.div_ceil(parallelism);
        let started = Instant::now();
        let run = RunShape {
            total,
            total_batches,
            started,
        };

        info!(
            units = total,
            batches = total_batches,
            parallelism,
            pool_size,
            "swarm run started"
        );

        let mut results: Vec<UnitOutcome> = Vec::with_capacity(total);
        let mut agents_used = BTreeSet::new();
        let mut successful = 0;
        let mut batches_run = 0;

        for (batch_index, chunk) in units.chunks(parallelism).enumerate() {
            if self.shutting_down.load(Ordering::SeqCst) {
                warn!(batch = batch_index, "pool shutting down, abandoning remaining units");
                break;
            }

            self.publish(&run, SwarmEventKind::BatchStart, batch_index, chunk.len(), results.len(), successful);

            let offset = batch_index * parallelism;
            let outcomes = self.run_chunk(chunk, offset, pool_size).await;

            for outcome in outcomes {
                agents_used.insert(outcome.agent_id.clone());
                if outcome.success {
                    successful += 1;
                }
                results.push(outcome);
            }
            batches_run += 1;

            self.publish(&run, SwarmEventKind::BatchComplete, batch_index, chunk.len(), results.len(), successful);
            self.release_agents().await;

            debug!(
                batch = batch_index,
                completed = results.len(),
                successful,
                "batch settled"
            );
        }

        // Units never scheduled because of shutdown
        for unit in units.iter().skip(results.len()) {
            results.push(UnitOutcome {
                unit_id: unit.id.clone(),
                agent_id: String::new(),
                agent_kind: AgentKind::Parser,
                success: false,
                output: None,
                error: Some("pool shut down".to_string()),
                duration_ms: 0,
            });
        }

        self.publish(&run, SwarmEventKind::SwarmComplete, total_batches, 0, results.len(), successful);

        let report = BatchReport {
            total_units: total,
            successful_units: successful,
            failed_units: total - successful,
            elapsed_ms: elapsed_ms(&started),
            agents_used: agents_used.len(),
            batches: batches_run,
            parallelism,
            results,
        };

        info!(
            total = report.total_units,
            successful = report.successful_units,
            failed = report.failed_units,
            elapsed_ms = report.elapsed_ms,
            "swarm run complete"
        );
        Ok(report)
    }

    async fn run_chunk(&self, chunk: &[WorkUnit], offset: usize, pool_size: usize) -> Vec<UnitOutcome> {
        let unit_timeout = Duration::from_millis(self.config.unit_timeout_ms);
        let mut handles = Vec::with_capacity(chunk.len());
        let mut assigned = Vec::with_capacity(chunk.len());

        {
            let mut agents = self.agents.write().await;
            for (slot, unit) in chunk.iter().enumerate() {
                let agent_index = (offset + slot) % pool_size;
                let agent = &mut agents[agent_index];
                agent.status = AgentStatus::Working;
                agent.current_unit = Some(unit.id.clone());
                assigned.push((agent_index, agent.id.clone(), agent.kind));
            }
        }

        for (unit, (_, _, kind)) in chunk.iter().zip(&assigned) {
            let worker = Arc::clone(&self.worker);
            let working = Arc::clone(&self.working);
            let peak = Arc::clone(&self.peak);
            let unit = unit.clone();
            let kind = *kind;

            handles.push(tokio::spawn(async move {
                let _guard = WorkingGuard::enter(&working, &peak);
                let started = Instant::now();
                let result = timeout(unit_timeout, worker.run(kind, &unit)).await;
                (result, elapsed_ms(&started))
            }));
        }

        let settled = join_all(handles).await;

        let mut outcomes = Vec::with_capacity(chunk.len());
        let mut agents = self.agents.write().await;
        for ((unit, (agent_index, agent_id, kind)), joined) in chunk.iter().zip(assigned).zip(settled) {
            let (output, error, duration_ms) = match joined {
                Ok((Ok(Ok(output)), duration)) => (Some(output), None, duration),
                Ok((Ok(Err(e)), duration)) => (None, Some(e.to_string()), duration),
                Ok((Err(_), duration)) => (
                    None,
                    Some(format!("unit timed out after {}ms", unit_timeout.as_millis())),
                    duration,
                ),
                Err(e) => (None, Some(format!("worker panicked: {e}")), 0),
            };
            let success = error.is_none();

            let agent = &mut agents[agent_index];
            agent.status = if success { AgentStatus::Done } else { AgentStatus::Error };
            agent.current_unit = None;
            agent.tasks_completed += 1;
            self.completed_units.fetch_add(1, Ordering::SeqCst);

            if let Some(ref err) = error {
                debug!(unit = %unit.id, agent = %agent_id, error = %err, "unit failed");
            }

            outcomes.push(UnitOutcome {
                unit_id: unit.id.clone(),
                agent_id,
                agent_kind: kind,
                success,
                output,
                error,
                duration_ms,
            });
        }
        outcomes
    }

    async fn release_agents(&self) {
        for agent in self.agents.write().await.iter_mut() {
            agent.status = AgentStatus::Idle;
        }
    }

    fn publish(
        &self,
        run: &RunShape,
        event: SwarmEventKind,
        batch_index: usize,
        units_in_batch: usize,
        completed: usize,
        successful: usize,
    ) {
        self.events.publish(SwarmEvent {
            event,
            batch_index,
            total_batches: run.total_batches,
            units_in_batch,
            completed,
            successful,
            total: run.total,
            elapsed_ms: elapsed_ms(&run.started),
        });
    }

    /// Release all agents. In-flight units finish first; later calls fail.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _run = self.run_lock.lock().await;

        let released = {
            let mut agents = self.agents.write().await;
            let n = agents.len();
            agents.clear();
            n
        };
        self.initialized.store(false, Ordering::SeqCst);
        self.shutting_down.store(false, Ordering::SeqCst);

        info!(agents = released, "agent pool shut down");
    }

    pub async fn stats(&self) -> PoolStats {
        let agents = self.agents.read().await;
        let working = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Working)
            .count();
        PoolStats {
            pool_size: agents.len(),
            idle: agents.iter().filter(|a| a.status == AgentStatus::Idle).count(),
            working,
            completed_units: self.completed_units.load(Ordering::SeqCst),
            peak_concurrency: self.peak.load(Ordering::SeqCst),
            parallelism: self.config.parallelism,
        }
    }

    /// Agent count per kind.
    pub async fn agent_distribution(&self) -> BTreeMap<AgentKind, usize> {
        let mut distribution = BTreeMap::new();
        for agent in self.agents.read().await.iter() {
            *distribution.entry(agent.kind).or_insert(0) += 1;
        }
        distribution
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.agents.read().await.clone()
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::UnitError;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoWorker;

    #[async_trait]
    impl UnitWorker for EchoWorker {
        async fn run(&self, kind: AgentKind, unit: &WorkUnit) -> Result<serde_json::Value, UnitError> {
            if unit.content.contains("bad") {
                return Err(UnitError("bad unit".to_string()));
            }
            Ok(json!({ "kind": kind.as_str(), "len": unit.content.len() }))
        }
    }

    fn units(n: usize) -> Vec<WorkUnit> {
        (0..n).map(|i| WorkUnit::new(format!("u{i}"), format!("unit {i}"))).collect()
    }

    fn dispatcher() -> SwarmDispatcher {
        SwarmDispatcher::new(Arc::new(EchoWorker), SwarmConfig::default())
    }

    #[tokio::test]
    async fn test_run_before_init_fails() {
        let swarm = dispatcher();
        let err = swarm.run_batch(units(1), BatchOptions::default()).await.unwrap_err();
        assert_eq!(err, PoolError::NotInitialized);
    }

    #[tokio::test]
    async fn test_init_zero_fails() {
        assert_eq!(dispatcher().init_pool(0).await, Err(PoolError::NoWorkers));
    }

    #[tokio::test]
    async fn test_distribution_is_round_robin() {
        let swarm = dispatcher();
        swarm.init_pool(25).await.unwrap();
        let distribution = swarm.agent_distribution().await;
        assert_eq!(distribution[&AgentKind::Parser], 3);
        assert_eq!(distribution[&AgentKind::Documenter], 3);
        assert_eq!(distribution[&AgentKind::Refactor], 2);
        assert_eq!(distribution.values().sum::<usize>(), 25);
    }

    #[tokio::test]
    async fn test_insufficient_agents() {
        let swarm = dispatcher();
        swarm.init_pool(4).await.unwrap();
        let err = swarm.run_batch(units(2), BatchOptions::default()).await.unwrap_err();
        assert_eq!(err, PoolError::InsufficientAgents { required: 10, available: 4 });
    }

    #[tokio::test]
    async fn test_zero_parallelism_rejected() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        let options = BatchOptions { parallelism: Some(0), min_agents: None };
        assert_eq!(swarm.run_batch(units(2), options).await, Err(PoolError::InvalidParallelism));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        let mut work = units(5);
        work[2].content = "bad".to_string();

        let report = swarm
            .run_batch(work, BatchOptions { parallelism: Some(2), min_agents: None })
            .await
            .unwrap();
        assert_eq!(report.total_units, 5);
        assert_eq!(report.successful_units, 4);
        assert_eq!(report.failed_units, 1);
        assert_eq!(report.batches, 3);
        assert_eq!(report.results[2].error.as_deref(), Some("bad unit"));
        let ids: Vec<&str> = report.results.iter().map(|r| r.unit_id.as_str()).collect();
        assert_eq!(ids, ["u0", "u1", "u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_parallelism_capped_by_pool_size() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        let report = swarm
            .run_batch(units(30), BatchOptions { parallelism: Some(64), min_agents: None })
            .await
            .unwrap();
        assert_eq!(report.parallelism, 10);
        assert_eq!(report.batches, 3);
        assert_eq!(report.agents_used, 10);
    }

    #[tokio::test]
    async fn test_agents_idle_after_run() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        swarm.run_batch(units(12), BatchOptions::default()).await.unwrap();
        let stats = swarm.stats().await;
        assert_eq!(stats.idle, 10);
        assert_eq!(stats.working, 0);
        assert_eq!(stats.completed_units, 12);
        let completed: u64 = swarm.agents().await.iter().map(|a| a.tasks_completed).sum();
        assert_eq!(completed, 12);
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        let mut rx = swarm.subscribe();
        let report = swarm.run_batch(Vec::new(), BatchOptions::default()).await.unwrap();
        assert_eq!(report.total_units, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(rx.recv().await.unwrap().payload.event, SwarmEventKind::SwarmComplete);
    }

    #[tokio::test]
    async fn test_shutdown_then_run_fails() {
        let swarm = dispatcher();
        swarm.init_pool(10).await.unwrap();
        swarm.shutdown().await;
        assert!(!swarm.is_initialized());
        assert_eq!(swarm.stats().await.pool_size, 0);
        let err = swarm.run_batch(units(1), BatchOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "pool not initialized");
    }
}
