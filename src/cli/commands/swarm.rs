//! Swarm CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::adapters::workers::{chunk_lines, CodeAnalysisWorker};
use crate::application::{BatchOptions, BatchReport, PoolStats, SwarmDispatcher};
use crate::cli::output::{create_progress_bar, output, CommandOutput, ProgressBarExt, TableFormatter};
use crate::domain::models::{AgentKind, Config, SwarmConfig, SwarmEventKind};

#[derive(Args, Debug)]
pub struct SwarmArgs {
    #[command(subcommand)]
    pub command: SwarmCommand,
}

#[derive(Subcommand, Debug)]
pub enum SwarmCommand {
    /// Split a source file into chunks and analyze them in parallel
    Analyze {
        /// File to analyze
        file: PathBuf,

        /// Lines per work unit
        #[arg(long, default_value_t = 50)]
        chunk_lines: usize,

        /// Maximum concurrently working agents
        #[arg(long)]
        parallelism: Option<usize>,

        /// Number of agents in the pool
        #[arg(long)]
        pool_size: Option<usize>,
    },
    /// Show how a pool of the given size is spread over agent kinds
    Agents {
        /// Number of agents in the pool
        #[arg(long)]
        pool_size: Option<usize>,
    },
}

pub async fn execute(args: SwarmArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        SwarmCommand::Analyze {
            file,
            chunk_lines,
            parallelism,
            pool_size,
        } => analyze(file, chunk_lines, parallelism, pool_size, config, json_mode).await,
        SwarmCommand::Agents { pool_size } => show_agents(pool_size, config, json_mode).await,
    }
}

#[derive(Serialize)]
struct AnalyzeOutput {
    file: PathBuf,
    report: BatchReport,
    distribution: BTreeMap<AgentKind, usize>,
    stats: PoolStats,
}

impl CommandOutput for AnalyzeOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let formatter = TableFormatter::new();
        let headline = if report.all_succeeded() {
            style("Swarm analysis complete").green().bold()
        } else {
            style("Swarm analysis finished with failures").yellow().bold()
        };
        format!(
            "{headline}\n  File: {}\n  Units: {} ({} ok, {} failed, {:.1}% success)\n  Batches: {} at parallelism {}\n  Agents used: {} (peak concurrency {})\n  Elapsed: {}ms\n\n{}",
            self.file.display(),
            report.total_units,
            report.successful_units,
            report.failed_units,
            report.success_rate() * 100.0,
            report.batches,
            report.parallelism,
            report.agents_used,
            self.stats.peak_concurrency,
            report.elapsed_ms,
            formatter.format_unit_outcomes(&report.results),
        )
    }
}

async fn analyze(
    file: PathBuf,
    lines_per_chunk: usize,
    parallelism: Option<usize>,
    pool_size: Option<usize>,
    config: &Config,
    json_mode: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let swarm_config = SwarmConfig {
        pool_size: pool_size.unwrap_or(config.swarm.pool_size),
        ..config.swarm.clone()
    };
    let dispatcher = SwarmDispatcher::new(Arc::new(CodeAnalysisWorker), swarm_config.clone());
    dispatcher
        .init_pool(swarm_config.pool_size)
        .await
        .context("Failed to initialize agent pool")?;

    let units = chunk_lines(&content, lines_per_chunk);
    let progress = create_progress_bar(units.len() as u64, json_mode);
    let mut events = dispatcher.subscribe();
    let watcher = {
        let progress = progress.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(envelope) => {
                        let event = envelope.payload;
                        progress.set_progress(
                            event.completed as u64,
                            format!("batch {}/{}", event.batch_index + 1, event.total_batches),
                        );
                        if event.event == SwarmEventKind::SwarmComplete {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let result = dispatcher
        .run_batch(
            units,
            BatchOptions {
                parallelism,
                min_agents: None,
            },
        )
        .await;
    let distribution = dispatcher.agent_distribution().await;
    let stats = dispatcher.stats().await;
    dispatcher.shutdown().await;
    drop(dispatcher);
    // The channel closes with the dispatcher, so the watcher always ends
    let _ = watcher.await;

    let report = match result {
        Ok(report) => {
            progress.finish_success(format!("{} units analyzed", report.total_units));
            report
        }
        Err(e) => {
            progress.finish_error("swarm run failed");
            return Err(e).context("Swarm analysis failed");
        }
    };

    output(
        &AnalyzeOutput {
            file,
            report,
            distribution,
            stats,
        },
        json_mode,
    );
    Ok(())
}

#[derive(Serialize)]
struct AgentsOutput {
    pool_size: usize,
    distribution: BTreeMap<AgentKind, usize>,
}

impl CommandOutput for AgentsOutput {
    fn to_human(&self) -> String {
        format!(
            "{} agents\n{}",
            style(self.pool_size).bold(),
            TableFormatter::new().format_distribution(&self.distribution)
        )
    }
}

async fn show_agents(pool_size: Option<usize>, config: &Config, json_mode: bool) -> Result<()> {
    let pool_size = pool_size.unwrap_or(config.swarm.pool_size);
    let dispatcher = SwarmDispatcher::new(Arc::new(CodeAnalysisWorker), config.swarm.clone());
    dispatcher
        .init_pool(pool_size)
        .await
        .context("Failed to initialize agent pool")?;
    let distribution = dispatcher.agent_distribution().await;
    dispatcher.shutdown().await;

    output(
        &AgentsOutput {
            pool_size,
            distribution,
        },
        json_mode,
    );
    Ok(())
}
