//! Command-line surface of taskpilot.

pub mod commands;
pub mod output;
pub mod service;

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use commands::diagnostics::DiagnosticsArgs;
use commands::run::RunArgs;
use commands::swarm::SwarmArgs;

/// Autonomous task execution with a mini-agent swarm and self-scoring diagnostics
#[derive(Parser, Debug)]
#[command(name = "taskpilot", version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .taskpilot/
    #[arg(long, global = true, value_name = "PATH", env = "TASKPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan, execute and verify one task
    Run(RunArgs),
    /// Fan work out across the mini-agent swarm
    Swarm(SwarmArgs),
    /// Inspect and manage self-scoring diagnostics
    Diagnostics(DiagnosticsArgs),
}

/// Print an error with its cause chain and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": causes,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("{} {err}", style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", style("caused by:").dim());
        }
    }
    std::process::exit(1)
}
