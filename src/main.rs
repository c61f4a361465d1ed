//! taskpilot CLI entry point.

use anyhow::Result;
use clap::Parser;

use taskpilot::cli::commands::{diagnostics, run, swarm};
use taskpilot::cli::{handle_error, service, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = dispatch(cli).await {
        handle_error(err, json_mode);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = service::load_config(cli.config.as_deref())?;
    // Held until exit so buffered file logs are flushed
    let _logger = service::init_logging(&config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, &config, cli.json).await,
        Commands::Swarm(args) => swarm::execute(args, &config, cli.json).await,
        Commands::Diagnostics(args) => diagnostics::execute(args, &config, cli.json).await,
    }
}
