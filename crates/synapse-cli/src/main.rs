//! Synapse command-line entry point.
//!
//! Binary name: `synapse`
//!
//! Parses CLI arguments, sets up tracing, resolves the effective bus
//! configuration and dispatches to the command handler.

mod cli;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = synapse_observe::default_filter(cli.verbose, cli.quiet);
    synapse_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "synapse", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(synapse_infra::paths::resolve_data_dir);
    let mut config = synapse_infra::config::load_bus_config(&data_dir).await;
    if let Some(workers) = cli.workers {
        config.worker_count = workers.max(1);
    }
    tracing::debug!(data_dir = %data_dir.display(), ?config, "effective configuration");

    let result = match cli.command {
        Commands::Demo { rounds, settle_secs } => {
            cli::demo::run_demo(config, rounds, Duration::from_secs(settle_secs), cli.json).await
        }
        Commands::Bench {
            messages,
            agents,
            timeout_secs,
        } => {
            cli::bench::run_bench(
                config,
                messages,
                agents,
                Duration::from_secs(timeout_secs),
                cli.json,
                cli.quiet,
            )
            .await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::config::show_config(&data_dir, &config, cli.json),
            ConfigAction::Init { force } => cli::config::init_config(&data_dir, force, cli.json).await,
        },
        Commands::Completions { .. } => Ok(()),
    };

    synapse_observe::shutdown_tracing();
    result
}
