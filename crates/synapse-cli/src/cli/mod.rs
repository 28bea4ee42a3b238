//! CLI command definitions for the `synapse` binary.
//!
//! Uses clap derive macros for argument parsing. Every command builds its own
//! in-process bus from the effective configuration.

pub mod bench;
pub mod config;
pub mod demo;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Drive and inspect the Synapse agent message bus.
#[derive(Parser)]
#[command(name = "synapse", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding config.toml.
    #[arg(long, global = true, env = "SYNAPSE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the configured number of delivery workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run simulated agents exchanging cognition, broadcast and heartbeat traffic.
    Demo {
        /// Number of planner rounds to run.
        #[arg(long, default_value_t = 5)]
        rounds: u32,

        /// Seconds to wait for in-flight retries before stopping.
        #[arg(long, default_value_t = 15)]
        settle_secs: u64,
    },

    /// Measure delivery throughput.
    Bench {
        /// Number of messages to send.
        #[arg(short = 'n', long, default_value_t = 10_000)]
        messages: usize,

        /// Number of receiving agents.
        #[arg(long, default_value_t = 8)]
        agents: usize,

        /// Give up waiting for deliveries after this many seconds.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Show or initialize the bus configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,

    /// Write the default configuration to the data directory.
    Init {
        /// Overwrite an existing config.toml.
        #[arg(long)]
        force: bool,
    },
}
