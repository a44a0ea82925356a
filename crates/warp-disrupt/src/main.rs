use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,warp_disrupt=debug,warpgrid_disruption=debug";

#[derive(Parser)]
#[command(
    name = "warp-disrupt",
    about = "WarpGrid disruption planner: replay cluster snapshots offline",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one disruption pass over a cluster snapshot and print the
    /// command it would submit.
    Plan {
        /// Snapshot JSON (node pools, instance types, nodes, recorded
        /// simulations)
        #[arg(short, long)]
        snapshot: PathBuf,
        /// disruption.toml (default: built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Also print metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },
    /// Parse a disruption.toml and print the effective configuration
    CheckConfig {
        /// Path to disruption.toml
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            snapshot,
            config,
            format,
            metrics,
        } => commands::plan::plan(&snapshot, config.as_deref(), &format, metrics),
        Commands::CheckConfig { path } => commands::check_config::check_config(&path),
    }
}
